//! The canonical buffer/line/nick model and the rules that keep it
//! consistent as events arrive from either protocol.
//!
//! The translator exclusively owns the store. Every operation takes the
//! single store lock (reads shared, mutations exclusive) and none of them
//! block under it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use relay_proto::{
    buffers_hdata, lines_hdata, nicklist_hdata, BufferItem, LineItem, NickItem, RelayMessage,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::upstream::{NickInfo, WebMessage};

/// Scrollback retained per buffer; oldest lines are dropped past this.
pub const MAX_BUFFER_LINES: usize = 500;

/// Message id used to announce newly created or updated buffers.
pub const BUFFER_OPENED_ID: &str = "_buffer_opened";

const CORE_KEY: &str = "core";
const CORE_NAME: &str = "core.weechat";
const CORE_SHORT_NAME: &str = "weechat";
const CORE_TITLE: &str = "WeeChat (via erssi bridge)";

/// What a buffer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// A server status buffer.
    Server,
    /// An IRC channel.
    Channel,
    /// A private query.
    Private,
}

impl BufferKind {
    fn local_variables(self, server_tag: &str) -> String {
        match self {
            BufferKind::Server => "type=server".to_string(),
            BufferKind::Channel => format!("type=channel,server={server_tag}"),
            BufferKind::Private => format!("type=private,server={server_tag}"),
        }
    }
}

/// Identity and metadata of one buffer, as handed out by the translator.
#[derive(Debug, Clone)]
pub struct BufferSummary {
    pub pointer: String,
    pub number: i32,
    pub server_tag: String,
    pub name: String,
    pub short_name: String,
    pub title: String,
    pub kind: BufferKind,
}

impl BufferSummary {
    fn item(&self) -> BufferItem {
        BufferItem {
            pointer: self.pointer.clone(),
            number: self.number,
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            hidden: false,
            title: self.title.clone(),
            local_variables: self.kind.local_variables(&self.server_tag),
        }
    }
}

/// The relay message announcing one buffer, keyed `_buffer_opened`.
pub fn opened_event(summary: &BufferSummary) -> RelayMessage {
    buffers_hdata(&[summary.item()], BUFFER_OPENED_ID)
}

#[derive(Debug)]
struct Buffer {
    pointer: String,
    number: i32,
    server_tag: String,
    name: String,
    short_name: String,
    title: String,
    kind: BufferKind,
    lines: VecDeque<LineItem>,
    nicks: Vec<NickItem>,
}

impl Buffer {
    fn summary(&self) -> BufferSummary {
        BufferSummary {
            pointer: self.pointer.clone(),
            number: self.number,
            server_tag: self.server_tag.clone(),
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            title: self.title.clone(),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    buffers: HashMap<String, Buffer>,
    next_number: i32,
}

/// The protocol translator and its state store.
#[derive(Debug)]
pub struct Translator {
    store: RwLock<Store>,
    next_pointer: AtomicU64,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    /// An empty store. The core buffer appears at first state-dump
    /// ingestion.
    pub fn new() -> Self {
        Translator {
            store: RwLock::new(Store {
                buffers: HashMap::new(),
                next_number: 1,
            }),
            next_pointer: AtomicU64::new(1),
        }
    }

    /// A fresh process-unique pointer, rendered `0x` + hex.
    fn generate_pointer(&self) -> String {
        let seq = self.next_pointer.fetch_add(1, Ordering::Relaxed);
        format!("0x{seq:x}")
    }

    fn buffer_key(server_tag: &str, target: &str) -> String {
        format!("{server_tag}.{}", target.to_lowercase())
    }

    fn ensure_locked(
        &self,
        store: &mut Store,
        key: String,
        server_tag: &str,
        name: String,
        short_name: String,
        kind: BufferKind,
        title: Option<&str>,
    ) -> (BufferSummary, bool) {
        if let Some(existing) = store.buffers.get_mut(&key) {
            if let Some(title) = title {
                if !title.is_empty() {
                    existing.title = title.to_string();
                }
            }
            return (existing.summary(), false);
        }

        let number = store.next_number;
        store.next_number += 1;

        let buffer = Buffer {
            pointer: self.generate_pointer(),
            number,
            server_tag: server_tag.to_string(),
            name,
            short_name,
            title: title.unwrap_or_default().to_string(),
            kind,
            lines: VecDeque::new(),
            nicks: Vec::new(),
        };
        debug!(
            component = "translator",
            key = %key,
            pointer = %buffer.pointer,
            number,
            "Created buffer"
        );
        let summary = buffer.summary();
        store.buffers.insert(key, buffer);
        (summary, true)
    }

    fn ensure_target_locked(
        &self,
        store: &mut Store,
        server_tag: &str,
        target: &str,
        title: Option<&str>,
    ) -> (BufferSummary, bool) {
        let kind = if is_channel_name(target) {
            BufferKind::Channel
        } else {
            BufferKind::Private
        };
        self.ensure_locked(
            store,
            Self::buffer_key(server_tag, target),
            server_tag,
            format!("{server_tag}.{target}"),
            target.to_string(),
            kind,
            title,
        )
    }

    fn ensure_server_locked(&self, store: &mut Store, server_tag: &str) -> (BufferSummary, bool) {
        self.ensure_locked(
            store,
            server_tag.to_string(),
            server_tag,
            server_tag.to_string(),
            server_tag.to_string(),
            BufferKind::Server,
            Some(&format!("Server {server_tag}")),
        )
    }

    fn ensure_core_locked(&self, store: &mut Store) -> (BufferSummary, bool) {
        self.ensure_locked(
            store,
            CORE_KEY.to_string(),
            "",
            CORE_NAME.to_string(),
            CORE_SHORT_NAME.to_string(),
            BufferKind::Server,
            Some(CORE_TITLE),
        )
    }

    /// Find or create the buffer for `(server_tag, target)`. Returns the
    /// buffer and whether it was just created. A non-empty `title` also
    /// refreshes an existing buffer's title.
    pub async fn ensure_buffer(
        &self,
        server_tag: &str,
        target: &str,
        title: Option<&str>,
    ) -> (BufferSummary, bool) {
        let mut store = self.store.write().await;
        self.ensure_target_locked(&mut store, server_tag, target, title)
    }

    /// Find or create the status buffer of a server.
    pub async fn ensure_server_buffer(&self, server_tag: &str) -> (BufferSummary, bool) {
        let mut store = self.store.write().await;
        self.ensure_server_locked(&mut store, server_tag)
    }

    /// Ingest a state dump: the core buffer first, then every declared
    /// server's channels and queries, in declared order.
    ///
    /// The payload arrives either as the `extra_data` map or as JSON in the
    /// `text` field; both carriers are accepted. A tagged dump without a
    /// payload is the incremental form where channels follow as
    /// `channel_join` declarations; that form creates the server's status
    /// buffer instead. Re-ingesting the same dump is an identity no-op
    /// apart from title refreshes.
    pub async fn ingest_state_dump(&self, msg: &WebMessage) -> Vec<BufferSummary> {
        let mut store = self.store.write().await;
        let mut created = Vec::new();

        let (core, core_created) = self.ensure_core_locked(&mut store);
        if core_created {
            created.push(core);
        }

        let payload = match state_dump_payload(msg) {
            Some(payload) => payload,
            None => {
                debug!(component = "translator", "State dump carried no server list");
                if !msg.server_tag.is_empty() {
                    let (server, server_created) =
                        self.ensure_server_locked(&mut store, &msg.server_tag);
                    if server_created {
                        created.push(server);
                    }
                }
                return created;
            }
        };

        for server in payload
            .get("servers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let tag = server.get("tag").and_then(Value::as_str).unwrap_or_default();
            if tag.is_empty() {
                continue;
            }

            for channel in server
                .get("channels")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let name = channel.get("name").and_then(Value::as_str).unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let topic = channel.get("topic").and_then(Value::as_str).unwrap_or_default();
                let (summary, was_created) =
                    self.ensure_target_locked(&mut store, tag, name, Some(topic));
                if was_created {
                    created.push(summary);
                }
            }

            for query in server
                .get("queries")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let nick = query.get("nick").and_then(Value::as_str).unwrap_or_default();
                if nick.is_empty() {
                    continue;
                }
                let title = format!("Private chat with {nick}");
                let (summary, was_created) =
                    self.ensure_target_locked(&mut store, tag, nick, Some(&title));
                if was_created {
                    created.push(summary);
                }
            }
        }

        info!(
            component = "translator",
            buffers = store.buffers.len(),
            created = created.len(),
            "State dump ingested"
        );
        created
    }

    /// Append a line for a `message` event, creating the buffer lazily.
    ///
    /// Returns the single-line hdata to broadcast and, when the buffer did
    /// not exist yet, its summary.
    pub async fn append_message_line(
        &self,
        msg: &WebMessage,
    ) -> (RelayMessage, Option<BufferSummary>) {
        let mut store = self.store.write().await;
        let (summary, created) =
            self.ensure_target_locked(&mut store, &msg.server_tag, &msg.target, None);

        let line = LineItem {
            pointer: self.generate_pointer(),
            buffer: summary.pointer.clone(),
            date: msg.timestamp,
            date_printed: chrono::Utc::now().timestamp(),
            displayed: true,
            highlight: msg.is_highlight,
            tags: line_tags(msg),
            prefix: msg.nick.clone(),
            message: msg.text.clone(),
        };

        let buffer = store
            .buffers
            .get_mut(&Self::buffer_key(&msg.server_tag, &msg.target))
            .expect("buffer just ensured");
        buffer.lines.push_back(line.clone());
        while buffer.lines.len() > MAX_BUFFER_LINES {
            buffer.lines.pop_front();
        }

        (lines_hdata(&[line], ""), created.then_some(summary))
    }

    /// Replace a channel's nick-list snapshot.
    pub async fn apply_nicklist(
        &self,
        msg: &WebMessage,
        nicks: &[NickInfo],
    ) -> (RelayMessage, Option<BufferSummary>) {
        let mut store = self.store.write().await;
        let (summary, created) =
            self.ensure_target_locked(&mut store, &msg.server_tag, &msg.target, None);

        let snapshot: Vec<NickItem> = nicks
            .iter()
            .map(|nick| NickItem {
                pointer: self.generate_pointer(),
                is_group: false,
                visible: true,
                name: nick.nick.clone(),
                color: "default".to_string(),
                prefix: nick.prefix.clone(),
                prefix_color: prefix_color(&nick.prefix).to_string(),
            })
            .collect();

        let buffer = store
            .buffers
            .get_mut(&Self::buffer_key(&msg.server_tag, &msg.target))
            .expect("buffer just ensured");
        buffer.nicks = snapshot.clone();

        (nicklist_hdata(&snapshot), created.then_some(summary))
    }

    /// All buffers as an hdata reply, ordered by buffer number.
    pub async fn buffers_snapshot(&self, id: &str) -> RelayMessage {
        let store = self.store.read().await;
        let mut summaries: Vec<BufferSummary> =
            store.buffers.values().map(Buffer::summary).collect();
        summaries.sort_by_key(|summary| summary.number);
        let items: Vec<BufferItem> = summaries.iter().map(BufferSummary::item).collect();
        buffers_hdata(&items, id)
    }

    /// Single-buffer `_buffer_opened` announcement; empty when the buffer
    /// is unknown.
    pub async fn buffer_opened(&self, server_tag: &str, target: &str) -> RelayMessage {
        let store = self.store.read().await;
        let items: Vec<BufferItem> = store
            .buffers
            .get(&Self::buffer_key(server_tag, target))
            .map(|buffer| vec![buffer.summary().item()])
            .unwrap_or_default();
        buffers_hdata(&items, BUFFER_OPENED_ID)
    }

    /// The last `count` lines of a buffer, oldest first; empty when the
    /// pointer is unknown.
    pub async fn buffer_lines(&self, pointer: &str, count: usize, id: &str) -> RelayMessage {
        let store = self.store.read().await;
        let lines: Vec<LineItem> = store
            .buffers
            .values()
            .find(|buffer| buffer.pointer == pointer)
            .map(|buffer| {
                let skip = buffer.lines.len().saturating_sub(count);
                buffer.lines.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        lines_hdata(&lines, id)
    }

    /// The current nick-list snapshot of a buffer, if it exists.
    pub async fn buffer_nicks(&self, pointer: &str) -> Option<Vec<NickItem>> {
        let store = self.store.read().await;
        store
            .buffers
            .values()
            .find(|buffer| buffer.pointer == pointer)
            .map(|buffer| buffer.nicks.clone())
    }

    /// Resolve a buffer pointer to its `(server_tag, target)` routing key.
    pub async fn buffer_route(&self, pointer: &str) -> Option<(String, String)> {
        let store = self.store.read().await;
        store.buffers.iter().find_map(|(key, buffer)| {
            if buffer.pointer != pointer {
                return None;
            }
            match key.split_once('.') {
                Some((tag, target)) => Some((tag.to_string(), target.to_string())),
                None => Some((buffer.server_tag.clone(), buffer.short_name.clone())),
            }
        })
    }
}

/// IRC channel name check: channels start with a channel-type sigil,
/// anything else is a private query.
fn is_channel_name(target: &str) -> bool {
    matches!(target.chars().next(), Some('#' | '&' | '+' | '!'))
}

fn line_tags(msg: &WebMessage) -> String {
    let mut tags = vec!["notify_message".to_string()];
    if msg.is_highlight {
        tags.push("notify_highlight".to_string());
    }
    if !msg.nick.is_empty() {
        tags.push(format!("nick_{}", msg.nick));
    }
    tags.join(",")
}

fn prefix_color(prefix: &str) -> &'static str {
    match prefix {
        "@" => "lightgreen",
        "+" => "yellow",
        "%" => "lightmagenta",
        _ => "default",
    }
}

/// Extract the state-dump payload from either carrier.
fn state_dump_payload(msg: &WebMessage) -> Option<Value> {
    if let Some(extra) = &msg.extra_data {
        if !extra.is_empty() {
            return Some(Value::Object(extra.clone()));
        }
    }
    if msg.text.is_empty() {
        return None;
    }
    serde_json::from_str(&msg.text).ok()
}
