//! Bridge orchestrator - wires the upstream driver and the relay server to
//! the translator.
//!
//! Policies implemented here rather than in the drivers:
//! - exactly one `sync_server` request, on the first downstream `init` ever;
//! - buffers are only pushed on explicit `hdata buffer:gui_buffers(*)`
//!   requests, plus `_buffer_opened` announcements for buffers created live;
//! - `channel_join` during a state dump declares a buffer without
//!   synthesizing a join line;
//! - live joins and parts trigger an upstream nick-list refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::server::{ClientCommand, ClientRegistry};
use crate::translator::{opened_event, Translator};
use crate::upstream::{EventKind, NickInfo, WebMessage};
use relay_proto::{empty_hotlist, Command, HdataRequest};

/// State-dump bookkeeping for one upstream lifetime.
#[derive(Debug, Default)]
struct DumpState {
    active: bool,
    server_tag: String,
}

/// The orchestrator.
pub struct Bridge {
    translator: Arc<Translator>,
    clients: Arc<ClientRegistry>,
    upstream_tx: mpsc::Sender<WebMessage>,
    state_requested: AtomicBool,
    dump: Mutex<DumpState>,
}

impl Bridge {
    /// Wire a bridge over an upstream sender and the client registry.
    pub fn new(
        translator: Arc<Translator>,
        clients: Arc<ClientRegistry>,
        upstream_tx: mpsc::Sender<WebMessage>,
    ) -> Self {
        Bridge {
            translator,
            clients,
            upstream_tx,
            state_requested: AtomicBool::new(false),
            dump: Mutex::new(DumpState::default()),
        }
    }

    /// Drive both event streams until the upstream disconnects.
    pub async fn run(
        self: Arc<Self>,
        mut upstream_events: mpsc::Receiver<WebMessage>,
        mut client_commands: mpsc::Receiver<ClientCommand>,
    ) {
        loop {
            tokio::select! {
                event = upstream_events.recv() => {
                    match event {
                        Some(msg) => self.handle_upstream_event(msg).await,
                        None => {
                            info!(component = "bridge", "Upstream disconnected, shutting down");
                            return;
                        }
                    }
                }
                command = client_commands.recv() => {
                    match command {
                        Some(cmd) => self.handle_client_command(cmd).await,
                        None => {
                            info!(component = "bridge", "Relay server stopped, shutting down");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Whether a state dump is currently being ingested.
    ///
    /// The dump has no explicit terminator; it ends at the first event from
    /// the dumped server that is not part of the dump tail (`state_dump`,
    /// the declaring `channel_join`s, and their `nicklist` snapshots).
    async fn in_state_dump(&self, msg: &WebMessage) -> bool {
        let mut dump = self.dump.lock().await;
        match msg.kind {
            EventKind::StateDump | EventKind::ChannelJoin | EventKind::Nicklist => dump.active,
            _ => {
                if dump.active && dump.server_tag == msg.server_tag {
                    debug!(
                        component = "bridge",
                        server_tag = %msg.server_tag,
                        "State dump ended"
                    );
                    dump.active = false;
                }
                false
            }
        }
    }

    /// Dispatch one inbound upstream event.
    pub async fn handle_upstream_event(&self, msg: WebMessage) {
        let in_dump = self.in_state_dump(&msg).await;

        match msg.kind {
            EventKind::Message => self.on_message(msg).await,
            EventKind::StateDump => self.on_state_dump(msg).await,
            EventKind::Nicklist => self.on_nicklist(msg, in_dump).await,
            EventKind::ChannelJoin => self.on_channel_join(msg, in_dump).await,
            EventKind::ChannelPart => self.on_channel_part(msg).await,
            EventKind::UserQuit => self.on_user_quit(msg).await,
            EventKind::Topic => self.on_topic(msg).await,
            EventKind::ActivityUpdate => {
                // Clients derive activity from the lines themselves.
                debug!(
                    component = "bridge",
                    server_tag = %msg.server_tag,
                    target = %msg.target,
                    "Activity update"
                );
            }
            other => {
                debug!(component = "bridge", r#type = ?other, "Unhandled upstream event");
            }
        }
    }

    async fn on_message(&self, msg: WebMessage) {
        let (line, created) = self.translator.append_message_line(&msg).await;
        if let Some(summary) = created {
            self.clients.broadcast(&opened_event(&summary)).await;
        }
        self.clients.broadcast(&line).await;
    }

    async fn on_state_dump(&self, msg: WebMessage) {
        info!(
            component = "bridge",
            server_tag = %msg.server_tag,
            "State dump started"
        );
        {
            let mut dump = self.dump.lock().await;
            dump.active = true;
            dump.server_tag = msg.server_tag.clone();
        }
        self.translator.ingest_state_dump(&msg).await;
    }

    async fn on_nicklist(&self, msg: WebMessage, in_dump: bool) {
        if msg.text.is_empty() {
            warn!(
                component = "bridge",
                target = %msg.target,
                "Nicklist message has empty text"
            );
            return;
        }
        let nicks: Vec<NickInfo> = match serde_json::from_str(&msg.text) {
            Ok(nicks) => nicks,
            Err(e) => {
                warn!(
                    component = "bridge",
                    target = %msg.target,
                    error = %e,
                    "Failed to parse nicklist"
                );
                return;
            }
        };
        debug!(
            component = "bridge",
            server_tag = %msg.server_tag,
            target = %msg.target,
            nicks = nicks.len(),
            "Nicklist received"
        );

        let (snapshot, created) = self.translator.apply_nicklist(&msg, &nicks).await;
        if !in_dump {
            if let Some(summary) = created {
                self.clients.broadcast(&opened_event(&summary)).await;
            }
        }
        self.clients.broadcast(&snapshot).await;
    }

    async fn on_channel_join(&self, msg: WebMessage, in_dump: bool) {
        if in_dump {
            // Dump-time joins only declare the buffer.
            debug!(
                component = "bridge",
                server_tag = %msg.server_tag,
                target = %msg.target,
                "State dump channel"
            );
            self.translator
                .ensure_buffer(&msg.server_tag, &msg.target, None)
                .await;
            return;
        }

        let text = format!("{} has joined {}", msg.nick, msg.target);
        self.broadcast_system_line(&msg, text).await;
        self.request_nicklist(&msg.server_tag, &msg.target).await;
    }

    async fn on_channel_part(&self, msg: WebMessage) {
        let text = if msg.text.is_empty() {
            format!("{} has left {}", msg.nick, msg.target)
        } else {
            format!("{} has left {} ({})", msg.nick, msg.target, msg.text)
        };
        self.broadcast_system_line(&msg, text).await;
        self.request_nicklist(&msg.server_tag, &msg.target).await;
    }

    async fn on_user_quit(&self, msg: WebMessage) {
        // Without a target there is no buffer to write the quit into.
        if msg.target.is_empty() {
            return;
        }
        let text = if msg.text.is_empty() {
            format!("{} has quit", msg.nick)
        } else {
            format!("{} has quit ({})", msg.nick, msg.text)
        };
        self.broadcast_system_line(&msg, text).await;
    }

    async fn on_topic(&self, msg: WebMessage) {
        let text = if msg.nick.is_empty() {
            format!("Topic: {}", msg.text)
        } else {
            format!("{} has changed topic to: {}", msg.nick, msg.text)
        };

        // Record the new title before announcing the buffer.
        self.translator
            .ensure_buffer(&msg.server_tag, &msg.target, Some(&msg.text))
            .await;
        self.broadcast_system_line(&msg, text).await;

        let update = self
            .translator
            .buffer_opened(&msg.server_tag, &msg.target)
            .await;
        self.clients.broadcast(&update).await;
    }

    /// Write a `--`-prefixed system line into the event's buffer.
    async fn broadcast_system_line(&self, source: &WebMessage, text: String) {
        let synthetic = WebMessage {
            kind: EventKind::Message,
            server_tag: source.server_tag.clone(),
            target: source.target.clone(),
            nick: "--".to_string(),
            text,
            timestamp: source.timestamp,
            ..Default::default()
        };
        let (line, created) = self.translator.append_message_line(&synthetic).await;
        if let Some(summary) = created {
            self.clients.broadcast(&opened_event(&summary)).await;
        }
        self.clients.broadcast(&line).await;
    }

    async fn request_nicklist(&self, server_tag: &str, target: &str) {
        let request = WebMessage::nicklist_request(server_tag, target);
        if self.upstream_tx.send(request).await.is_err() {
            warn!(component = "bridge", "Upstream gone, nicklist request dropped");
        }
    }

    /// Dispatch one downstream client command.
    pub async fn handle_client_command(&self, cmd: ClientCommand) {
        debug!(
            component = "bridge",
            client = %cmd.client.addr(),
            id = %cmd.id,
            command = ?cmd.command,
            "Client command"
        );

        match cmd.command {
            Command::Init => self.on_init().await,
            Command::Hdata { ref path, ref args } => {
                self.on_hdata(&cmd, path, args).await;
            }
            Command::Input { ref buffer, ref text } => {
                self.on_input(buffer, text).await;
            }
            Command::Nicklist { buffer: Some(ref pointer) } => {
                match self.translator.buffer_route(pointer).await {
                    Some((server_tag, target)) => {
                        self.request_nicklist(&server_tag, &target).await;
                    }
                    None => {
                        warn!(component = "bridge", pointer = %pointer, "Nicklist for unknown buffer");
                    }
                }
            }
            Command::Nicklist { buffer: None } => {
                warn!(component = "bridge", "Nicklist request without buffer");
            }
            Command::Sync | Command::Desync => {
                // Updates are always pushed; nothing to toggle.
            }
            Command::Handshake | Command::Quit | Command::Unknown(_) => {
                // Fully handled by the server layer.
            }
        }
    }

    async fn on_init(&self) {
        // The upstream disconnects clients that repeat sync_server, so the
        // request is guarded by a flag that is never cleared.
        let first = !self.state_requested.swap(true, Ordering::AcqRel);
        if !first {
            info!(component = "bridge", "Client initialized, state already requested");
            return;
        }

        info!(component = "bridge", "First client, requesting upstream state");
        if self.upstream_tx.send(WebMessage::state_request()).await.is_err() {
            warn!(component = "bridge", "Upstream gone, state request dropped");
        }
    }

    async fn on_hdata(&self, cmd: &ClientCommand, path: &str, args: &[String]) {
        let reply = match HdataRequest::parse(path, args) {
            HdataRequest::Buffers => self.translator.buffers_snapshot(&cmd.id).await,
            HdataRequest::Hotlist => empty_hotlist(&cmd.id),
            HdataRequest::Lines { pointer, count } => {
                self.translator
                    .buffer_lines(&pointer, count.unsigned_abs() as usize, &cmd.id)
                    .await
            }
            HdataRequest::Unknown => {
                warn!(component = "bridge", path = %path, "Unhandled hdata path");
                return;
            }
        };

        if let Err(e) = cmd.client.send(&reply).await {
            warn!(
                component = "bridge",
                client = %cmd.client.addr(),
                error = %e,
                "Failed to send hdata reply"
            );
        }
    }

    async fn on_input(&self, pointer: &str, text: &str) {
        match self.translator.buffer_route(pointer).await {
            Some((server_tag, target)) => {
                debug!(
                    component = "bridge",
                    server_tag = %server_tag,
                    target = %target,
                    "Forwarding input upstream"
                );
                let command = WebMessage::command(&server_tag, &target, text);
                if self.upstream_tx.send(command).await.is_err() {
                    warn!(component = "bridge", "Upstream gone, input dropped");
                }
            }
            None => {
                warn!(component = "bridge", pointer = %pointer, "Input for unknown buffer");
            }
        }
    }
}
