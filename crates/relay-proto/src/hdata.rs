//! Builders for the hdata and hashtable messages the bridge emits.
//!
//! Relay clients deserialize hdata items positionally, so the key order in
//! these builders is part of the wire contract and must not change.

use crate::message::RelayMessage;
use crate::object::{Hashtable, Hdata, HdataItem, Object};

/// Key schema of buffer-list hdata replies.
pub const BUFFER_KEYS: &str =
    "number:int,name:str,short_name:str,hidden:int,title:str,local_variables:str";

/// Key schema of line hdata replies.
pub const LINE_KEYS: &str =
    "buffer:ptr,date:tim,date_printed:tim,displayed:int,highlight:int,tags_array:str,prefix:str,message:str";

/// Key schema of nicklist hdata broadcasts.
pub const NICKLIST_KEYS: &str = "group:int,visible:int,name:str,color:str,prefix:str,prefix_color:str";

/// Key schema of the (always empty) hotlist reply.
pub const HOTLIST_KEYS: &str = "priority:int,date:tim,date_printed:tim,buffer:ptr,count:int";

/// Buffer metadata as it appears in buffer-list hdata items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferItem {
    /// Stable buffer pointer.
    pub pointer: String,
    /// Display position, starting at 1.
    pub number: i32,
    /// Full name, e.g. `libera.#rust`.
    pub name: String,
    /// Short name, e.g. `#rust`.
    pub short_name: String,
    /// Whether the buffer is hidden.
    pub hidden: bool,
    /// Buffer title (channel topic or synthetic description).
    pub title: String,
    /// `key=value` pairs, e.g. `type=channel,server=libera`.
    pub local_variables: String,
}

/// One scrollback line as it appears in line hdata items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    /// The line's own pointer.
    pub pointer: String,
    /// Pointer of the owning buffer.
    pub buffer: String,
    /// Event time, seconds since epoch.
    pub date: i64,
    /// Local receive time, seconds since epoch.
    pub date_printed: i64,
    /// Whether the line is displayed.
    pub displayed: bool,
    /// Whether the line triggered a highlight.
    pub highlight: bool,
    /// Comma-joined line tags.
    pub tags: String,
    /// Author nick, or `--` for system events.
    pub prefix: String,
    /// The line text.
    pub message: String,
}

/// One nick as it appears in nicklist hdata items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NickItem {
    /// The nick's own pointer.
    pub pointer: String,
    /// Whether this entry is a group node (always false here).
    pub is_group: bool,
    /// Whether the nick is visible.
    pub visible: bool,
    /// The nick itself.
    pub name: String,
    /// Nick color.
    pub color: String,
    /// Mode sigil (`@`, `+`, `%`, or empty).
    pub prefix: String,
    /// Color derived from the prefix.
    pub prefix_color: String,
}

fn bool_int(value: bool) -> Object {
    Object::Int(value as i32)
}

/// Buffer-list hdata with the given message id (`""` for plain replies,
/// `_buffer_opened` for live announcements, or an echoed correlation id).
pub fn buffers_hdata(buffers: &[BufferItem], id: &str) -> RelayMessage {
    let items = buffers
        .iter()
        .map(|buf| HdataItem {
            pointers: vec![buf.pointer.clone()],
            values: vec![
                Object::Int(buf.number),
                Object::str(&buf.name),
                Object::str(&buf.short_name),
                bool_int(buf.hidden),
                Object::str(&buf.title),
                Object::str(&buf.local_variables),
            ],
        })
        .collect();

    RelayMessage::new(
        id,
        vec![Object::Hdata(Hdata {
            path: "buffer".into(),
            keys: BUFFER_KEYS.into(),
            items,
        })],
    )
}

/// Line hdata with the given message id.
pub fn lines_hdata(lines: &[LineItem], id: &str) -> RelayMessage {
    let items = lines
        .iter()
        .map(|line| HdataItem {
            pointers: vec![line.pointer.clone()],
            values: vec![
                Object::Ptr(line.buffer.clone()),
                Object::Time(line.date),
                Object::Time(line.date_printed),
                bool_int(line.displayed),
                bool_int(line.highlight),
                Object::str(&line.tags),
                Object::str(&line.prefix),
                Object::str(&line.message),
            ],
        })
        .collect();

    RelayMessage::new(
        id,
        vec![Object::Hdata(Hdata {
            path: "line_data".into(),
            keys: LINE_KEYS.into(),
            items,
        })],
    )
}

/// Nicklist hdata. Nicklist updates are always pushed with an empty id.
pub fn nicklist_hdata(nicks: &[NickItem]) -> RelayMessage {
    let items = nicks
        .iter()
        .map(|nick| HdataItem {
            pointers: vec![nick.pointer.clone()],
            values: vec![
                bool_int(nick.is_group),
                bool_int(nick.visible),
                Object::str(&nick.name),
                Object::str(&nick.color),
                Object::str(&nick.prefix),
                Object::str(&nick.prefix_color),
            ],
        })
        .collect();

    RelayMessage::new(
        "",
        vec![Object::Hdata(Hdata {
            path: "nicklist_item".into(),
            keys: NICKLIST_KEYS.into(),
            items,
        })],
    )
}

/// The empty hotlist reply.
pub fn empty_hotlist(id: &str) -> RelayMessage {
    RelayMessage::new(
        id,
        vec![Object::Hdata(Hdata {
            path: "hotlist".into(),
            keys: HOTLIST_KEYS.into(),
            items: Vec::new(),
        })],
    )
}

/// The `handshake` reply: six fixed hashtable entries.
pub fn handshake_response(id: &str, password_hash_algo: &str, nonce: &str) -> RelayMessage {
    RelayMessage::new(
        id,
        vec![Object::Hashtable(Hashtable::str_str([
            ("password_hash_algo", password_hash_algo),
            ("password_hash_iterations", "100000"),
            ("totp", "off"),
            ("nonce", nonce),
            ("compression", "off"),
            ("escape_commands", "off"),
        ]))],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TypeCode;

    #[test]
    fn handshake_has_six_entries_in_order() {
        let msg = handshake_response("", "plain", "deadbeef");
        let Object::Hashtable(table) = &msg.objects[0] else {
            panic!("expected hashtable");
        };
        let keys: Vec<_> = table
            .entries
            .iter()
            .map(|(k, _)| match k {
                Object::Str(Some(s)) => s.as_str(),
                _ => panic!("non-string key"),
            })
            .collect();
        assert_eq!(
            keys,
            [
                "password_hash_algo",
                "password_hash_iterations",
                "totp",
                "nonce",
                "compression",
                "escape_commands"
            ]
        );
    }

    #[test]
    fn buffers_hdata_roundtrips_with_declared_order() {
        let msg = buffers_hdata(
            &[BufferItem {
                pointer: "0x1".into(),
                number: 1,
                name: "core.weechat".into(),
                short_name: "weechat".into(),
                hidden: false,
                title: "WeeChat".into(),
                local_variables: "type=server".into(),
            }],
            "42",
        );
        let decoded = RelayMessage::decode(&msg.to_bytes()).expect("decode");
        assert_eq!(decoded.id, "42");

        let Object::Hdata(hdata) = &decoded.objects[0] else {
            panic!("expected hdata");
        };
        let specs = hdata.key_specs().unwrap();
        assert_eq!(specs[0], ("number", TypeCode::Int));
        assert_eq!(specs[5], ("local_variables", TypeCode::Str));
        assert_eq!(hdata.items[0].values[0], Object::Int(1));
        assert_eq!(hdata.items[0].values[1], Object::str("core.weechat"));
    }

    #[test]
    fn empty_hotlist_has_schema_but_no_items() {
        let msg = empty_hotlist("7");
        let Object::Hdata(hdata) = &msg.objects[0] else {
            panic!("expected hdata");
        };
        assert_eq!(hdata.keys, HOTLIST_KEYS);
        assert!(hdata.items.is_empty());
    }
}
