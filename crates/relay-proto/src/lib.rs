//! # relay-proto
//!
//! Wire format and command grammar for the WeeChat relay protocol, as used
//! by the webridge daemon.
//!
//! The protocol is binary and length-framed: each message is a 4-byte
//! big-endian total length, a compression flag, a message id, and a sequence
//! of typed objects introduced by 3-byte ASCII type codes. Requests from
//! clients are newline-delimited text commands with an optional `(id)`
//! correlation token.
//!
//! ## Quick start
//!
//! ```rust
//! use relay_proto::{CommandLine, RelayMessage, Object};
//!
//! // Parse a client command
//! let line = CommandLine::parse("(42) hdata buffer:gui_buffers(*)").unwrap().unwrap();
//! assert_eq!(line.id, "42");
//!
//! // Build and frame a reply
//! let reply = RelayMessage::new(line.id, vec![Object::str("ok")]);
//! let bytes = reply.to_bytes();
//! assert_eq!(RelayMessage::decode(&bytes).unwrap().id, "42");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod hdata;
pub mod message;
pub mod object;

pub use self::command::{Command, CommandLine, HdataRequest, DEFAULT_LINE_COUNT};
pub use self::error::{ProtocolError, Result};
pub use self::hdata::{
    buffers_hdata, empty_hotlist, handshake_response, lines_hdata, nicklist_hdata, BufferItem,
    LineItem, NickItem, BUFFER_KEYS, HOTLIST_KEYS, LINE_KEYS, NICKLIST_KEYS,
};
pub use self::message::{RelayCodec, RelayMessage, MAX_FRAME_LEN};
pub use self::object::{Hashtable, Hdata, HdataItem, Object, TypeCode};
