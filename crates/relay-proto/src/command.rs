//! Downstream command grammar.
//!
//! Relay clients speak newline-delimited commands of the form
//! `[( id )] command arg1 arg2 ...`. The optional `(id)` is a caller-chosen
//! correlation token that must be echoed in the reply's message id.

use crate::error::{ProtocolError, Result};

/// Default line count for scrollback requests that carry no `(N)` argument.
pub const DEFAULT_LINE_COUNT: i64 = 50;

/// A recognized downstream command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Protocol handshake; answered with the option hashtable.
    Handshake,
    /// Authenticate the session.
    Init,
    /// Query structured data by hdata path.
    Hdata {
        /// The hdata path, e.g. `buffer:gui_buffers(*)`.
        path: String,
        /// Trailing arguments (keys, filters).
        args: Vec<String>,
    },
    /// Send text to a buffer.
    Input {
        /// Target buffer pointer.
        buffer: String,
        /// The text to send.
        text: String,
    },
    /// Subscribe to updates. Updates are always pushed, so this is a no-op.
    Sync,
    /// Unsubscribe from updates. Also a no-op.
    Desync,
    /// Request the nick list of a buffer.
    Nicklist {
        /// Target buffer pointer, when given.
        buffer: Option<String>,
    },
    /// Close the connection.
    Quit,
    /// Anything else; logged and ignored.
    Unknown(String),
}

/// A parsed command line: correlation id plus command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The caller-chosen id, empty when the line carried none.
    pub id: String,
    /// The command itself.
    pub command: Command,
}

impl CommandLine {
    /// Parse one line. Returns `Ok(None)` for blank lines.
    ///
    /// The id section reads up to the first `)`, so ids may contain spaces.
    pub fn parse(line: &str) -> Result<Option<CommandLine>> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut id = String::new();
        if let Some(after_paren) = rest.strip_prefix('(') {
            let end = after_paren.find(')').ok_or(ProtocolError::UnterminatedId)?;
            id = after_paren[..end].to_string();
            rest = after_paren[end + 1..].trim_start();
        }

        let mut parts = rest.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        let command = match name {
            "handshake" => Command::Handshake,
            "init" => Command::Init,
            "hdata" => {
                let mut args = args;
                if args.is_empty() {
                    return Err(ProtocolError::MalformedCommand("hdata"));
                }
                let path = args.remove(0);
                Command::Hdata { path, args }
            }
            "input" => {
                if args.len() < 2 {
                    return Err(ProtocolError::MalformedCommand("input"));
                }
                Command::Input {
                    buffer: args[0].clone(),
                    text: args[1..].join(" "),
                }
            }
            "sync" => Command::Sync,
            "desync" => Command::Desync,
            "nicklist" => Command::Nicklist {
                buffer: args.into_iter().next(),
            },
            "quit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        };

        Ok(Some(CommandLine { id, command }))
    }
}

/// A recognized hdata request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HdataRequest {
    /// `buffer:gui_buffers(*)` - the full buffer list.
    Buffers,
    /// `hotlist:gui_hotlist(*)` - always answered with an empty hotlist.
    Hotlist,
    /// `<something>:<ptr>/lines/last_line(N)` - scrollback for one buffer.
    Lines {
        /// The embedded buffer pointer.
        pointer: String,
        /// The signed count; `|count|` lines are returned.
        count: i64,
    },
    /// Anything else; logged, no reply.
    Unknown,
}

impl HdataRequest {
    /// Classify an hdata path (plus trailing arguments, which some clients
    /// use for the `(N)` count).
    pub fn parse(path: &str, args: &[String]) -> HdataRequest {
        if path == "buffer:gui_buffers(*)" || path == "buffer:gui_buffers" {
            return HdataRequest::Buffers;
        }
        if path == "hotlist:gui_hotlist(*)" || path == "hotlist:gui_hotlist" {
            return HdataRequest::Hotlist;
        }
        if path.contains("/lines/") {
            let Some(pointer) = extract_pointer(path) else {
                return HdataRequest::Unknown;
            };
            let count = extract_count(path)
                .or_else(|| args.first().and_then(|arg| extract_count(arg)))
                .unwrap_or(DEFAULT_LINE_COUNT);
            return HdataRequest::Lines { pointer, count };
        }
        HdataRequest::Unknown
    }
}

/// Find the first `0x<hex>` token embedded in a path.
fn extract_pointer(path: &str) -> Option<String> {
    let start = path.find("0x")?;
    let hex: String = path[start + 2..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if hex.is_empty() {
        return None;
    }
    Some(format!("0x{hex}"))
}

/// Extract the signed integer inside the first `(...)` group, if any.
fn extract_count(text: &str) -> Option<i64> {
    let open = text.find('(')?;
    let close = text[open + 1..].find(')')?;
    text[open + 1..open + 1 + close].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_and_command() {
        let line = CommandLine::parse("(42) hdata buffer:gui_buffers(*) number,name\n")
            .unwrap()
            .unwrap();
        assert_eq!(line.id, "42");
        assert_eq!(
            line.command,
            Command::Hdata {
                path: "buffer:gui_buffers(*)".into(),
                args: vec!["number,name".into()],
            }
        );
    }

    #[test]
    fn id_may_contain_spaces() {
        let line = CommandLine::parse("(my id) sync").unwrap().unwrap();
        assert_eq!(line.id, "my id");
        assert_eq!(line.command, Command::Sync);
    }

    #[test]
    fn unterminated_id_is_an_error() {
        assert!(matches!(
            CommandLine::parse("(42 init"),
            Err(ProtocolError::UnterminatedId)
        ));
    }

    #[test]
    fn blank_lines_parse_to_none() {
        assert_eq!(CommandLine::parse("").unwrap(), None);
        assert_eq!(CommandLine::parse("  \r\n").unwrap(), None);
    }

    #[test]
    fn input_joins_trailing_words() {
        let line = CommandLine::parse("input 0x1f hello there world")
            .unwrap()
            .unwrap();
        assert_eq!(
            line.command,
            Command::Input {
                buffer: "0x1f".into(),
                text: "hello there world".into(),
            }
        );
    }

    #[test]
    fn unknown_commands_are_preserved() {
        let line = CommandLine::parse("(1) completion foo").unwrap().unwrap();
        assert_eq!(line.command, Command::Unknown("completion".into()));
    }

    #[test]
    fn hdata_request_classification() {
        assert_eq!(
            HdataRequest::parse("buffer:gui_buffers(*)", &[]),
            HdataRequest::Buffers
        );
        assert_eq!(
            HdataRequest::parse("hotlist:gui_hotlist(*)", &[]),
            HdataRequest::Hotlist
        );
        assert_eq!(
            HdataRequest::parse("buffer:0x1a2b/lines/last_line(-100)", &[]),
            HdataRequest::Lines {
                pointer: "0x1a2b".into(),
                count: -100,
            }
        );
        assert_eq!(
            HdataRequest::parse("buffer:0x1a2b/lines/last_line(0)", &[]),
            HdataRequest::Lines {
                pointer: "0x1a2b".into(),
                count: 0,
            }
        );
        assert_eq!(HdataRequest::parse("infolist:hook", &[]), HdataRequest::Unknown);
    }

    #[test]
    fn line_count_falls_back_to_args_then_default() {
        assert_eq!(
            HdataRequest::parse("buffer:0xff/lines/last_line", &["(-25)".into()]),
            HdataRequest::Lines {
                pointer: "0xff".into(),
                count: -25,
            }
        );
        assert_eq!(
            HdataRequest::parse("buffer:0xff/lines/last_line", &[]),
            HdataRequest::Lines {
                pointer: "0xff".into(),
                count: DEFAULT_LINE_COUNT,
            }
        );
    }
}
