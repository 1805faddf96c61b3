//! Command grammar edge cases.

use relay_proto::{Command, CommandLine, HdataRequest, ProtocolError};

#[test]
fn full_session_command_sequence() {
    let session = [
        ("handshake password_hash_algo=plain", Command::Handshake),
        ("init password=secret,compression=off", Command::Init),
        ("sync", Command::Sync),
        ("desync", Command::Desync),
        ("quit", Command::Quit),
    ];
    for (line, expected) in session {
        let parsed = CommandLine::parse(line).unwrap().unwrap();
        assert_eq!(parsed.command, expected, "line: {line}");
        assert_eq!(parsed.id, "");
    }
}

#[test]
fn id_reads_to_first_closing_paren() {
    // Everything up to the first ')' is the id; the rest is the command.
    let parsed = CommandLine::parse("(a (weird id) sync").unwrap().unwrap();
    assert_eq!(parsed.id, "a (weird id");
    assert_eq!(parsed.command, Command::Sync);
}

#[test]
fn empty_id_token() {
    let parsed = CommandLine::parse("() init").unwrap().unwrap();
    assert_eq!(parsed.id, "");
    assert_eq!(parsed.command, Command::Init);
}

#[test]
fn nicklist_with_and_without_buffer() {
    let parsed = CommandLine::parse("nicklist 0x2a").unwrap().unwrap();
    assert_eq!(
        parsed.command,
        Command::Nicklist {
            buffer: Some("0x2a".into())
        }
    );

    let parsed = CommandLine::parse("nicklist").unwrap().unwrap();
    assert_eq!(parsed.command, Command::Nicklist { buffer: None });
}

#[test]
fn input_requires_buffer_and_text() {
    assert!(matches!(
        CommandLine::parse("input 0x2a"),
        Err(ProtocolError::MalformedCommand("input"))
    ));
    assert!(matches!(
        CommandLine::parse("hdata"),
        Err(ProtocolError::MalformedCommand("hdata"))
    ));
}

#[test]
fn lines_request_ignores_text_around_pointer() {
    assert_eq!(
        HdataRequest::parse("buffer:0xdeadbeef/lines/last_line(-50)/data", &[]),
        HdataRequest::Lines {
            pointer: "0xdeadbeef".into(),
            count: -50,
        }
    );
}

#[test]
fn lines_request_without_pointer_is_unknown() {
    assert_eq!(
        HdataRequest::parse("buffer:gui_buffers/lines/last_line(-50)", &[]),
        HdataRequest::Unknown
    );
}

#[test]
fn positive_counts_are_accepted() {
    assert_eq!(
        HdataRequest::parse("buffer:0x1/lines/last_line(25)", &[]),
        HdataRequest::Lines {
            pointer: "0x1".into(),
            count: 25,
        }
    );
}
