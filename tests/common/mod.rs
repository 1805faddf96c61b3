//! Integration test infrastructure.
//!
//! Spawns the full bridge stack in-process with a faked upstream: tests
//! feed fe-web events into one channel and observe the bridge's outbound
//! upstream requests on another, while talking to the relay server over a
//! real TCP socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use relay_proto::{Hdata, Object, RelayCodec, RelayMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;

use webridge::upstream::WebMessage;
use webridge::{Bridge, RelayServer, Translator};

/// A running bridge with a faked upstream.
pub struct TestBridge {
    /// Address of the relay listener.
    pub addr: SocketAddr,
    /// Feed fake upstream events here.
    pub upstream_events: mpsc::Sender<WebMessage>,
    /// Requests the bridge sends upstream appear here.
    pub upstream_outbound: mpsc::Receiver<WebMessage>,
}

impl TestBridge {
    /// Spawn the server and bridge tasks.
    pub async fn spawn() -> anyhow::Result<Self> {
        let server = RelayServer::bind("127.0.0.1:0").await?;
        let addr = server.local_addr()?;
        let registry = server.registry();

        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let translator = Arc::new(Translator::new());
        let bridge = Arc::new(Bridge::new(translator, registry, outbound_tx));

        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);

        tokio::spawn(server.run(command_tx));
        tokio::spawn(bridge.run(event_rx, command_rx));

        Ok(TestBridge {
            addr,
            upstream_events: event_tx,
            upstream_outbound: outbound_rx,
        })
    }

    /// Feed one fake upstream event and yield so the bridge can process it.
    pub async fn emit(&self, msg: WebMessage) {
        self.upstream_events.send(msg).await.expect("bridge alive");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Next outbound upstream request.
    pub async fn outbound(&mut self) -> anyhow::Result<WebMessage> {
        timeout(Duration::from_secs(5), self.upstream_outbound.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("bridge dropped upstream sender"))
    }

    /// Assert nothing else goes upstream within a short window.
    pub async fn assert_no_outbound(&mut self) {
        let quiet = timeout(Duration::from_millis(200), self.upstream_outbound.recv()).await;
        if let Ok(Some(msg)) = quiet {
            panic!("unexpected upstream request: {msg:?}");
        }
    }
}

/// A relay protocol client speaking the real wire format.
pub struct TestClient {
    frames: FramedRead<OwnedReadHalf, RelayCodec>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to the bridge's relay listener.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(TestClient {
            frames: FramedRead::new(read_half, RelayCodec),
            writer: write_half,
        })
    }

    /// Send one command line.
    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Authenticate this connection.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        self.send_line("init password=,compression=off").await?;
        // init has no reply; give the server a moment to process it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> anyhow::Result<RelayMessage> {
        let frame = timeout(Duration::from_secs(5), self.frames.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
        Ok(frame)
    }

    /// Receive messages until one carries the given id.
    pub async fn recv_with_id(&mut self, id: &str) -> anyhow::Result<RelayMessage> {
        loop {
            let msg = self.recv().await?;
            if msg.id == id {
                return Ok(msg);
            }
        }
    }
}

/// The single hdata object of a message.
pub fn hdata(msg: &RelayMessage) -> &Hdata {
    match &msg.objects[0] {
        Object::Hdata(hdata) => hdata,
        other => panic!("expected hdata, got {other:?}"),
    }
}

/// A string value out of an hdata item.
pub fn str_value(object: &Object) -> &str {
    match object {
        Object::Str(Some(s)) => s,
        other => panic!("expected string, got {other:?}"),
    }
}

/// A pointer value out of an hdata item.
pub fn ptr_value(object: &Object) -> &str {
    match object {
        Object::Ptr(p) => p,
        other => panic!("expected pointer, got {other:?}"),
    }
}
