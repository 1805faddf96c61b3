//! Per-client state and the connected-client registry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use dashmap::DashMap;
use relay_proto::RelayMessage;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::warn;

/// One connected relay client.
///
/// The write half sits behind an async mutex so concurrent senders never
/// interleave bytes on the wire.
pub struct ClientHandle {
    id: u64,
    addr: SocketAddr,
    authenticated: AtomicBool,
    nonce: Mutex<Option<String>>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl ClientHandle {
    pub(crate) fn new(id: u64, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        ClientHandle {
            id,
            addr,
            authenticated: AtomicBool::new(false),
            nonce: Mutex::new(None),
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    /// Registry id of this client.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address, for log context.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether `init` has completed on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
    }

    pub(crate) fn set_nonce(&self, nonce: String) {
        *self.nonce.lock().expect("nonce lock") = Some(nonce);
    }

    /// The nonce issued during `handshake`, if any.
    pub fn nonce(&self) -> Option<String> {
        self.nonce.lock().expect("nonce lock").clone()
    }

    /// Serialize and write one message to this client.
    pub async fn send(&self, msg: &RelayMessage) -> std::io::Result<()> {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        self.send_bytes(&buf).await
    }

    async fn send_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// The set of live client connections.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<u64, Arc<ClientHandle>>,
}

impl ClientRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, client: Arc<ClientHandle>) {
        self.clients.insert(client.id(), client);
    }

    pub(crate) fn remove(&self, id: u64) {
        self.clients.remove(&id);
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether any client is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Write a message to every authenticated client.
    ///
    /// The message is encoded once; handles are collected before any write
    /// so no DashMap shard lock is held across an await.
    pub async fn broadcast(&self, msg: &RelayMessage) {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);

        let targets: Vec<Arc<ClientHandle>> = self
            .clients
            .iter()
            .filter(|entry| entry.value().is_authenticated())
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for client in targets {
            if let Err(e) = client.send_bytes(&buf).await {
                warn!(
                    component = "server",
                    client = %client.addr(),
                    error = %e,
                    "Broadcast write failed"
                );
            }
        }
    }
}
