//! Downstream server - TCP listener speaking the WeeChat relay protocol.
//!
//! Each accepted connection gets its own read task. `handshake` is answered
//! locally; `init` flips the authenticated flag and, like every other
//! recognized command, is forwarded to the bridge. Unknown commands are
//! logged and ignored, and commands from unauthenticated clients are
//! protocol violations that get no reply.

pub mod client;

pub use client::{ClientHandle, ClientRegistry};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use rand::Rng;
use relay_proto::{handshake_response, Command, CommandLine};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

/// A parsed command from an authenticated (or authenticating) client,
/// handed to the bridge.
#[derive(Debug)]
pub struct ClientCommand {
    /// The issuing client.
    pub client: Arc<ClientHandle>,
    /// Correlation id to echo in the reply, empty when none was given.
    pub id: String,
    /// The command itself.
    pub command: Command,
}

/// The relay protocol listener.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    next_client_id: AtomicU64,
}

impl RelayServer {
    /// Bind the listener.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(component = "server", %addr, "Relay protocol server listening");
        Ok(RelayServer {
            listener,
            registry: Arc::new(ClientRegistry::new()),
            next_client_id: AtomicU64::new(1),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared client registry, for broadcasts.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections forever, spawning one task per client.
    pub async fn run(self, commands: mpsc::Sender<ClientCommand>) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!(component = "server", client = %addr, "Client connected");

            let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
            let registry = Arc::clone(&self.registry);
            let commands = commands.clone();

            tokio::spawn(async move {
                handle_client(id, stream, registry, commands).await;
            });
        }
    }
}

async fn handle_client(
    id: u64,
    stream: TcpStream,
    registry: Arc<ClientRegistry>,
    commands: mpsc::Sender<ClientCommand>,
) {
    let addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(component = "server", error = %e, "Failed to read peer address");
            return;
        }
    };

    let (read_half, write_half) = stream.into_split();
    let client = Arc::new(ClientHandle::new(id, addr, write_half));
    registry.insert(Arc::clone(&client));

    let mut lines = FramedRead::new(read_half, LinesCodec::new());

    while let Some(result) = lines.next().await {
        let line = match result {
            Ok(line) => line,
            Err(e) => {
                warn!(component = "server", client = %addr, error = %e, "Read error");
                break;
            }
        };
        debug!(component = "server", client = %addr, command = %line, "Received command");

        let parsed = match CommandLine::parse(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                warn!(component = "server", client = %addr, error = %e, "Dropping malformed command");
                continue;
            }
        };

        match &parsed.command {
            Command::Handshake => {
                if let Err(e) = answer_handshake(&client, &parsed.id).await {
                    warn!(component = "server", client = %addr, error = %e, "Handshake reply failed");
                    break;
                }
                continue;
            }
            Command::Init => {
                // Password verification is delegated to whoever fronts
                // this listener; any init authenticates.
                client.set_authenticated();
                info!(component = "server", client = %addr, "Client authenticated");
            }
            Command::Quit => {
                debug!(component = "server", client = %addr, "Client quit");
                break;
            }
            Command::Unknown(name) => {
                warn!(component = "server", client = %addr, command = %name, "Unknown command");
                continue;
            }
            _ => {
                if !client.is_authenticated() {
                    warn!(
                        component = "server",
                        client = %addr,
                        command = ?parsed.command,
                        "Command before init"
                    );
                    continue;
                }
            }
        }

        let forwarded = ClientCommand {
            client: Arc::clone(&client),
            id: parsed.id,
            command: parsed.command,
        };
        if commands.send(forwarded).await.is_err() {
            break; // bridge is gone
        }
    }

    registry.remove(id);
    info!(component = "server", client = %addr, "Client disconnected");
}

async fn answer_handshake(client: &ClientHandle, id: &str) -> std::io::Result<()> {
    let nonce_bytes: [u8; 16] = rand::thread_rng().gen();
    let nonce: String = nonce_bytes.iter().map(|b| format!("{b:02x}")).collect();
    client.set_nonce(nonce.clone());
    client.send(&handshake_response(id, "plain", &nonce)).await
}
