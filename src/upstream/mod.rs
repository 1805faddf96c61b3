//! Upstream driver - WebSocket client for the erssi fe-web server.
//!
//! Authentication is a `password` query parameter on the dial URL; fe-web
//! validates it during the WebSocket handshake, so a successful dial means
//! we are authenticated. Encrypted traffic arrives as binary frames;
//! plaintext JSON arrives as text frames during the handshake or when
//! encryption is disabled.

pub mod crypto;
pub mod message;

pub use message::{EventKind, NickInfo, WebMessage};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as RustlsError, SignatureScheme};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, error, info, warn};

use crate::error::{UpstreamError, UpstreamResult};

/// How long the WebSocket dial may take before we give up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth of the inbound and outbound message channels.
const CHANNEL_DEPTH: usize = 64;

/// A live upstream connection.
///
/// `outgoing` accepts canonical messages to serialize onto the socket;
/// `events` yields parsed, normalized inbound messages. Each event is a
/// distinct owned value, so consumers may process them on any task without
/// racing the read loop. When the socket dies the read loop exits and
/// `events` closes; there is no automatic reconnect.
pub struct UpstreamConnection {
    /// Sender for outgoing requests.
    pub outgoing: mpsc::Sender<WebMessage>,
    /// Stream of inbound events, in receive order.
    pub events: mpsc::Receiver<WebMessage>,
}

/// Dial the upstream and spawn its read/write loops.
pub async fn connect(url: &str, password: &str) -> UpstreamResult<UpstreamConnection> {
    let dial_url = url_with_password(url, password);

    let request = dial_url
        .as_str()
        .into_client_request()
        .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;

    // fe-web deployments routinely use self-signed certificates;
    // certificate policy belongs to the reverse proxy in front of us.
    let connector = Connector::Rustls(Arc::new(insecure_tls_config()));

    info!(component = "upstream", %url, "Connecting to erssi");
    let (socket, response) = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        connect_async_tls_with_config(request, None, false, Some(connector)),
    )
    .await
    .map_err(|_| UpstreamError::HandshakeTimeout(HANDSHAKE_TIMEOUT))??;
    debug!(component = "upstream", status = %response.status(), "WebSocket handshake complete");

    let key = if password.is_empty() {
        None
    } else {
        Some(crypto::derive_key(password)?)
    };

    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<WebMessage>(CHANNEL_DEPTH);
    let (events_tx, events_rx) = mpsc::channel::<WebMessage>(CHANNEL_DEPTH);

    // Writer task: serialize canonical messages to JSON text frames.
    tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!(component = "upstream", error = %e, "Failed to serialize message");
                    continue;
                }
            };
            debug!(component = "upstream", r#type = ?msg.kind, "Sending message");
            if let Err(e) = sink.send(WsMessage::Text(json)).await {
                error!(component = "upstream", error = %e, "Write error");
                break;
            }
        }
    });

    // Read loop: decrypt, parse, normalize, hand off an owned copy.
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let data = match frame {
                Ok(WsMessage::Binary(data)) => match &key {
                    Some(key) => match crypto::decrypt_frame(key, &data) {
                        Ok(plaintext) => plaintext,
                        Err(e) => {
                            warn!(component = "upstream", error = %e, "Dropping undecryptable frame");
                            continue;
                        }
                    },
                    None => data,
                },
                Ok(WsMessage::Text(text)) => text.into_bytes(),
                Ok(WsMessage::Close(_)) => {
                    info!(component = "upstream", "Upstream closed the connection");
                    break;
                }
                Ok(_) => continue, // ping/pong handled by the library
                Err(e) => {
                    error!(component = "upstream", error = %e, "Read error");
                    break;
                }
            };

            let msg = match serde_json::from_slice::<WebMessage>(&data) {
                Ok(msg) => msg.normalize(),
                Err(e) => {
                    warn!(component = "upstream", error = %e, "Dropping unparseable frame");
                    continue;
                }
            };

            debug!(
                component = "upstream",
                r#type = ?msg.kind,
                server_tag = %msg.server_tag,
                target = %msg.target,
                "Received message"
            );

            if events_tx.send(msg).await.is_err() {
                break; // consumer gone
            }
        }
        info!(component = "upstream", "Read loop stopped");
    });

    Ok(UpstreamConnection {
        outgoing: outgoing_tx,
        events: events_rx,
    })
}

/// Append the password query parameter, percent-encoding reserved bytes.
fn url_with_password(url: &str, password: &str) -> String {
    if password.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(password, NON_ALPHANUMERIC);
    format!("{url}{separator}password={encoded}")
}

/// TLS configuration that accepts any server certificate.
fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureServerCertVerifier))
        .with_no_client_auth()
}

/// Certificate verifier that accepts everything, for self-signed fe-web
/// endpoints.
#[derive(Debug)]
struct InsecureServerCertVerifier;

impl ServerCertVerifier for InsecureServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_percent_encoded() {
        assert_eq!(
            url_with_password("wss://host:9001", "p&ss#w"),
            "wss://host:9001?password=p%26ss%23w"
        );
        assert_eq!(
            url_with_password("wss://host:9001/?foo=1", "abc"),
            "wss://host:9001/?foo=1&password=abc"
        );
        assert_eq!(url_with_password("ws://host:9001", ""), "ws://host:9001");
    }
}
