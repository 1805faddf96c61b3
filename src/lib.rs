//! webridge - bridges the erssi fe-web JSON-over-WebSocket protocol to
//! WeeChat relay clients.
//!
//! The binary wires three pieces together: the [`upstream`] driver (a
//! WebSocket client that decrypts and normalizes fe-web events), the
//! [`server`] (a TCP listener speaking the WeeChat relay protocol), and the
//! [`translator`] (the canonical buffer/line/nick store). The [`bridge`]
//! orchestrator owns the event policies between them.

pub mod bridge;
pub mod config;
pub mod error;
pub mod server;
pub mod translator;
pub mod upstream;

pub use bridge::Bridge;
pub use config::Config;
pub use server::{ClientCommand, RelayServer};
pub use translator::Translator;
