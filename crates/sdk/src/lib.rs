//! Server SDK for the tunnel signaling protocol
//!
//! This crate lets a backend application register itself with a hosted
//! real-time tunnel broker: it requests fresh tunnel connect URLs on
//! demand, emits signed lifecycle packets (connect / message / close), and
//! serves the signed webhook callbacks the broker relays back, dispatching
//! them to caller-supplied [`TunnelHandler`] callbacks. Authenticity in
//! both directions rests on a shared-secret signature scheme.
//!
//! The broker owns the actual WebSocket; this SDK only negotiates URLs and
//! relays lifecycle metadata over plain signed HTTP.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod protocol;
pub mod service;
pub mod signature;

// Re-export commonly used types for convenience
pub use auth::{AuthClient, LoginChecker};
pub use broker::BrokerClient;
pub use config::Config;
pub use error::{Result, TunnelError};
pub use handler::{NoopHandler, TunnelHandler};
pub use identity::ClientIdentity;
pub use protocol::{PacketKind, TunnelInfo};
pub use service::TunnelService;
pub use signature::SignatureService;
