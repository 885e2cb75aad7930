//! Gateway session client.
//!
//! One [`GatewayClient`] drives one authenticated gateway session from a
//! single spawned task: it identifies, keeps the heartbeat going, tracks the
//! session's voice placement against a fixed [`VoiceTarget`], and rejoins or
//! reconnects with a bounded retry budget when either drifts.

pub mod config;
pub mod connection;
pub mod events;
pub mod heartbeat;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod voice;

pub use config::{AutoReconnectConfig, ConfigError, GatewayConfig, PresenceConfig};
pub use connection::{GatewayClient, GatewayError, GATEWAY_URL};
pub use events::{ConnectionState, EventHub, GatewayEvent};
pub use transport::{ConnectionHandle, Connector, TransportError, WsConnector};
pub use voice::VoiceTarget;
