//! Wire types for the gateway protocol: the `{op, d, s, t}` frame envelope
//! and the typed payloads carried inside it.

pub mod gateway;
pub mod presence;
pub mod user;
pub mod voice;

pub use gateway::{FrameError, GatewayMessage};
