use tokio::sync::broadcast;

/// Lifecycle events surfaced to the host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The transport opened.
    Connected,
    /// The transport closed (not emitted for a manual disconnect).
    Disconnected,
    /// The gateway accepted Identify.
    Ready {
        username: String,
        discriminator: String,
    },
    /// The observed voice placement matches the configured target.
    VoiceReady,
    /// A recoverable fault. The session keeps running.
    Error { message: String },
    /// Informational trace, not authoritative.
    Debug { message: String },
    /// The retry budget is spent; nothing further is scheduled automatically.
    ReconnectExhausted,
}

/// Coarse connection state, observable through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Identifying,
    Ready,
    Closed,
    Exhausted,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Open | Self::Identifying | Self::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Identifying => "identifying",
            Self::Ready => "ready",
            Self::Closed => "closed",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Per-session subscription registry for [`GatewayEvent`]s.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: GatewayEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.emit(GatewayEvent::Debug { message });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(GatewayEvent::Error { message });
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        let hub = EventHub::default();
        hub.emit(GatewayEvent::Connected);
        hub.debug("nobody listening");
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        hub.emit(GatewayEvent::Connected);
        hub.error("boom");
        assert_eq!(rx.recv().await.unwrap(), GatewayEvent::Connected);
        assert_eq!(
            rx.recv().await.unwrap(),
            GatewayEvent::Error {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn connected_states() {
        assert!(ConnectionState::Ready.is_connected());
        assert!(ConnectionState::Identifying.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Exhausted.is_connected());
    }
}
