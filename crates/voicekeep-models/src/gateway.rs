use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Client -> Server opcodes
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_PRESENCE_UPDATE: u8 = 3;
pub const OP_VOICE_STATE_UPDATE: u8 = 4;

// Server -> Client opcodes
pub const OP_DISPATCH: u8 = 0;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

// Dispatch event names
pub const EVENT_READY: &str = "READY";
pub const EVENT_VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";

/// High-volume dispatch types that carry nothing this client acts on.
/// Frames with these event types are dropped before sequence tracking.
pub const EXCLUDED_EVENTS: [&str; 3] = [
    "CHANNEL_UNREAD_UPDATE",
    "CONVERSATION_SUMMARY_UPDATE",
    "SESSIONS_REPLACE",
];

/// Identify intents bitfield (GUILD_VOICE_STATES).
pub const IDENTIFY_INTENTS: u64 = 128;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame op {op} carries no payload")]
    MissingPayload { op: u8 },
    #[error("invalid payload for op {op}: {source}")]
    InvalidPayload {
        op: u8,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The gateway frame envelope. `d` is always serialized (as `null` when
/// absent) because heartbeats with no sequence are sent as `{"op":1,"d":null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::Malformed)
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Encode)
    }

    /// Build an outbound command frame from a typed payload.
    pub fn command<T: Serialize>(op: u8, payload: &T) -> Result<Self, FrameError> {
        let d = serde_json::to_value(payload).map_err(FrameError::Encode)?;
        Ok(Self {
            op,
            d: Some(d),
            s: None,
            t: None,
        })
    }

    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OP_HEARTBEAT,
            d: last_sequence.map(Value::from),
            s: None,
            t: None,
        }
    }

    /// Deserialize `d` into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        let d = self
            .d
            .clone()
            .ok_or(FrameError::MissingPayload { op: self.op })?;
        serde_json::from_value(d).map_err(|source| FrameError::InvalidPayload { op: self.op, source })
    }

    pub fn event_type(&self) -> Option<&str> {
        self.t.as_deref()
    }

    pub fn is_excluded(&self) -> bool {
        self.t
            .as_deref()
            .is_some_and(|t| EXCLUDED_EVENTS.contains(&t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    pub token: String,
    pub intents: u64,
    pub properties: IdentifyProperties,
}

impl Identify {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: IDENTIFY_INTENTS,
            properties: IdentifyProperties::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: "Windows".into(),
            browser: "Chrome".into(),
            device: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_hello() {
        let msg = GatewayMessage::decode(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
            .unwrap();
        assert_eq!(msg.op, OP_HELLO);
        assert_eq!(msg.s, None);
        let hello: Hello = msg.payload().unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            GatewayMessage::decode("{not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            GatewayMessage::decode(r#"{"d":{}}"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn payload_reports_missing_d() {
        let msg = GatewayMessage::decode(r#"{"op":11}"#).unwrap();
        assert!(matches!(
            msg.payload::<Hello>(),
            Err(FrameError::MissingPayload { op: 11 })
        ));
    }

    #[test]
    fn heartbeat_serializes_null_without_sequence() {
        let text = GatewayMessage::heartbeat(None).encode().unwrap();
        assert_eq!(text, r#"{"op":1,"d":null}"#);
        let text = GatewayMessage::heartbeat(Some(42)).encode().unwrap();
        assert_eq!(text, r#"{"op":1,"d":42}"#);
    }

    #[test]
    fn identify_frame_shape() {
        let frame = GatewayMessage::command(OP_IDENTIFY, &Identify::new("tok")).unwrap();
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "op": 2,
                "d": {
                    "token": "tok",
                    "intents": 128,
                    "properties": { "os": "Windows", "browser": "Chrome", "device": "" }
                }
            })
        );
    }

    #[test]
    fn excluded_event_types() {
        for t in EXCLUDED_EVENTS {
            let msg = GatewayMessage {
                op: OP_DISPATCH,
                d: None,
                s: Some(3),
                t: Some(t.to_string()),
            };
            assert!(msg.is_excluded());
        }
        let ready = GatewayMessage {
            op: OP_DISPATCH,
            d: None,
            s: Some(1),
            t: Some(EVENT_READY.to_string()),
        };
        assert!(!ready.is_excluded());
        assert!(!GatewayMessage::heartbeat(None).is_excluded());
    }
}
