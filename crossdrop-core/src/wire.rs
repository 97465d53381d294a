//! Framing for signaling sessions: one JSON text message per transport frame.

use crate::protocol::SignalMessage;

pub const MAX_MESSAGE_LEN: usize = 1024 * 1024; // 1 MiB

/// Encode a message as a single JSON text frame. Outbound frames are not capped: a
/// `device-list` aggregates every device and may legitimately exceed the inbound limit.
pub fn encode_message(msg: &SignalMessage) -> Result<String, WireError> {
    serde_json::to_string(msg).map_err(WireError::Encode)
}

/// Decode one text frame. Frames over `MAX_MESSAGE_LEN` are refused; unknown `type` tags and
/// missing required fields are errors.
pub fn decode_message(text: &str) -> Result<SignalMessage, WireError> {
    if text.len() > MAX_MESSAGE_LEN {
        return Err(WireError::TooLarge);
    }
    serde_json::from_str(text).map_err(WireError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(serde_json::Error),
    #[error("decode error: {0}")]
    Decode(serde_json::Error),
    #[error("message too large")]
    TooLarge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceId;
    use crate::protocol::{PairResponse, Relay};
    use serde_json::{json, Value};

    #[test]
    fn relay_keeps_opaque_payload() {
        let text = r#"{"type":"offer","target":"b1","sdp":{"type":"offer","sdp":"v=0"},"extra":[1,2]}"#;
        let msg = decode_message(text).unwrap();
        let SignalMessage::Offer(relay) = &msg else {
            panic!("expected offer, got {msg:?}");
        };
        assert_eq!(relay.target, Some(DeviceId::from("b1")));
        assert_eq!(relay.from, None);
        assert_eq!(relay.payload["sdp"]["sdp"], "v=0");
        assert_eq!(relay.payload["extra"], json!([1, 2]));
        assert!(!relay.payload.contains_key("type"));

        let out: Value = serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(out["type"], "offer");
        assert_eq!(out["sdp"]["type"], "offer");
        assert_eq!(out["target"], "b1");
    }

    #[test]
    fn kebab_case_tags() {
        let msg = SignalMessage::PairResponse(PairResponse {
            target: Some("a1".into()),
            from: Some("b1".into()),
            accepted: true,
            token: None,
        });
        let out: Value = serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(
            out,
            json!({"type":"pair-response","target":"a1","from":"b1","accepted":true})
        );
        let list = encode_message(&SignalMessage::DeviceList { devices: vec![] }).unwrap();
        assert_eq!(list, r#"{"type":"device-list","devices":[]}"#);
    }

    #[test]
    fn register_fields_optional() {
        let msg = decode_message(r#"{"type":"register"}"#).unwrap();
        assert_eq!(
            msg,
            SignalMessage::Register {
                token: None,
                name: None,
                info: None
            }
        );
        assert!(matches!(
            decode_message(r#"{"type":"heartbeat"}"#).unwrap(),
            SignalMessage::Heartbeat { from: None }
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(
            decode_message(r#"{"type":"launch-missiles"}"#),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            decode_message(r#"{"target":"b1"}"#),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            decode_message("{not json"),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn oversized_inbound_rejected() {
        let big = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(decode_message(&big), Err(WireError::TooLarge)));
    }

    #[test]
    fn outbound_frames_are_not_capped() {
        let big = "x".repeat(MAX_MESSAGE_LEN + 1);
        let msg = SignalMessage::Signal(Relay {
            target: Some("b1".into()),
            from: None,
            payload: [("blob".to_string(), Value::from(big))].into_iter().collect(),
        });
        assert!(encode_message(&msg).unwrap().len() > MAX_MESSAGE_LEN);
    }
}
