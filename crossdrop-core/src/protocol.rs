//! Signaling protocol: the JSON envelopes exchanged over a relay session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::DeviceId;
use crate::registry::Device;

/// `error.message` when the routing target has no live session.
pub const TARGET_UNAVAILABLE: &str = "target-unavailable";
/// `error.message` when a pair-response carries a bad or mismatched token.
pub const INVALID_PAIR_TOKEN: &str = "invalid-pair-token";
/// Error body for pairing with a device the registry does not know.
pub const DEVICE_NOT_FOUND: &str = "device-not-found";

/// Peer-channel negotiation payload (offer, answer, ICE candidate, generic signal). Only the
/// envelope is read; everything else rides along untouched in `payload`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DeviceId>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DeviceId>,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Every message kind, keyed by the `type` field. Unknown kinds fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Server → client on connect, carrying the anonymous session id.
    Welcome { id: DeviceId },
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<Map<String, Value>>,
    },
    Registered { id: DeviceId },
    DeviceList { devices: Vec<Device> },
    /// Client asks for the device list for itself only.
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DeviceId>,
    },
    Offer(Relay),
    Answer(Relay),
    Candidate(Relay),
    Signal(Relay),
    PairRequest(PairRequest),
    PairResponse(PairResponse),
    Error { message: String },
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DeviceId>,
    },
}

impl SignalMessage {
    pub fn error(message: impl Into<String>) -> Self {
        SignalMessage::Error {
            message: message.into(),
        }
    }

    /// Envelope `from`, when the message carries one.
    pub fn envelope_from(&self) -> Option<&DeviceId> {
        match self {
            SignalMessage::List { from } | SignalMessage::Heartbeat { from } => from.as_ref(),
            SignalMessage::Offer(r)
            | SignalMessage::Answer(r)
            | SignalMessage::Candidate(r)
            | SignalMessage::Signal(r) => r.from.as_ref(),
            SignalMessage::PairRequest(p) => p.from.as_ref(),
            SignalMessage::PairResponse(p) => p.from.as_ref(),
            _ => None,
        }
    }

    /// Wire name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Welcome { .. } => "welcome",
            SignalMessage::Register { .. } => "register",
            SignalMessage::Registered { .. } => "registered",
            SignalMessage::DeviceList { .. } => "device-list",
            SignalMessage::List { .. } => "list",
            SignalMessage::Offer(_) => "offer",
            SignalMessage::Answer(_) => "answer",
            SignalMessage::Candidate(_) => "candidate",
            SignalMessage::Signal(_) => "signal",
            SignalMessage::PairRequest(_) => "pair-request",
            SignalMessage::PairResponse(_) => "pair-response",
            SignalMessage::Error { .. } => "error",
            SignalMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}
