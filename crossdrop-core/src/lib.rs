//! CrossDrop core: device registry, signaling router, pairing and the peer transfer protocol.
//! Host-driven: no network I/O; the host passes connection events and frames in and owns
//! the sockets.

pub mod core;
pub mod identity;
pub mod pairing;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod stream;
pub mod token;
pub mod transfer;
pub mod wire;

pub use self::core::SignalingCore;
pub use identity::DeviceId;
pub use protocol::{SignalMessage, DEVICE_NOT_FOUND, INVALID_PAIR_TOKEN, TARGET_UNAVAILABLE};
pub use registry::{Device, Registry};
pub use router::{ConnectionId, Router, Transport};
pub use token::{HmacTokenIssuer, TokenIssuer};
pub use wire::{decode_message, encode_message, WireError};
