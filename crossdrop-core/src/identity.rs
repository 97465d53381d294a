//! Device identity: the string ids devices and sessions are known by.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length in bytes of an anonymous session handle before hex encoding.
const ANONYMOUS_ID_BYTES: usize = 8;

/// Device or session id. Registry-assigned ids are UUID v4 strings; sessions that have not
/// registered yet carry a random hex handle.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    /// Fresh globally unique device id.
    pub fn generate() -> Self {
        DeviceId(uuid::Uuid::new_v4().to_string())
    }

    /// Temporary handle for a connection that has not registered yet.
    pub fn anonymous() -> Self {
        let mut bytes = [0u8; ANONYMOUS_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        DeviceId(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        DeviceId(s)
    }
}
