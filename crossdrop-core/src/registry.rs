//! Device registry: in-memory directory of known devices and their mutual trust edges.
//!
//! Nothing here fails loudly. Unknown ids come back as `None`/`false` and the caller decides
//! what to surface.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::identity::DeviceId;

/// Largest accepted `info`, measured as encoded JSON. Larger metadata is dropped at
/// registration so the aggregate `device-list` stays small.
pub const MAX_DEVICE_INFO_LEN: usize = 16 * 1024;
/// Device names are cut to this many characters.
pub const MAX_DEVICE_NAME_CHARS: usize = 256;

/// Milliseconds since the Unix epoch; the unit of `Device::last_seen`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A registered participant. `info` is free-form client metadata (user agent, platform, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub info: Map<String, Value>,
    pub last_seen: u64,
}

/// Input to `Registry::register`. A missing id is assigned by the registry.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub id: Option<DeviceId>,
    pub name: String,
    pub info: Map<String, Value>,
}

/// Fields merged into an existing device by `Registry::update`. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub info: Option<Map<String, Value>>,
}

#[derive(Debug, Default)]
pub struct Registry {
    devices: HashMap<DeviceId, Device>,
    /// Symmetric adjacency: `b ∈ trusted[a]` iff `a ∈ trusted[b]`.
    trusted: HashMap<DeviceId, HashSet<DeviceId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a device, assigning a fresh id when none is given. Registering an existing id
    /// replaces that entry.
    pub fn register(&mut self, info: DeviceInfo) -> Device {
        let id = match info.id {
            Some(id) if !id.is_empty() => id,
            _ => self.fresh_id(),
        };
        let device = Device {
            id: id.clone(),
            name: bounded_name(info.name),
            info: bounded_info(&id, info.info),
            last_seen: now_millis(),
        };
        debug!(device = %id, name = %device.name, "device registered");
        self.devices.insert(id, device.clone());
        device
    }

    /// Merge `patch` into the device and refresh `last_seen`. Unknown id: `None`, registry untouched.
    pub fn update(&mut self, id: &DeviceId, patch: DevicePatch) -> Option<Device> {
        let device = self.devices.get_mut(id)?;
        if let Some(name) = patch.name {
            device.name = bounded_name(name);
        }
        if let Some(info) = patch.info {
            device.info = bounded_info(id, info);
        }
        device.last_seen = now_millis();
        Some(device.clone())
    }

    /// Update the device if known, otherwise register it under `id`.
    pub fn upsert(&mut self, id: DeviceId, name: String, info: Map<String, Value>) -> Device {
        let patch = DevicePatch {
            name: Some(name.clone()),
            info: Some(info.clone()),
        };
        match self.update(&id, patch) {
            Some(device) => device,
            None => self.register(DeviceInfo {
                id: Some(id),
                name,
                info,
            }),
        }
    }

    /// Refresh `last_seen` only. Returns false for an unknown id.
    pub fn touch(&mut self, id: &DeviceId) -> bool {
        self.update(id, DevicePatch::default()).is_some()
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<Device> {
        self.devices.remove(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn list(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Record mutual trust between `a` and `b`. Idempotent; a device never trusts itself.
    pub fn add_trusted(&mut self, a: &DeviceId, b: &DeviceId) {
        if a == b {
            return;
        }
        info!(a = %a, b = %b, "trust established");
        self.trusted.entry(a.clone()).or_default().insert(b.clone());
        self.trusted.entry(b.clone()).or_default().insert(a.clone());
    }

    pub fn get_trusted(&self, id: &DeviceId) -> BTreeSet<DeviceId> {
        self.trusted
            .get(id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_trusted(&self, a: &DeviceId, b: &DeviceId) -> bool {
        self.trusted.get(a).is_some_and(|s| s.contains(b))
    }

    /// Remove every device whose `last_seen` is more than `timeout_ms` before `now_ms`.
    /// Returns the evicted ids. Trust edges are kept so a device rejoining by token keeps them.
    pub fn evict_stale(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<DeviceId> {
        let stale: Vec<DeviceId> = self
            .devices
            .values()
            .filter(|d| now_ms.saturating_sub(d.last_seen) > timeout_ms)
            .map(|d| d.id.clone())
            .collect();
        for id in &stale {
            self.devices.remove(id);
        }
        stale
    }

    fn fresh_id(&self) -> DeviceId {
        loop {
            let id = DeviceId::generate();
            if !self.devices.contains_key(&id) {
                return id;
            }
        }
    }
}

fn bounded_name(name: String) -> String {
    match name.char_indices().nth(MAX_DEVICE_NAME_CHARS) {
        Some((cut, _)) => name[..cut].to_string(),
        None => name,
    }
}

fn bounded_info(id: &DeviceId, info: Map<String, Value>) -> Map<String, Value> {
    let len = serde_json::to_string(&info).map_or(usize::MAX, |s| s.len());
    if len > MAX_DEVICE_INFO_LEN {
        warn!(device = %id, len, max = MAX_DEVICE_INFO_LEN, "device info too large; dropped");
        return Map::new();
    }
    info
}
