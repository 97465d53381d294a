//! Connection router: binds live transport sessions to device ids, forwards point-to-point
//! messages and fans out broadcasts.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::identity::DeviceId;
use crate::protocol::SignalMessage;
use crate::wire;

/// Host-side handle to one live connection. Sending never blocks; the host queues the frame.
pub trait Transport {
    /// Queue a text frame. Returns false when the connection is no longer writable.
    fn send_text(&self, text: String) -> bool;

    fn is_writable(&self) -> bool;
}

/// Stable handle for one connection, independent of the id it is currently known by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

struct Session<T> {
    conn: ConnectionId,
    transport: T,
}

/// Live sessions keyed by device id. A connection starts under an anonymous id and is
/// re-keyed once it registers.
pub struct Router<T> {
    sessions: HashMap<DeviceId, Session<T>>,
    ids: HashMap<ConnectionId, DeviceId>,
    next_conn: u64,
}

impl<T: Transport> Router<T> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            ids: HashMap::new(),
            next_conn: 0,
        }
    }

    /// Track a new connection under a fresh anonymous id and greet it with `welcome{id}`.
    pub fn connect(&mut self, transport: T) -> ConnectionId {
        let conn = ConnectionId(self.next_conn);
        self.next_conn += 1;
        let mut id = DeviceId::anonymous();
        while self.sessions.contains_key(&id) {
            id = DeviceId::anonymous();
        }
        send(&transport, &SignalMessage::Welcome { id: id.clone() });
        debug!(conn = conn.0, session = %id, "session opened");
        self.sessions.insert(id.clone(), Session { conn, transport });
        self.ids.insert(conn, id);
        conn
    }

    /// Id the connection is currently known by.
    pub fn session_id(&self, conn: ConnectionId) -> Option<&DeviceId> {
        self.ids.get(&conn)
    }

    /// Move a connection's session to `id`. An older session already holding `id` is dropped.
    pub fn rekey(&mut self, conn: ConnectionId, id: DeviceId) -> bool {
        let Some(old) = self.ids.get(&conn).cloned() else {
            return false;
        };
        if old == id {
            return true;
        }
        let Some(session) = self.sessions.remove(&old) else {
            return false;
        };
        if let Some(displaced) = self.sessions.insert(id.clone(), session) {
            warn!(device = %id, "device reconnected; dropping previous session");
            self.ids.remove(&displaced.conn);
        }
        self.ids.insert(conn, id);
        true
    }

    /// Forward `msg` to the session for `target`. False when there is no such session or it
    /// is not writable; nothing is queued or retried.
    pub fn route(&self, target: &DeviceId, msg: &SignalMessage) -> bool {
        match self.sessions.get(target) {
            Some(session) if session.transport.is_writable() => send(&session.transport, msg),
            _ => {
                debug!(target = %target, kind = msg.kind(), "route target unavailable");
                false
            }
        }
    }

    /// Reply on a specific connection.
    pub fn send_to(&self, conn: ConnectionId, msg: &SignalMessage) -> bool {
        match self.ids.get(&conn) {
            Some(id) => self.route(id, msg),
            None => false,
        }
    }

    /// Forget a closed connection. Returns the id it was known by.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<DeviceId> {
        let id = self.ids.remove(&conn)?;
        self.sessions.remove(&id);
        debug!(conn = conn.0, session = %id, "session closed");
        Some(id)
    }

    /// Tear down the session bound to `id`, if any. Dropping the transport ends the connection.
    pub fn remove_device(&mut self, id: &DeviceId) -> bool {
        match self.sessions.remove(id) {
            Some(session) => {
                self.ids.remove(&session.conn);
                true
            }
            None => false,
        }
    }

    /// Send `msg` to every writable session. Returns how many accepted it.
    pub fn broadcast(&self, msg: &SignalMessage) -> usize {
        let text = match wire::encode_message(msg) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, kind = msg.kind(), "broadcast encode failed");
                return 0;
            }
        };
        self.sessions
            .values()
            .filter(|s| s.transport.is_writable())
            .filter(|s| s.transport.send_text(text.clone()))
            .count()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T: Transport> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn send<T: Transport>(transport: &T, msg: &SignalMessage) -> bool {
    match wire::encode_message(msg) {
        Ok(text) => transport.send_text(text),
        Err(e) => {
            warn!(error = %e, kind = msg.kind(), "encode failed");
            false
        }
    }
}
