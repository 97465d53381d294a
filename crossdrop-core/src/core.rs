//! Host-driven signaling core: the host passes connection events and inbound text; the core
//! updates registry, router and trust state and writes replies through the transports.
//!
//! Every method is one atomic step. A multi-threaded host keeps the whole core behind a single
//! mutex so no connection ever observes a half-applied update.

use std::sync::Arc;

use serde_json::Map;
use tracing::{debug, info, warn};

use crate::identity::DeviceId;
use crate::pairing::{PairError, PairState, Pairing};
use crate::protocol::{
    PairRequest, PairResponse, Relay, SignalMessage, INVALID_PAIR_TOKEN, TARGET_UNAVAILABLE,
};
use crate::registry::{Device, DeviceInfo, Registry};
use crate::router::{ConnectionId, Router, Transport};
use crate::token::{TokenError, TokenIssuer};
use crate::wire;

/// Name given to devices that register without one.
pub const UNKNOWN_DEVICE_NAME: &str = "unknown";

/// Main coordinator: registry + router + token issuer behind one owner.
pub struct SignalingCore<T> {
    registry: Registry,
    router: Router<T>,
    tokens: Arc<dyn TokenIssuer>,
    require_pair_token: bool,
}

impl<T: Transport> SignalingCore<T> {
    pub fn new(tokens: Arc<dyn TokenIssuer>) -> Self {
        Self {
            registry: Registry::new(),
            router: Router::new(),
            tokens,
            require_pair_token: false,
        }
    }

    /// When set, pair requests relayed over a session carry a pair token and responses
    /// without one are refused.
    pub fn set_require_pair_token(&mut self, required: bool) {
        self.require_pair_token = required;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn router(&self) -> &Router<T> {
        &self.router
    }

    pub fn tokens(&self) -> &dyn TokenIssuer {
        self.tokens.as_ref()
    }

    /// New transport: track it under an anonymous id and send `welcome`.
    pub fn on_connect(&mut self, transport: T) -> ConnectionId {
        self.router.connect(transport)
    }

    /// Transport closed: drop its session and refresh everyone's device list. The registry
    /// entry stays until it goes stale.
    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        if let Some(id) = self.router.disconnect(conn) {
            info!(session = %id, "client disconnected");
            self.broadcast_device_list();
        }
    }

    /// One inbound text frame. Anything that does not decode to a known message is dropped.
    pub fn on_text(&mut self, conn: ConnectionId, text: &str) {
        match wire::decode_message(text) {
            Ok(msg) => self.on_message(conn, msg),
            Err(e) => warn!(conn = ?conn, error = %e, "discarding malformed message"),
        }
    }

    pub fn on_message(&mut self, conn: ConnectionId, msg: SignalMessage) {
        let Some(session_id) = self.router.session_id(conn).cloned() else {
            debug!(conn = ?conn, "message for closed session");
            return;
        };

        if let SignalMessage::Register { token, name, info } = msg {
            self.on_register(conn, token.as_deref(), name, info.unwrap_or_default());
            return;
        }

        let who = msg.envelope_from().cloned().unwrap_or_else(|| session_id.clone());
        self.registry.touch(&who);

        match msg {
            SignalMessage::List { .. } => {
                let list = self.device_list();
                self.router.send_to(conn, &list);
            }
            SignalMessage::Offer(relay) => self.relay(conn, &session_id, relay, SignalMessage::Offer),
            SignalMessage::Answer(relay) => {
                self.relay(conn, &session_id, relay, SignalMessage::Answer)
            }
            SignalMessage::Candidate(relay) => {
                self.relay(conn, &session_id, relay, SignalMessage::Candidate)
            }
            SignalMessage::Signal(relay) => {
                self.relay(conn, &session_id, relay, SignalMessage::Signal)
            }
            SignalMessage::PairRequest(req) => self.on_pair_request(conn, &session_id, req),
            SignalMessage::PairResponse(resp) => self.on_pair_response(conn, &session_id, resp),
            SignalMessage::Heartbeat { .. } => {}
            other => debug!(kind = other.kind(), "ignoring server-bound message kind"),
        }
    }

    /// `register`: a valid registration token rejoins under the token's id, anything else
    /// gets a fresh ephemeral device. Replies `registered{id}` and broadcasts.
    pub fn on_register(
        &mut self,
        conn: ConnectionId,
        token: Option<&str>,
        name: Option<String>,
        info: Map<String, serde_json::Value>,
    ) -> Option<DeviceId> {
        let claims = token.and_then(|t| self.tokens.verify_registration(t));
        let device = match claims {
            Some(claims) => {
                let name = Some(claims.name)
                    .filter(|n| !n.is_empty())
                    .or(name)
                    .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
                self.registry.upsert(claims.id, name, info)
            }
            None => {
                if token.is_some() {
                    debug!(conn = ?conn, "registration token rejected; registering ephemeral device");
                }
                self.registry.register(DeviceInfo {
                    id: None,
                    name: name.unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string()),
                    info,
                })
            }
        };
        if !self.router.rekey(conn, device.id.clone()) {
            return None;
        }
        info!(device = %device.id, name = %device.name, "device registered");
        self.router.send_to(
            conn,
            &SignalMessage::Registered {
                id: device.id.clone(),
            },
        );
        self.broadcast_device_list();
        Some(device.id)
    }

    /// Issue a registration token for `id` and upsert the device (`POST /token`).
    pub fn register_with_token(
        &mut self,
        id: DeviceId,
        name: String,
        info: Map<String, serde_json::Value>,
    ) -> Result<String, TokenError> {
        let token = self.tokens.issue_registration(&id, &name)?;
        self.registry.upsert(id, name, info);
        self.broadcast_device_list();
        Ok(token)
    }

    /// Forward a pair request with a fresh pair token; both devices must be registered.
    pub fn request_pair(
        &mut self,
        from_id: &DeviceId,
        to_id: &DeviceId,
        message: Option<String>,
    ) -> Result<PairState, PairError> {
        self.pairing().request_registered(from_id, to_id, message)
    }

    /// Token-less pair request; reports only whether it was routed.
    pub fn request_pair_simple(
        &mut self,
        from_id: &DeviceId,
        to_id: &DeviceId,
        message: Option<String>,
    ) -> bool {
        let msg = SignalMessage::PairRequest(PairRequest {
            target: None,
            from: Some(from_id.clone()),
            name: None,
            message,
            token: None,
        });
        self.router.route(to_id, &msg)
    }

    /// Evict devices not seen for more than `timeout_ms`, tear down their sessions and
    /// broadcast once if anything went.
    pub fn evict_stale(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<DeviceId> {
        let evicted = self.registry.evict_stale(now_ms, timeout_ms);
        if evicted.is_empty() {
            return evicted;
        }
        for id in &evicted {
            self.router.remove_device(id);
        }
        info!(count = evicted.len(), "evicted stale devices");
        self.broadcast_device_list();
        evicted
    }

    pub fn broadcast_device_list(&self) -> usize {
        self.router.broadcast(&self.device_list())
    }

    pub fn devices(&self) -> Vec<Device> {
        self.registry.list()
    }

    fn device_list(&self) -> SignalMessage {
        SignalMessage::DeviceList {
            devices: self.registry.list(),
        }
    }

    fn pairing(&mut self) -> Pairing<'_, T> {
        Pairing::new(
            &mut self.registry,
            &self.router,
            self.tokens.as_ref(),
            self.require_pair_token,
        )
    }

    fn relay(
        &self,
        conn: ConnectionId,
        session_id: &DeviceId,
        mut relay: Relay,
        wrap: fn(Relay) -> SignalMessage,
    ) {
        let Some(target) = relay.target.clone() else {
            debug!(conn = ?conn, "relay without target dropped");
            return;
        };
        if relay.from.is_none() {
            relay.from = Some(session_id.clone());
        }
        if !self.router.route(&target, &wrap(relay)) {
            self.router
                .send_to(conn, &SignalMessage::error(TARGET_UNAVAILABLE));
        }
    }

    fn on_pair_request(&mut self, conn: ConnectionId, session_id: &DeviceId, req: PairRequest) {
        let Some(target) = req.target else {
            return;
        };
        if req.from.as_ref().is_some_and(|f| f != session_id) {
            debug!(session = %session_id, "pair-request from field ignored; using session id");
        }
        let attach = self.require_pair_token;
        let state = self
            .pairing()
            .request(session_id, &target, req.name, req.message, attach);
        match state {
            Ok(PairState::Unavailable) => {
                self.router
                    .send_to(conn, &SignalMessage::error(TARGET_UNAVAILABLE));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pair request failed"),
        }
    }

    fn on_pair_response(&mut self, conn: ConnectionId, session_id: &DeviceId, resp: PairResponse) {
        let Some(target) = resp.target else {
            return;
        };
        if !self.registry.contains(session_id) {
            debug!(session = %session_id, "pair-response from unregistered session dropped");
            return;
        }
        if resp.from.as_ref().is_some_and(|f| f != session_id) {
            debug!(session = %session_id, "pair-response from field ignored; using session id");
        }
        let result =
            self.pairing()
                .respond(session_id, &target, resp.accepted, resp.token.as_deref());
        match result {
            Ok(PairState::Unavailable) | Err(PairError::DeviceNotFound) => {
                self.router
                    .send_to(conn, &SignalMessage::error(TARGET_UNAVAILABLE));
            }
            Ok(_) => {}
            Err(PairError::InvalidToken) => {
                self.router
                    .send_to(conn, &SignalMessage::error(INVALID_PAIR_TOKEN));
            }
            Err(e) => warn!(error = %e, "pair response failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::now_millis;
    use crate::router::testing::RecordingTransport;
    use crate::token::HmacTokenIssuer;

    fn core() -> SignalingCore<RecordingTransport> {
        SignalingCore::new(Arc::new(HmacTokenIssuer::new("core-secret")))
    }

    /// Connect and register a named client; returns its transport, connection and id.
    fn join(
        core: &mut SignalingCore<RecordingTransport>,
        name: &str,
    ) -> (RecordingTransport, ConnectionId, DeviceId) {
        let t = RecordingTransport::new();
        let conn = core.on_connect(t.clone());
        core.on_text(conn, &format!(r#"{{"type":"register","name":"{name}"}}"#));
        let id = core.router().session_id(conn).cloned().unwrap();
        (t, conn, id)
    }

    fn drain_all(ts: &[&RecordingTransport]) {
        for t in ts {
            t.take();
        }
    }

    #[test]
    fn register_replies_and_broadcasts() {
        let mut core = core();
        let (a, _, a_id) = join(&mut core, "Laptop");
        let msgs = a.take();
        assert!(matches!(msgs[0], SignalMessage::Welcome { .. }));
        assert_eq!(msgs[1], SignalMessage::Registered { id: a_id.clone() });
        match &msgs[2] {
            SignalMessage::DeviceList { devices } => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].id, a_id);
                assert_eq!(devices[0].name, "Laptop");
            }
            other => panic!("expected device-list, got {other:?}"),
        }

        let (b, _, _) = join(&mut core, "Phone");
        // A sees the refreshed list too.
        assert!(matches!(
            a.take().as_slice(),
            [SignalMessage::DeviceList { devices }] if devices.len() == 2
        ));
        assert_eq!(b.take().len(), 3);
    }

    #[test]
    fn register_with_token_keeps_identity() {
        let mut core = core();
        let token = core
            .register_with_token(DeviceId::from("persistent-1"), "Desk".into(), Map::new())
            .unwrap();
        let t = RecordingTransport::new();
        let conn = core.on_connect(t.clone());
        core.on_message(
            conn,
            SignalMessage::Register {
                token: Some(token),
                name: Some("ignored".into()),
                info: None,
            },
        );
        assert_eq!(
            core.router().session_id(conn),
            Some(&DeviceId::from("persistent-1"))
        );
        assert_eq!(core.registry().len(), 1);
        assert_eq!(
            core.registry().get(&DeviceId::from("persistent-1")).unwrap().name,
            "Desk"
        );
        assert!(t
            .take()
            .contains(&SignalMessage::Registered { id: DeviceId::from("persistent-1") }));
    }

    #[test]
    fn bad_registration_token_falls_back_to_ephemeral() {
        let mut core = core();
        let t = RecordingTransport::new();
        let conn = core.on_connect(t);
        let id = core
            .on_register(conn, Some("garbage"), Some("Tablet".into()), Map::new())
            .unwrap();
        assert_eq!(core.registry().get(&id).unwrap().name, "Tablet");
        let unnamed = core.on_connect(RecordingTransport::new());
        let id = core.on_register(unnamed, None, None, Map::new()).unwrap();
        assert_eq!(core.registry().get(&id).unwrap().name, UNKNOWN_DEVICE_NAME);
    }

    #[test]
    fn relay_sets_from_and_passes_payload() {
        let mut core = core();
        let (a, a_conn, a_id) = join(&mut core, "A");
        let (b, _, b_id) = join(&mut core, "B");
        drain_all(&[&a, &b]);

        core.on_text(
            a_conn,
            &format!(r#"{{"type":"candidate","target":"{b_id}","candidate":{{"sdpMid":"0"}}}}"#),
        );
        match b.take().as_slice() {
            [SignalMessage::Candidate(relay)] => {
                assert_eq!(relay.from, Some(a_id));
                assert_eq!(relay.payload["candidate"]["sdpMid"], "0");
            }
            other => panic!("expected candidate, got {other:?}"),
        }
        assert!(a.take().is_empty());
    }

    #[test]
    fn relay_to_unknown_target_reports_error() {
        let mut core = core();
        let (a, a_conn, _) = join(&mut core, "A");
        a.take();
        core.on_text(a_conn, r#"{"type":"offer","target":"nobody","sdp":"x"}"#);
        assert_eq!(a.take(), vec![SignalMessage::error(TARGET_UNAVAILABLE)]);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let mut core = core();
        let (a, a_conn, _) = join(&mut core, "A");
        a.take();
        core.on_text(a_conn, "{{{");
        core.on_text(a_conn, r#"{"type":"bogus"}"#);
        assert!(a.take().is_empty());
        assert_eq!(core.registry().len(), 1);
    }

    #[test]
    fn pairing_scenario() {
        let mut core = core();
        let (a, a_conn, a1) = join(&mut core, "A");
        let (b, b_conn, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);

        core.on_message(
            a_conn,
            SignalMessage::PairRequest(PairRequest {
                target: Some(b1.clone()),
                from: Some(a1.clone()),
                ..Default::default()
            }),
        );
        assert!(matches!(
            b.take().as_slice(),
            [SignalMessage::PairRequest(PairRequest { from: Some(f), .. })] if *f == a1
        ));

        core.on_message(
            b_conn,
            SignalMessage::PairResponse(PairResponse {
                target: Some(a1.clone()),
                from: Some(b1.clone()),
                accepted: true,
                token: None,
            }),
        );
        assert_eq!(core.registry().get_trusted(&a1).into_iter().collect::<Vec<_>>(), vec![b1.clone()]);
        assert_eq!(core.registry().get_trusted(&b1).into_iter().collect::<Vec<_>>(), vec![a1.clone()]);
        assert_eq!(
            a.take(),
            vec![SignalMessage::PairResponse(PairResponse {
                target: None,
                from: Some(b1),
                accepted: true,
                token: None,
            })]
        );
    }

    #[test]
    fn pairing_uses_session_ids_not_claimed_from() {
        let mut core = core();
        let (a, a_conn, a1) = join(&mut core, "A");
        let (b, b_conn, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);

        core.on_text(
            a_conn,
            &format!(r#"{{"type":"pair-request","target":"{b1}","from":"someone-else"}}"#),
        );
        match b.take().as_slice() {
            [SignalMessage::PairRequest(req)] => {
                assert_eq!(req.from.as_ref(), Some(&a1));
                assert_eq!(req.name.as_deref(), Some("A"));
            }
            other => panic!("expected pair-request, got {other:?}"),
        }

        core.on_text(
            b_conn,
            &format!(r#"{{"type":"pair-response","target":"{a1}","from":"mallory","accepted":true}}"#),
        );
        match a.take().as_slice() {
            [SignalMessage::PairResponse(resp)] => {
                assert_eq!(resp.from.as_ref(), Some(&b1));
                assert!(resp.accepted);
            }
            other => panic!("expected pair-response, got {other:?}"),
        }
        assert_eq!(core.registry().get_trusted(&a1).into_iter().collect::<Vec<_>>(), vec![b1]);
        assert!(core.registry().get_trusted(&DeviceId::from("mallory")).is_empty());
        assert!(core.registry().get_trusted(&DeviceId::from("someone-else")).is_empty());
    }

    #[test]
    fn unregistered_session_cannot_pair() {
        let mut core = core();
        let (a, _, a1) = join(&mut core, "A");
        let anon = RecordingTransport::new();
        let anon_conn = core.on_connect(anon.clone());
        let anon_id = core.router().session_id(anon_conn).cloned().unwrap();
        drain_all(&[&a, &anon]);

        core.on_text(
            anon_conn,
            &format!(r#"{{"type":"pair-response","target":"{a1}","accepted":true}}"#),
        );
        assert!(!core.registry().contains(&anon_id));
        assert!(core.registry().get_trusted(&a1).is_empty());
        assert!(core.registry().get_trusted(&anon_id).is_empty());
        assert!(a.take().is_empty());
        assert!(anon.take().is_empty());
    }

    #[test]
    fn pair_response_to_unknown_device_reports_error() {
        let mut core = core();
        let (a, a_conn, a1) = join(&mut core, "A");
        a.take();
        core.on_text(
            a_conn,
            r#"{"type":"pair-response","target":"ghost","accepted":true}"#,
        );
        assert_eq!(a.take(), vec![SignalMessage::error(TARGET_UNAVAILABLE)]);
        assert!(core.registry().get_trusted(&a1).is_empty());
        assert!(core.registry().get_trusted(&DeviceId::from("ghost")).is_empty());
    }

    #[test]
    fn oversized_device_info_does_not_stall_device_list() {
        let mut core = core();
        let watcher = RecordingTransport::new();
        core.on_connect(watcher.clone());
        let blob = "x".repeat(600 * 1024);
        for name in ["Big1", "Big2"] {
            let conn = core.on_connect(RecordingTransport::new());
            core.on_text(
                conn,
                &format!(r#"{{"type":"register","name":"{name}","info":{{"blob":"{blob}"}}}}"#),
            );
        }
        assert_eq!(core.registry().len(), 2);
        assert!(core.devices().iter().all(|d| d.info.is_empty()));
        assert!(matches!(
            watcher.take().last(),
            Some(SignalMessage::DeviceList { devices }) if devices.len() == 2
        ));

        let mut info = Map::new();
        info.insert("blob".into(), serde_json::Value::from(blob));
        core.register_with_token(DeviceId::from("rest-1"), "Rest".into(), info)
            .unwrap();
        assert!(core.registry().get(&DeviceId::from("rest-1")).unwrap().info.is_empty());

        let (late, _, _) = join(&mut core, "Late");
        assert!(matches!(
            late.take().last(),
            Some(SignalMessage::DeviceList { devices }) if devices.len() == 4
        ));
    }

    #[test]
    fn mismatched_pair_token_reports_error() {
        let mut core = core();
        let (a, _, a1) = join(&mut core, "A");
        let (b, b_conn, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);
        let wrong = core.tokens().issue_pair(&b1, &a1).unwrap();
        core.on_message(
            b_conn,
            SignalMessage::PairResponse(PairResponse {
                target: Some(a1.clone()),
                from: Some(b1.clone()),
                accepted: true,
                token: Some(wrong),
            }),
        );
        assert_eq!(b.take(), vec![SignalMessage::error(INVALID_PAIR_TOKEN)]);
        assert!(a.take().is_empty());
        assert!(core.registry().get_trusted(&a1).is_empty());
    }

    #[test]
    fn required_pair_token_is_attached_and_checked() {
        let mut core = core();
        core.set_require_pair_token(true);
        let (a, a_conn, a1) = join(&mut core, "A");
        let (b, b_conn, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);

        core.on_message(
            a_conn,
            SignalMessage::PairRequest(PairRequest {
                target: Some(b1.clone()),
                ..Default::default()
            }),
        );
        let token = match b.take().as_slice() {
            [SignalMessage::PairRequest(p)] => p.token.clone().unwrap(),
            other => panic!("expected pair-request, got {other:?}"),
        };
        core.on_message(
            b_conn,
            SignalMessage::PairResponse(PairResponse {
                target: Some(a1.clone()),
                from: None,
                accepted: true,
                token: Some(token),
            }),
        );
        assert!(core.registry().is_trusted(&a1, &b1));
    }

    #[test]
    fn pair_request_to_absent_device_reports_error() {
        let mut core = core();
        let (a, a_conn, _) = join(&mut core, "A");
        a.take();
        core.on_message(
            a_conn,
            SignalMessage::PairRequest(PairRequest {
                target: Some(DeviceId::from("gone")),
                ..Default::default()
            }),
        );
        assert_eq!(a.take(), vec![SignalMessage::error(TARGET_UNAVAILABLE)]);
    }

    #[test]
    fn request_pair_rest_paths() {
        let mut core = core();
        let (a, _, a1) = join(&mut core, "A");
        let (b, _, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);
        assert!(matches!(
            core.request_pair(&a1, &DeviceId::from("ghost"), None),
            Err(PairError::DeviceNotFound)
        ));
        assert_eq!(
            core.request_pair(&a1, &b1, Some("hello".into())).unwrap(),
            PairState::Requested
        );
        assert!(core.request_pair_simple(&a1, &b1, None));
        assert!(!core.request_pair_simple(&a1, &DeviceId::from("ghost"), None));
        assert_eq!(b.take().len(), 2);
    }

    #[test]
    fn list_replies_to_sender_only() {
        let mut core = core();
        let (a, a_conn, _) = join(&mut core, "A");
        let (b, _, _) = join(&mut core, "B");
        drain_all(&[&a, &b]);
        core.on_text(a_conn, r#"{"type":"list"}"#);
        assert!(matches!(
            a.take().as_slice(),
            [SignalMessage::DeviceList { devices }] if devices.len() == 2
        ));
        assert!(b.take().is_empty());
    }

    #[test]
    fn heartbeat_refreshes_last_seen() {
        let mut core = core();
        let (_, a_conn, a1) = join(&mut core, "A");
        let before = core.registry().get(&a1).unwrap().last_seen;
        core.on_text(a_conn, r#"{"type":"heartbeat"}"#);
        assert!(core.registry().get(&a1).unwrap().last_seen >= before);
    }

    #[test]
    fn disconnect_broadcasts_to_remaining() {
        let mut core = core();
        let (a, a_conn, a1) = join(&mut core, "A");
        let (b, _, _) = join(&mut core, "B");
        drain_all(&[&a, &b]);
        core.on_disconnect(a_conn);
        assert!(!core.router().contains(&a1));
        assert!(matches!(b.take().as_slice(), [SignalMessage::DeviceList { .. }]));
        assert!(!core.router().route(&a1, &SignalMessage::Heartbeat { from: None }));
    }

    #[test]
    fn stale_devices_evicted_with_broadcast() {
        let mut core = core();
        let (a, _, a1) = join(&mut core, "A");
        let (b, _, b1) = join(&mut core, "B");
        drain_all(&[&a, &b]);
        assert!(core.evict_stale(now_millis(), 60_000).is_empty());
        assert!(b.take().is_empty());

        let later = core.registry().get(&a1).unwrap().last_seen + 60_001;
        let mut evicted = core.evict_stale(later + 1_000, 60_000);
        evicted.sort();
        let mut expected = vec![a1.clone(), b1.clone()];
        expected.sort();
        assert_eq!(evicted, expected);
        assert!(core.devices().is_empty());
        assert!(!core.router().contains(&a1));
        assert!(core.router().is_empty());
    }

    #[test]
    fn eviction_broadcast_reaches_remaining_sessions() {
        let mut core = core();
        let (a, _, a1) = join(&mut core, "A");
        let observer = RecordingTransport::new();
        core.on_connect(observer.clone());
        drain_all(&[&a, &observer]);
        let later = core.registry().get(&a1).unwrap().last_seen + 60_001;
        core.evict_stale(later, 60_000);
        assert!(matches!(
            observer.take().as_slice(),
            [SignalMessage::DeviceList { devices }] if devices.is_empty()
        ));
        assert!(a.take().is_empty());
    }
}
