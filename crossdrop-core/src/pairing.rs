//! Pairing workflow: request/accept/reject between two devices via the router.
//!
//! No pending-pair state is kept. An attempt lives only in the messages in flight:
//! `None → Requested → (Accepted | Rejected | Unavailable)`. A request nobody answers never
//! resolves; the pair token's own expiry is the only bound.

use tracing::{debug, info, warn};

use crate::identity::DeviceId;
use crate::protocol::{PairRequest, PairResponse, SignalMessage};
use crate::registry::Registry;
use crate::router::{Router, Transport};
use crate::token::{TokenError, TokenIssuer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    None,
    Requested,
    Accepted,
    Rejected,
    /// Counterpart has no live session. Reported to the caller only.
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("device-not-found")]
    DeviceNotFound,
    #[error("invalid-pair-token")]
    InvalidToken,
    #[error("token issue failed: {0}")]
    Token(#[from] TokenError),
}

/// One pairing step against borrowed signaling state.
pub struct Pairing<'a, T> {
    registry: &'a mut Registry,
    router: &'a Router<T>,
    tokens: &'a dyn TokenIssuer,
    /// Reject responses that carry no token.
    require_token: bool,
}

impl<'a, T: Transport> Pairing<'a, T> {
    pub fn new(
        registry: &'a mut Registry,
        router: &'a Router<T>,
        tokens: &'a dyn TokenIssuer,
        require_token: bool,
    ) -> Self {
        Self {
            registry,
            router,
            tokens,
            require_token,
        }
    }

    /// Forward a pair-request from `from_id` to `to_id`. With `attach_token`, a pair token bound
    /// to exactly `(from_id, to_id)` rides along for the responder to echo back.
    pub fn request(
        &self,
        from_id: &DeviceId,
        to_id: &DeviceId,
        name: Option<String>,
        message: Option<String>,
        attach_token: bool,
    ) -> Result<PairState, PairError> {
        let token = if attach_token {
            Some(self.tokens.issue_pair(from_id, to_id)?)
        } else {
            None
        };
        let name = name.or_else(|| self.registry.get(from_id).map(|d| d.name.clone()));
        let msg = SignalMessage::PairRequest(PairRequest {
            target: None,
            from: Some(from_id.clone()),
            name,
            message,
            token,
        });
        if self.router.route(to_id, &msg) {
            debug!(from = %from_id, to = %to_id, "pair request forwarded");
            Ok(PairState::Requested)
        } else {
            Ok(PairState::Unavailable)
        }
    }

    /// Like `request`, but both devices must be registered.
    pub fn request_registered(
        &self,
        from_id: &DeviceId,
        to_id: &DeviceId,
        message: Option<String>,
    ) -> Result<PairState, PairError> {
        if !self.registry.contains(from_id) || !self.registry.contains(to_id) {
            return Err(PairError::DeviceNotFound);
        }
        self.request(from_id, to_id, None, Some(message.unwrap_or_default()), true)
    }

    /// Handle `responder`'s answer to `requester`. Both must be registered devices, and the
    /// token, if any, must be a pair token issued for `requester → responder`. On acceptance
    /// the trust edge is written before the response is forwarded; a rejection is forwarded
    /// too and leaves nothing behind.
    pub fn respond(
        &mut self,
        responder: &DeviceId,
        requester: &DeviceId,
        accepted: bool,
        token: Option<&str>,
    ) -> Result<PairState, PairError> {
        if !self.registry.contains(responder) || !self.registry.contains(requester) {
            debug!(responder = %responder, requester = %requester, "pair response for unknown device");
            return Err(PairError::DeviceNotFound);
        }
        match token {
            Some(token) => {
                let claims = self
                    .tokens
                    .verify_pair(token)
                    .ok_or(PairError::InvalidToken)?;
                if claims.from_id != *requester || claims.to_id != *responder {
                    warn!(
                        responder = %responder,
                        requester = %requester,
                        "pair token issued for a different pair"
                    );
                    return Err(PairError::InvalidToken);
                }
            }
            None if self.require_token => return Err(PairError::InvalidToken),
            None => {}
        }

        if accepted {
            self.registry.add_trusted(requester, responder);
        }
        let msg = SignalMessage::PairResponse(PairResponse {
            target: None,
            from: Some(responder.clone()),
            accepted,
            token: None,
        });
        if !self.router.route(requester, &msg) {
            return Ok(PairState::Unavailable);
        }
        info!(requester = %requester, responder = %responder, accepted, "pair response forwarded");
        Ok(if accepted {
            PairState::Accepted
        } else {
            PairState::Rejected
        })
    }
}
