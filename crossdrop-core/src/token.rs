//! Token issuer/verifier: short-lived signed claims proving device identity or authorizing
//! one pairing exchange.
//!
//! Format: `base64url(json claims) "." base64url(HMAC-SHA256(first part))`. The `type` field
//! tells registration and pair claims apart; callers go through `verify_registration` /
//! `verify_pair`, which check it before handing out any other field.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::identity::DeviceId;

type HmacSha256 = Hmac<Sha256>;

/// Validity of a registration token.
pub const REGISTRATION_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Validity of a pair token.
pub const PAIR_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

const PAIR_NONCE_BYTES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationClaims {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    /// Expiry, Unix seconds.
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairClaims {
    /// Device that asked to pair.
    pub from_id: DeviceId,
    /// Device asked to accept.
    pub to_id: DeviceId,
    pub nonce: String,
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Claims {
    Registration(RegistrationClaims),
    Pair(PairClaims),
}

impl Claims {
    pub fn exp(&self) -> u64 {
        match self {
            Claims::Registration(c) => c.exp,
            Claims::Pair(c) => c.exp,
        }
    }

    fn set_exp(&mut self, exp: u64) {
        match self {
            Claims::Registration(c) => c.exp = exp,
            Claims::Pair(c) => c.exp = exp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),
    #[error("claims encoding: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Signing-key dependency. `verify` never errors: any structural, signature or expiry failure
/// is `None`, which callers treat as "no token".
pub trait TokenIssuer: Send + Sync {
    /// Sign `claims` with an expiry `ttl` from now (any `exp` already set is replaced).
    fn issue(&self, claims: Claims, ttl: Duration) -> Result<String, TokenError>;

    fn verify(&self, token: &str) -> Option<Claims>;

    fn issue_registration(&self, id: &DeviceId, name: &str) -> Result<String, TokenError> {
        let claims = Claims::Registration(RegistrationClaims {
            id: id.clone(),
            name: name.to_string(),
            exp: 0,
        });
        self.issue(claims, REGISTRATION_TOKEN_TTL)
    }

    fn issue_pair(&self, from_id: &DeviceId, to_id: &DeviceId) -> Result<String, TokenError> {
        let claims = Claims::Pair(PairClaims {
            from_id: from_id.clone(),
            to_id: to_id.clone(),
            nonce: pair_nonce(),
            exp: 0,
        });
        self.issue(claims, PAIR_TOKEN_TTL)
    }

    fn verify_registration(&self, token: &str) -> Option<RegistrationClaims> {
        match self.verify(token)? {
            Claims::Registration(c) if !c.id.is_empty() => Some(c),
            _ => None,
        }
    }

    fn verify_pair(&self, token: &str) -> Option<PairClaims> {
        match self.verify(token)? {
            Claims::Pair(c) => Some(c),
            _ => None,
        }
    }
}

fn pair_nonce() -> String {
    let mut bytes = [0u8; PAIR_NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HMAC-SHA256 issuer over a shared secret.
pub struct HmacTokenIssuer {
    secret: Vec<u8>,
    clock: fn() -> u64,
}

impl HmacTokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            clock: unix_now,
        }
    }

    /// Replace the Unix-seconds clock (tests).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        Ok(HmacSha256::new_from_slice(&self.secret)?)
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let (body, sig) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| TokenError::BadSignature)?;
        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json)?;
        if claims.exp() <= (self.clock)() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

impl TokenIssuer for HmacTokenIssuer {
    fn issue(&self, mut claims: Claims, ttl: Duration) -> Result<String, TokenError> {
        claims.set_exp((self.clock)().saturating_add(ttl.as_secs()));
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{body}.{sig}"))
    }

    fn verify(&self, token: &str) -> Option<Claims> {
        match self.decode(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "token rejected");
                None
            }
        }
    }
}
