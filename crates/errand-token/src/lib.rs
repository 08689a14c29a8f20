//! Bearer token issue and verification.
//!
//! Tokens are compact `header.payload.signature` strings: base64url JSON
//! segments signed with HMAC-SHA256 over `header.payload` using the server
//! secret. Issuance goes through `jsonwebtoken` (standard HS256 output);
//! verification is done here so the failure modes stay distinguishable and
//! the signature check is constant-time.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use errand_types::api::Claims;

type HmacSha256 = Hmac<Sha256>;

const MAX_TOKEN_LEN: usize = 4096;
const DEFAULT_TTL_DAYS: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token is missing required claim '{0}'")]
    MissingClaim(&'static str),

    #[error("token expired")]
    Expired,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies tokens with one server-held secret. Constructed once
/// from configuration and shared through application state.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
    ttl: Duration,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify `token` as of `now`. The payload is only decoded after the
    /// signature has been checked.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::Malformed("token too long"));
        }

        let mut parts = token.split('.');
        let (header_part, payload_part, sig_part) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None)
                    if !h.is_empty() && !p.is_empty() && !s.is_empty() =>
                {
                    (h, p, s)
                }
                _ => return Err(TokenError::Malformed("expected three segments")),
            };

        let signature = decode_segment(sig_part)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::BadSignature)?;
        mac.update(header_part.as_bytes());
        mac.update(b".");
        mac.update(payload_part.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let header: Value = serde_json::from_slice(&decode_segment(header_part)?)
            .map_err(|_| TokenError::Malformed("header is not JSON"))?;
        if header.get("alg").and_then(Value::as_str) != Some("HS256") {
            return Err(TokenError::Malformed("unsupported algorithm"));
        }

        let payload: Value = serde_json::from_slice(&decode_segment(payload_part)?)
            .map_err(|_| TokenError::Malformed("payload is not JSON"))?;
        let claims = payload
            .as_object()
            .ok_or(TokenError::Malformed("payload is not an object"))?;

        let uid = claims
            .get("uid")
            .and_then(claim_as_i64)
            .filter(|uid| *uid > 0)
            .ok_or(TokenError::MissingClaim("uid"))?;

        let exp = match claims.get("exp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(claim_as_i64(v).ok_or(TokenError::Malformed("exp is not a timestamp"))?),
        };
        if let Some(exp) = exp {
            if now.timestamp() >= exp {
                debug!(uid, exp, "rejecting expired token");
                return Err(TokenError::Expired);
            }
        }

        let username = claims
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Claims { uid, username, exp })
    }

    pub fn issue(&self, uid: i64, username: &str) -> Result<String, TokenError> {
        self.issue_at(uid, username, Utc::now())
    }

    /// Issue an HS256 token expiring `ttl` after `now`.
    pub fn issue_at(&self, uid: i64, username: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            uid,
            username: username.to_string(),
            exp: Some((now + self.ttl).timestamp()),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Base64url segment, padded or not.
fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed("segment is not base64url"))
}

/// Integer claims may arrive as JSON numbers or numeric strings.
fn claim_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
