//! Session tokens.
//!
//! A token is the only proof of mailbox ownership the server ever hands
//! out: the alias itself never doubles as a credential. Tokens are signed,
//! not encrypted. The claims carry nothing secret, so integrity is all
//! that matters.
//!
//! Wire form is `base64url(json claims) "." base64url(hmac-sha256)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Cookie the session token travels in.
pub const COOKIE_NAME: &str = "em_token";

/// Fraction of the token lifetime that must have elapsed before the
/// mailbox may be reset.
pub const RESET_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, tampered, or signed with a different key.
    Invalid,
    /// Well-formed and authentic, but past its expiry.
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Invalid => f.write_str("invalid token"),
            TokenError::Expired => f.write_str("token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Claims carried by a session token. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub alias: String,
    /// Server-side public key for this mailbox, base64. Public by nature,
    /// carried here so GET can return it without a store lookup.
    pub server_public_key: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl Claims {
    pub fn new(alias: String, server_public_key: String, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Claims {
            alias,
            server_public_key,
            issued_at: now,
            expires_at: now + ttl.as_secs() as i64,
        }
    }

    /// Whether enough of the session lifetime has elapsed for a reset.
    ///
    /// Resetting early would let a caller churn through aliases faster
    /// than creation rate limiting intends, so destroy is gated on at
    /// least `threshold` of the lifetime being spent.
    pub fn reset_eligible_at(&self, threshold: f64, now: i64) -> bool {
        let lifetime = self.expires_at - self.issued_at;
        if lifetime <= 0 {
            return true;
        }
        (now - self.issued_at) as f64 >= threshold * lifetime as f64
    }

    pub fn reset_eligible(&self, threshold: f64) -> bool {
        self.reset_eligible_at(threshold, Utc::now().timestamp())
    }

    /// Fresh claims over the same mailbox with a restarted lifetime.
    ///
    /// The token is the only proof of ownership, so extending a mailbox's
    /// TTL without re-issuing the credential would leave the renewed
    /// mailbox unreachable once the old token expires.
    pub fn renew(&self, ttl: Duration) -> Self {
        Claims::new(self.alias.clone(), self.server_public_key.clone(), ttl)
    }
}

/// Issues and verifies session tokens with a single HMAC key.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        TokenSigner { secret: secret.into() }
    }

    fn tag(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn issue(&self, claims: &Claims) -> String {
        let payload = serde_json::to_vec(claims).expect("claims are plain data");
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(self.tag(&payload))
        )
    }

    /// Signature is checked before the payload is even parsed; only an
    /// authentic token can distinguish `Expired` from `Invalid`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload_b64, tag_b64) = token.split_once('.').ok_or(TokenError::Invalid)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Invalid)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| TokenError::Invalid)?;

        let expected = self.tag(&payload);
        if tag.len() != expected.len() || !bool::from(tag.ct_eq(&expected)) {
            return Err(TokenError::Invalid);
        }

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Invalid)?;
        if claims.expires_at <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

// ---------------------------------------------------------------------------
// Cookie plumbing
// ---------------------------------------------------------------------------

pub fn session_cookie(token: &str, max_age: Duration) -> String {
    format!(
        "{COOKIE_NAME}={token}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
        max_age.as_secs()
    )
}

/// A Set-Cookie value that clears the session on the client.
pub fn expired_cookie() -> String {
    format!("{COOKIE_NAME}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict")
}

/// Pulls the session token out of a raw `Cookie` header value.
pub fn token_from_cookies(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(COOKIE_NAME)?.strip_prefix('='))
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-signing-key")
    }

    fn fresh_claims() -> Claims {
        Claims::new(
            "abc123@mail.example".into(),
            "cGs=".into(),
            Duration::from_secs(1800),
        )
    }

    #[test]
    fn issue_then_verify() {
        let claims = fresh_claims();
        let token = signer().issue(&claims);
        let parsed = signer().verify(&token).unwrap();
        assert_eq!(parsed.alias, claims.alias);
        assert_eq!(parsed.server_public_key, claims.server_public_key);
        assert_eq!(parsed.expires_at, claims.expires_at);
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let token = signer().issue(&fresh_claims());
        let (payload, tag) = token.split_once('.').unwrap();
        let forged = Claims::new("other@mail.example".into(), "cGs=".into(), Duration::from_secs(1800));
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        assert_ne!(payload, forged_payload);
        assert_eq!(
            signer().verify(&format!("{forged_payload}.{tag}")),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn wrong_key_is_invalid() {
        let token = signer().issue(&fresh_claims());
        let other = TokenSigner::new("a different key");
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(signer().verify(""), Err(TokenError::Invalid));
        assert_eq!(signer().verify("no-dot-here"), Err(TokenError::Invalid));
        assert_eq!(signer().verify("!!!.!!!"), Err(TokenError::Invalid));
    }

    #[test]
    fn expiry_beats_everything_but_the_signature() {
        let mut claims = fresh_claims();
        claims.issued_at -= 4000;
        claims.expires_at -= 4000;
        let token = signer().issue(&claims);
        // Authentic but stale: Expired, not Invalid.
        assert_eq!(signer().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn renewal_restarts_the_lifetime() {
        let mut stale = fresh_claims();
        stale.issued_at -= 1700;
        stale.expires_at -= 1700;

        let renewed = stale.renew(Duration::from_secs(1800));
        assert_eq!(renewed.alias, stale.alias);
        assert_eq!(renewed.server_public_key, stale.server_public_key);
        assert!(renewed.expires_at > stale.expires_at);
        assert!(renewed.issued_at > stale.issued_at);

        // The re-issued token verifies on its own.
        let token = signer().issue(&renewed);
        assert!(signer().verify(&token).is_ok());
    }

    #[test]
    fn reset_eligibility_boundary() {
        let claims = Claims {
            alias: "a@mail.example".into(),
            server_public_key: "cGs=".into(),
            issued_at: 0,
            expires_at: 1000,
        };
        assert!(!claims.reset_eligible_at(RESET_THRESHOLD, 790));
        assert!(claims.reset_eligible_at(RESET_THRESHOLD, 800));
        assert!(claims.reset_eligible_at(RESET_THRESHOLD, 810));
    }

    #[test]
    fn cookie_extraction() {
        assert_eq!(
            token_from_cookies("em_token=abc.def; theme=dark"),
            Some("abc.def")
        );
        assert_eq!(
            token_from_cookies("theme=dark;  em_token=abc.def"),
            Some("abc.def")
        );
        assert_eq!(token_from_cookies("em_token="), None);
        assert_eq!(token_from_cookies("em_tokenish=abc"), None);
        assert_eq!(token_from_cookies("theme=dark"), None);
    }
}
