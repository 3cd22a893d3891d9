//! Alias derivation: salted one-way hashing and random local-parts.
//!
//! The storage backend is untrusted; it only ever sees the salted HMAC of
//! an alias. Without the salt the digest is not invertible and addresses
//! cannot be enumerated.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use getrandom::getrandom;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::error::{EncodingError, InvalidKeyError};

type HmacSha256 = Hmac<Sha256>;

/// Local-part alphabet: lowercase letters and digits, zero dropped to avoid
/// the `0`/`o` ambiguity.
pub const IDENTIFIER_ALPHABET: &[u8] = b"123456789abcdefghijklmnopqrstuvwxyz";

/// Default local-part length. At 35 symbols this gives ~51 bits of entropy,
/// negligible collision probability for any plausible live population.
pub const DEFAULT_IDENTIFIER_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Alias hash
// ---------------------------------------------------------------------------

/// Salted one-way digest of an alias. The only storage lookup key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasHash(String);

impl AliasHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AliasHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic keyed hash: HMAC-SHA256 with the salt as key, base64 digest.
pub fn hash_alias(alias: &str, salt: &[u8]) -> AliasHash {
    let mut mac = HmacSha256::new_from_slice(salt).expect("hmac accepts keys of any length");
    mac.update(alias.as_bytes());
    AliasHash(BASE64.encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Wraps [`hash_alias`] with the process-wide salt, captured once at startup
/// and injected explicitly wherever resolution happens.
#[derive(Clone)]
pub struct AliasResolver {
    salt: Vec<u8>,
}

impl AliasResolver {
    /// Rejects an empty salt so a misconfigured process fails at startup,
    /// not at the first lookup.
    pub fn new(salt: impl Into<Vec<u8>>) -> Result<Self, InvalidKeyError> {
        let salt = salt.into();
        if salt.is_empty() {
            return Err(InvalidKeyError);
        }
        Ok(Self { salt })
    }

    /// Total: never fails for any alias input.
    pub fn resolve(&self, alias: &str) -> AliasHash {
        hash_alias(alias, &self.salt)
    }
}

// ---------------------------------------------------------------------------
// Random identifier
// ---------------------------------------------------------------------------

/// Cryptographically random string over [`IDENTIFIER_ALPHABET`].
///
/// Rejection-sampled so every symbol is uniform.
pub fn random_identifier(length: usize) -> Result<String, EncodingError> {
    // 245 = 7 * 35, the largest multiple of the alphabet size below 256.
    const LIMIT: u8 = 245;

    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        getrandom(&mut buf).map_err(|_| EncodingError)?;
        for byte in buf {
            if byte < LIMIT {
                let idx = (byte % IDENTIFIER_ALPHABET.len() as u8) as usize;
                out.push(IDENTIFIER_ALPHABET[idx] as char);
                if out.len() == length {
                    break;
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_alias("abc123@vanish.example", b"salt-1");
        let b = hash_alias("abc123@vanish.example", b"salt-1");
        assert_eq!(a, b);
    }

    #[test]
    fn different_salts_diverge() {
        let a = hash_alias("abc123@vanish.example", b"salt-1");
        let b = hash_alias("abc123@vanish.example", b"salt-2");
        assert_ne!(a, b);
    }

    #[test]
    fn different_aliases_diverge() {
        let salt = b"process-salt";
        assert_ne!(
            hash_alias("one@vanish.example", salt),
            hash_alias("two@vanish.example", salt)
        );
    }

    #[test]
    fn resolver_rejects_empty_salt() {
        assert!(AliasResolver::new(Vec::new()).is_err());
        assert!(AliasResolver::new(b"s".to_vec()).is_ok());
    }

    #[test]
    fn resolver_matches_free_function() {
        let resolver = AliasResolver::new(b"the-salt".to_vec()).unwrap();
        assert_eq!(
            resolver.resolve("x@vanish.example"),
            hash_alias("x@vanish.example", b"the-salt")
        );
    }

    #[test]
    fn identifier_length_and_alphabet() {
        for len in [1, 10, 12, 40] {
            let id = random_identifier(len).unwrap();
            assert_eq!(id.len(), len);
            assert!(id.bytes().all(|b| IDENTIFIER_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn identifiers_do_not_repeat() {
        let a = random_identifier(DEFAULT_IDENTIFIER_LEN).unwrap();
        let b = random_identifier(DEFAULT_IDENTIFIER_LEN).unwrap();
        assert_ne!(a, b);
    }
}
