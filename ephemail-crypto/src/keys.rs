//! X25519 key agreement.
//!
//! Each mailbox creation generates a fresh server keypair; the client's
//! public key plus the server secret key derive one shared secret via
//! Diffie-Hellman, expanded through HKDF-SHA256 into the 32-byte symmetric
//! key that seals every mail item for that mailbox. Keypairs are never
//! reused across mailboxes.

use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{EncodingError, InvalidKeyError};

/// Raw public key length on the wire.
pub const PUBLIC_KEY_BYTES: usize = 32;
/// Derived symmetric key length.
pub const SHARED_SECRET_BYTES: usize = 32;

/// HKDF info string binding derived keys to this protocol.
const KDF_INFO: &[u8] = b"ephemail/v1/mail-secret";

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// An X25519 public key (client- or server-side half of the agreement).
#[derive(Clone)]
pub struct PublicKey(X25519PublicKey);

impl PublicKey {
    /// Parse from raw bytes. Fails unless the input is exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidKeyError> {
        let raw: [u8; PUBLIC_KEY_BYTES] = bytes.try_into().map_err(|_| InvalidKeyError)?;
        Ok(Self(X25519PublicKey::from(raw)))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_BYTES] {
        *self.0.as_bytes()
    }
}

// ---------------------------------------------------------------------------
// Secret key
// ---------------------------------------------------------------------------

/// An X25519 static secret. Lives only for the duration of one
/// shared-secret derivation; never persisted.
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub(crate) fn x25519(&self) -> &StaticSecret {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Shared secret
// ---------------------------------------------------------------------------

/// The symmetric key derived once at mailbox creation.
///
/// Zeroed on drop. Hex round-trips exist for the storage layer, which holds
/// it server-side for the lifetime of the mailbox.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_BYTES]);

impl SharedSecret {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidKeyError> {
        let raw: [u8; SHARED_SECRET_BYTES] = bytes.try_into().map_err(|_| InvalidKeyError)?;
        Ok(Self(raw))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, InvalidKeyError> {
        let raw = hex::decode(hex_str).map_err(|_| InvalidKeyError)?;
        Self::from_bytes(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// ---------------------------------------------------------------------------
// Key agreement
// ---------------------------------------------------------------------------

/// Generate a fresh X25519 keypair.
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let sk = StaticSecret::random_from_rng(OsRng);
    let pk = X25519PublicKey::from(&sk);
    (PublicKey(pk), SecretKey(sk))
}

/// Diffie-Hellman agreement followed by HKDF-SHA256 expansion.
///
/// Deterministic for a fixed pair of keypairs: the client computes the same
/// secret from the server public key and its own secret key.
pub fn compute_shared_secret(
    peer: &PublicKey,
    own: &SecretKey,
) -> Result<SharedSecret, EncodingError> {
    let dh = own.x25519().diffie_hellman(&peer.0);
    let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
    let mut out = [0u8; SHARED_SECRET_BYTES];
    hk.expand(KDF_INFO, &mut out).map_err(|_| EncodingError)?;
    Ok(SharedSecret(out))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
