//! # ephemail-crypto
//!
//! Cryptographic primitives for disposable, end-to-end-encrypted mailboxes:
//!
//! - X25519 key agreement between a client keypair and a per-mailbox server
//!   keypair, expanded through HKDF-SHA256 into one shared secret
//! - AES-256-GCM sealing of mail items into `base64(nonce || ciphertext)`
//!   blobs, the only form mail ever takes at rest
//! - Salted HMAC-SHA256 alias hashing, so the storage backend never learns
//!   a plaintext address
//! - Random low-ambiguity identifiers for mailbox local-parts
//!
//! ```
//! use ephemail_crypto::{compute_shared_secret, generate_keypair, open, seal};
//!
//! let (client_pk, client_sk) = generate_keypair();
//! let (server_pk, server_sk) = generate_keypair();
//!
//! // Server derives the secret from the client's public key; client mirrors it.
//! let secret = compute_shared_secret(&client_pk, &server_sk).unwrap();
//! let mirror = compute_shared_secret(&server_pk, &client_sk).unwrap();
//!
//! let blob = seal(&secret, b"hello").unwrap();
//! assert_eq!(open(&mirror, &blob).unwrap(), b"hello");
//! ```

pub mod alias;
pub mod error;
pub mod keys;
pub mod sealed;

pub use alias::{
    hash_alias, random_identifier, AliasHash, AliasResolver, DEFAULT_IDENTIFIER_LEN,
    IDENTIFIER_ALPHABET,
};
pub use error::{DecryptionError, EncodingError, InvalidKeyError};
pub use keys::{
    compute_shared_secret, generate_keypair, PublicKey, SecretKey, SharedSecret,
    PUBLIC_KEY_BYTES, SHARED_SECRET_BYTES,
};
pub use sealed::{open, seal, NONCE_BYTES};
