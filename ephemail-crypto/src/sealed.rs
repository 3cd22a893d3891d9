//! Sealed mail blobs: AES-256-GCM under the mailbox shared secret.
//!
//! Wire form is `base64(nonce[12] || ciphertext)`, one fresh random nonce
//! per call. This string is the only form a mail item ever takes at rest.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use getrandom::getrandom;

use crate::error::{DecryptionError, EncodingError};
use crate::keys::SharedSecret;

/// AES-GCM nonce length, fixed for blob splitting.
pub const NONCE_BYTES: usize = 12;
/// GCM authentication tag length.
const TAG_BYTES: usize = 16;

/// Encrypt and authenticate a plaintext, returning the transportable blob.
pub fn seal(secret: &SharedSecret, plaintext: &[u8]) -> Result<String, EncodingError> {
    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes()).map_err(|_| EncodingError)?;

    let mut nonce = [0u8; NONCE_BYTES];
    getrandom(&mut nonce).map_err(|_| EncodingError)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EncodingError)?;

    let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

/// Decrypt a sealed blob. Uniform error on malformed encoding, truncation,
/// or authentication failure; never returns partial plaintext.
pub fn open(secret: &SharedSecret, blob: &str) -> Result<Vec<u8>, DecryptionError> {
    let raw = BASE64.decode(blob).map_err(|_| DecryptionError)?;
    if raw.len() < NONCE_BYTES + TAG_BYTES {
        return Err(DecryptionError);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_BYTES);

    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes()).map_err(|_| DecryptionError)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DecryptionError)
}
