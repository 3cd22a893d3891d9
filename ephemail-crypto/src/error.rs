//! Unified error types for the crypto layer.

use core::fmt;

/// A peer-supplied key had the wrong length or could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidKeyError;

impl fmt::Display for InvalidKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid key")
    }
}

impl std::error::Error for InvalidKeyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionError;

impl fmt::Display for DecryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decryption failed")
    }
}

impl std::error::Error for DecryptionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingError;

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error")
    }
}

impl std::error::Error for EncodingError {}

/// Normalize encode errors into decrypt errors (oracle discipline).
impl From<EncodingError> for DecryptionError {
    fn from(_: EncodingError) -> Self {
        DecryptionError
    }
}
