//! Core types: mailbox records, mail items, stored mail.

use chrono::{DateTime, Utc};
use ephemail_crypto::AliasHash;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Stored mailbox record. The plaintext alias never appears alongside its
/// hash; the record is addressable only by [`AliasHash`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailboxRecord {
    pub alias_hash: AliasHash,
    /// Hex-encoded 32-byte shared secret, derived once at creation. Never
    /// re-derived unless the mailbox is reset.
    pub secret_hex: String,
    /// Cumulative encrypted-byte counter. Only grows, except via destruction.
    pub usage_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Enforced by the backend's own TTL mechanism; the server never runs
    /// an explicit expiry sweep.
    pub expires_at: DateTime<Utc>,
}

/// Externally visible result of mailbox creation: the alias and the server
/// half of the key agreement, never the shared secret.
#[derive(Clone, Debug, Serialize)]
pub struct Mailbox {
    pub alias: String,
    pub server_public_key: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Mail payload (plaintext form, pre-encryption only)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAddress {
    #[serde(default)]
    pub name: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailBody {
    pub plain: String,
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Plaintext mail payload. Serialized to JSON and sealed as a single blob
/// before the first write; the storage layer never sees this form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailItem {
    pub to: String,
    pub from: Vec<NameAddress>,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub body: MailBody,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub raw: Option<String>,
}

// ---------------------------------------------------------------------------
// Stored mail
// ---------------------------------------------------------------------------

/// Unique mail item identifier (hex-encoded random bytes).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailId(String);

impl MailId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored mail item: a single sealed blob plus routing metadata.
///
/// `to` is a foreign reference, not ownership — the mailbox may already be
/// gone when this record expires on its own TTL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: MailId,
    pub to: AliasHash,
    /// `base64(nonce || ciphertext)` — the plaintext payload never persists.
    pub blob: String,
    pub received_at: DateTime<Utc>,
    /// Equal to the mailbox's remaining lifetime at time of receipt.
    pub expires_at: DateTime<Utc>,
}

/// Reader-facing view of a stored item. Still encrypted; decryption is the
/// client's job.
#[derive(Clone, Debug, Serialize)]
pub struct EncryptedMailRef {
    pub id: MailId,
    pub blob: String,
    pub received_at: DateTime<Utc>,
}

impl From<MailRecord> for EncryptedMailRef {
    fn from(rec: MailRecord) -> Self {
        Self {
            id: rec.id,
            blob: rec.blob,
            received_at: rec.received_at,
        }
    }
}
