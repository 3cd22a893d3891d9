//! Document-store abstraction: where mailbox records and sealed mail live.
//!
//! The authoritative state is an external key/value collection with
//! secondary-index lookup and per-record TTL. This trait is the narrow
//! seam that keeps the backend swappable without touching core logic.

use crate::error::StoreError;
use crate::types::{MailRecord, MailboxRecord};

use chrono::{DateTime, Utc};
use ephemail_crypto::AliasHash;
use std::collections::HashMap;
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Backend for mailbox records and sealed mail items, addressed only by
/// alias hash. Implementations own TTL enforcement: a record past its
/// `expires_at` must behave as absent.
pub trait DocumentStore: Send + Sync {
    fn get(&self, alias_hash: &AliasHash) -> Result<Option<MailboxRecord>, StoreError>;
    fn put(&self, record: &MailboxRecord) -> Result<(), StoreError>;
    fn delete(&self, alias_hash: &AliasHash) -> Result<(), StoreError>;
    /// Existence check via the alias index; no side effect.
    fn exists(&self, alias_hash: &AliasHash) -> Result<bool, StoreError>;
    /// Extend the record's TTL. `MailboxNotFound` if it already expired.
    fn set_expiry(
        &self,
        alias_hash: &AliasHash,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Atomic usage increment; returns the new total. `MailboxNotFound` if
    /// the record vanished. Atomicity here closes the lost-update window of
    /// a separate read-then-write pair under concurrent ingestion.
    fn bump_usage(&self, alias_hash: &AliasHash, delta: u64) -> Result<u64, StoreError>;

    fn put_mail(&self, record: &MailRecord) -> Result<(), StoreError>;
    /// Items for a mailbox in storage-assigned order, at most `limit`.
    fn list_mail(&self, alias_hash: &AliasHash, limit: usize)
        -> Result<Vec<MailRecord>, StoreError>;
    /// Bulk-delete all items for a mailbox.
    fn delete_mail_for(&self, alias_hash: &AliasHash) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory backend (testing and single-process use). TTL is enforced
/// lazily: expired records read as absent and are pruned on writes.
pub struct InMemoryStore {
    mailboxes: RwLock<HashMap<String, MailboxRecord>>,
    mail: RwLock<Vec<MailRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            mail: RwLock::new(Vec::new()),
        }
    }

    fn live(record: &MailboxRecord, now: DateTime<Utc>) -> bool {
        record.expires_at > now
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, alias_hash: &AliasHash) -> Result<Option<MailboxRecord>, StoreError> {
        let now = Utc::now();
        let mailboxes = self.mailboxes.read().unwrap();
        Ok(mailboxes
            .get(alias_hash.as_str())
            .filter(|r| Self::live(r, now))
            .cloned())
    }

    fn put(&self, record: &MailboxRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut mailboxes = self.mailboxes.write().unwrap();
        mailboxes.retain(|_, r| Self::live(r, now));
        mailboxes.insert(record.alias_hash.as_str().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, alias_hash: &AliasHash) -> Result<(), StoreError> {
        let mut mailboxes = self.mailboxes.write().unwrap();
        mailboxes.remove(alias_hash.as_str());
        Ok(())
    }

    fn exists(&self, alias_hash: &AliasHash) -> Result<bool, StoreError> {
        Ok(self.get(alias_hash)?.is_some())
    }

    fn set_expiry(
        &self,
        alias_hash: &AliasHash,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut mailboxes = self.mailboxes.write().unwrap();
        match mailboxes.get_mut(alias_hash.as_str()) {
            Some(record) if Self::live(record, now) => {
                record.expires_at = expires_at;
                Ok(())
            }
            Some(_) => {
                mailboxes.remove(alias_hash.as_str());
                Err(StoreError::MailboxNotFound)
            }
            None => Err(StoreError::MailboxNotFound),
        }
    }

    fn bump_usage(&self, alias_hash: &AliasHash, delta: u64) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut mailboxes = self.mailboxes.write().unwrap();
        match mailboxes.get_mut(alias_hash.as_str()) {
            Some(record) if Self::live(record, now) => {
                record.usage_bytes = record.usage_bytes.saturating_add(delta);
                Ok(record.usage_bytes)
            }
            Some(_) => {
                mailboxes.remove(alias_hash.as_str());
                Err(StoreError::MailboxNotFound)
            }
            None => Err(StoreError::MailboxNotFound),
        }
    }

    fn put_mail(&self, record: &MailRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut mail = self.mail.write().unwrap();
        mail.retain(|m| m.expires_at > now);
        mail.push(record.clone());
        Ok(())
    }

    fn list_mail(
        &self,
        alias_hash: &AliasHash,
        limit: usize,
    ) -> Result<Vec<MailRecord>, StoreError> {
        let now = Utc::now();
        let mail = self.mail.read().unwrap();
        Ok(mail
            .iter()
            .filter(|m| &m.to == alias_hash && m.expires_at > now)
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete_mail_for(&self, alias_hash: &AliasHash) -> Result<(), StoreError> {
        let mut mail = self.mail.write().unwrap();
        mail.retain(|m| &m.to != alias_hash);
        Ok(())
    }
}
