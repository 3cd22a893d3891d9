//! Mail store adapter: list, append, empty.

use crate::error::StoreError;
use crate::storage::DocumentStore;
use crate::types::{EncryptedMailRef, MailId, MailRecord};

use chrono::Utc;
use ephemail_crypto::AliasHash;
use std::sync::Arc;

/// Read-amplification cap for a single list call.
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Clone)]
pub struct MailStore {
    store: Arc<dyn DocumentStore>,
}

impl MailStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Items for a mailbox, at most `limit`, in storage-assigned order (no
    /// ordering guarantee beyond that).
    pub async fn list(
        &self,
        alias_hash: &AliasHash,
        limit: usize,
    ) -> Result<Vec<EncryptedMailRef>, StoreError> {
        let records = self.store.list_mail(alias_hash, limit)?;
        Ok(records.into_iter().map(EncryptedMailRef::from).collect())
    }

    /// Append a sealed blob and bump the mailbox's usage counter by the
    /// blob length. The item's TTL equals the mailbox's remaining lifetime.
    ///
    /// Item first, then usage: a failed increment leaves an undercount that
    /// the item's own TTL eventually reclaims, never an overcount with no
    /// item behind it.
    pub async fn append(&self, alias_hash: &AliasHash, blob: String) -> Result<(), StoreError> {
        let mailbox = self
            .store
            .get(alias_hash)?
            .ok_or(StoreError::MailboxGone)?;

        let record = MailRecord {
            id: MailId::generate(),
            to: alias_hash.clone(),
            blob,
            received_at: Utc::now(),
            expires_at: mailbox.expires_at,
        };
        let size = record.blob.len() as u64;
        self.store.put_mail(&record)?;

        match self.store.bump_usage(alias_hash, size) {
            Ok(total) => {
                tracing::debug!(mail_id = %record.id, size, total, "appended mail item");
                Ok(())
            }
            // Vanished between the item write and the increment.
            Err(StoreError::MailboxNotFound) => Err(StoreError::MailboxGone),
            Err(e) => Err(e),
        }
    }

    /// Bulk-delete all items for a mailbox. Best-effort: used during
    /// explicit destroy, where the TTL would reclaim leftovers anyway.
    pub async fn empty_all(&self, alias_hash: &AliasHash) -> Result<(), StoreError> {
        self.store.delete_mail_for(alias_hash)
    }
}
