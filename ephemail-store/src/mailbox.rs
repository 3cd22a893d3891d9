//! Mailbox store adapter: create, exists, usage, renew, destroy.
//!
//! Every operation except creation takes an [`AliasHash`], never a
//! plaintext alias.

use crate::error::StoreError;
use crate::storage::DocumentStore;
use crate::types::{Mailbox, MailboxRecord};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ephemail_crypto::{
    compute_shared_secret, generate_keypair, random_identifier, AliasHash, AliasResolver,
    PublicKey, SharedSecret, DEFAULT_IDENTIFIER_LEN,
};
use rand_core::RngCore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct MailboxStore {
    store: Arc<dyn DocumentStore>,
    resolver: AliasResolver,
    domains: Vec<String>,
    ttl: Duration,
}

impl MailboxStore {
    /// `domains` must be non-empty and validated upstream; `ttl` applies to
    /// every created or renewed mailbox.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        resolver: AliasResolver,
        domains: Vec<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            domains,
            ttl,
        }
    }

    pub fn resolver(&self) -> &AliasResolver {
        &self.resolver
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn deadline(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX)
    }

    fn pick_domain(&self) -> &str {
        if self.domains.len() == 1 {
            return &self.domains[0];
        }
        let idx = rand_core::OsRng.next_u32() as usize % self.domains.len();
        &self.domains[idx]
    }

    /// Create a new mailbox from the client's 32-byte public key.
    ///
    /// Generates a fresh server keypair, derives the shared secret, picks a
    /// domain at random, and persists `{alias_hash, usage: 0, secret}` with
    /// a backend TTL. Returns the alias and server public key — never the
    /// shared secret.
    pub async fn create(&self, client_key: &PublicKey) -> Result<Mailbox, StoreError> {
        let id = random_identifier(DEFAULT_IDENTIFIER_LEN)
            .map_err(|e| StoreError::Storage(format!("identifier: {}", e)))?;
        let alias = format!("{}@{}", id, self.pick_domain());

        let (server_pk, server_sk) = generate_keypair();
        let secret = compute_shared_secret(client_key, &server_sk)
            .map_err(|e| StoreError::Storage(format!("key agreement: {}", e)))?;

        let now = Utc::now();
        let record = MailboxRecord {
            alias_hash: self.resolver.resolve(&alias),
            secret_hex: secret.to_hex(),
            usage_bytes: 0,
            created_at: now,
            expires_at: self.deadline(now),
        };
        self.store.put(&record)?;
        tracing::debug!(expires_at = %record.expires_at, "created mailbox");

        Ok(Mailbox {
            alias,
            server_public_key: server_pk.to_bytes().to_vec(),
        })
    }

    /// Existence check via the alias index; no side effect.
    pub async fn exists(&self, alias_hash: &AliasHash) -> Result<bool, StoreError> {
        self.store.exists(alias_hash)
    }

    /// Current cumulative encrypted-byte usage.
    pub async fn usage(&self, alias_hash: &AliasHash) -> Result<u64, StoreError> {
        self.record(alias_hash).await.map(|r| r.usage_bytes)
    }

    /// Absolute expiry timestamp.
    pub async fn expires_at(&self, alias_hash: &AliasHash) -> Result<DateTime<Utc>, StoreError> {
        self.record(alias_hash).await.map(|r| r.expires_at)
    }

    /// The stored shared secret, for sealing inbound mail.
    pub async fn secret(&self, alias_hash: &AliasHash) -> Result<SharedSecret, StoreError> {
        let record = self.record(alias_hash).await?;
        SharedSecret::from_hex(&record.secret_hex)
            .map_err(|e| StoreError::Storage(format!("stored secret: {}", e)))
    }

    /// Extend the backend TTL to now + ttl. Idempotent; fails with
    /// `MailboxNotFound` if the record has already expired.
    pub async fn renew(&self, alias_hash: &AliasHash) -> Result<(), StoreError> {
        self.store.set_expiry(alias_hash, self.deadline(Utc::now()))
    }

    /// Delete the mailbox record. Does not cascade to mail items — that is
    /// a deliberately separate step, and the backend TTL reclaims orphans
    /// regardless.
    pub async fn destroy(&self, alias_hash: &AliasHash) -> Result<(), StoreError> {
        if !self.store.exists(alias_hash)? {
            return Err(StoreError::MailboxNotFound);
        }
        self.store.delete(alias_hash)?;
        tracing::debug!("destroyed mailbox");
        Ok(())
    }

    async fn record(&self, alias_hash: &AliasHash) -> Result<MailboxRecord, StoreError> {
        self.store.get(alias_hash)?.ok_or(StoreError::MailboxNotFound)
    }
}
