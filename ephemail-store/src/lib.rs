//! # ephemail-store
//!
//! Mailbox lifecycle and mail persistence for disposable encrypted
//! mailboxes, over a swappable document-store backend.
//!
//! The backend is untrusted: it only ever sees salted alias hashes and
//! sealed blobs, and it owns TTL enforcement for both mailboxes and mail.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ephemail_store::*;
//! use ephemail_crypto::{generate_keypair, AliasResolver};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let resolver = AliasResolver::new(b"process-salt".to_vec()).unwrap();
//!
//! let mailboxes = MailboxStore::new(
//!     store.clone(),
//!     resolver,
//!     vec!["vanish.example".into()],
//!     Duration::from_secs(30 * 60),
//! );
//! let mail = MailStore::new(store);
//! let gateway = MailGateway::new(mailboxes.clone(), mail.clone(), 10_000_000);
//!
//! let (client_pk, _client_sk) = generate_keypair();
//! let mailbox = mailboxes.create(&client_pk).await.unwrap();
//! assert!(mailbox.alias.contains('@'));
//! # });
//! ```

pub mod error;
pub mod ingest;
pub mod mail;
pub mod mailbox;
pub mod quota;
pub mod storage;
pub mod types;

pub use error::{IngestError, StoreError};
pub use ingest::{AddressField, InboundMail, MailGateway};
pub use mail::{MailStore, DEFAULT_LIST_LIMIT};
pub use mailbox::MailboxStore;
pub use storage::{DocumentStore, InMemoryStore};
pub use types::{
    Attachment, EncryptedMailRef, MailBody, MailId, MailItem, MailRecord, Mailbox,
    MailboxRecord, NameAddress,
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use ephemail_crypto::{
        compute_shared_secret, generate_keypair, open, AliasResolver, PublicKey, SecretKey,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(30 * 60);
    const QUOTA: u64 = 10_000_000;

    struct Fixture {
        store: Arc<InMemoryStore>,
        mailboxes: MailboxStore,
        mail: MailStore,
        gateway: MailGateway,
    }

    fn fixture() -> Fixture {
        fixture_with_quota(QUOTA)
    }

    fn fixture_with_quota(quota: u64) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let resolver = AliasResolver::new(b"test-salt".to_vec()).unwrap();
        let mailboxes = MailboxStore::new(
            store.clone(),
            resolver,
            vec!["vanish.example".into()],
            TTL,
        );
        let mail = MailStore::new(store.clone());
        let gateway = MailGateway::new(mailboxes.clone(), mail.clone(), quota);
        Fixture {
            store,
            mailboxes,
            mail,
            gateway,
        }
    }

    fn client_keypair() -> (PublicKey, SecretKey) {
        generate_keypair()
    }

    fn inbound_to(alias: &str) -> InboundMail {
        InboundMail {
            to: AddressField {
                text: alias.to_string(),
                value: vec![NameAddress {
                    name: String::new(),
                    address: alias.to_string(),
                }],
            },
            from: AddressField {
                text: "Sender <sender@elsewhere.example>".to_string(),
                value: vec![NameAddress {
                    name: "Sender".to_string(),
                    address: "sender@elsewhere.example".to_string(),
                }],
            },
            date: Some(Utc::now()),
            subject: "hello".to_string(),
            text: "plaintext body".to_string(),
            html: Some("<p>plaintext body</p>".to_string()),
            attachments: Vec::new(),
            raw: None,
        }
    }

    // === Mailbox lifecycle ===

    #[tokio::test]
    async fn create_then_exists() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();

        assert!(mailbox.alias.ends_with("@vanish.example"));
        assert_eq!(mailbox.server_public_key.len(), 32);

        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);
        assert!(fx.mailboxes.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn usage_starts_at_zero() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);
        assert_eq!(fx.mailboxes.usage(&hash).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn usage_of_unknown_mailbox_is_not_found() {
        let fx = fixture();
        let hash = fx.mailboxes.resolver().resolve("ghost@vanish.example");
        assert!(matches!(
            fx.mailboxes.usage(&hash).await,
            Err(StoreError::MailboxNotFound)
        ));
    }

    #[tokio::test]
    async fn renew_extends_expiry() {
        let fx = fixture();
        let hash = fx.mailboxes.resolver().resolve("shortlived@vanish.example");

        // Nearly expired: well inside the 30-minute TTL a renewal grants.
        let now = Utc::now();
        fx.store
            .put(&MailboxRecord {
                alias_hash: hash.clone(),
                secret_hex: "00".repeat(32),
                usage_bytes: 0,
                created_at: now - ChronoDuration::minutes(29),
                expires_at: now + ChronoDuration::seconds(30),
            })
            .unwrap();

        let before = fx.mailboxes.expires_at(&hash).await.unwrap();
        fx.mailboxes.renew(&hash).await.unwrap();
        let after = fx.mailboxes.expires_at(&hash).await.unwrap();

        assert!(after > before);
        assert!(after >= now + ChronoDuration::minutes(29));
    }

    #[tokio::test]
    async fn expired_record_reads_absent() {
        let fx = fixture();
        let hash = fx.mailboxes.resolver().resolve("stale@vanish.example");
        let record = MailboxRecord {
            alias_hash: hash.clone(),
            secret_hex: "00".repeat(32),
            usage_bytes: 42,
            created_at: Utc::now() - ChronoDuration::hours(1),
            expires_at: Utc::now() - ChronoDuration::seconds(1),
        };
        fx.store.put(&record).unwrap();

        assert!(!fx.mailboxes.exists(&hash).await.unwrap());
        assert!(matches!(
            fx.mailboxes.usage(&hash).await,
            Err(StoreError::MailboxNotFound)
        ));
        assert!(matches!(
            fx.mailboxes.renew(&hash).await,
            Err(StoreError::MailboxNotFound)
        ));
    }

    #[tokio::test]
    async fn destroy_removes_mailbox() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.mailboxes.destroy(&hash).await.unwrap();
        assert!(!fx.mailboxes.exists(&hash).await.unwrap());
        assert!(matches!(
            fx.mailboxes.destroy(&hash).await,
            Err(StoreError::MailboxNotFound)
        ));
    }

    // === Ingestion ===

    #[tokio::test]
    async fn ingest_then_read_then_decrypt() {
        let fx = fixture();
        let (client_pk, client_sk) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();

        let items = fx.mail.list(&hash, DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(items.len(), 1);

        // Client-side decryption: mirror the secret from the server key.
        let server_pk = PublicKey::from_bytes(&mailbox.server_public_key).unwrap();
        let secret = compute_shared_secret(&server_pk, &client_sk).unwrap();
        let plaintext = open(&secret, &items[0].blob).unwrap();
        let item: MailItem = serde_json::from_slice(&plaintext).unwrap();

        assert_eq!(item.to, mailbox.alias);
        assert_eq!(item.subject, "hello");
        assert_eq!(item.body.plain, "plaintext body");
        assert_eq!(item.from[0].address, "sender@elsewhere.example");
    }

    #[tokio::test]
    async fn ingest_bumps_usage_by_blob_size() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();

        let items = fx.mail.list(&hash, DEFAULT_LIST_LIMIT).await.unwrap();
        let usage = fx.mailboxes.usage(&hash).await.unwrap();
        assert_eq!(usage, items[0].blob.len() as u64);
    }

    #[tokio::test]
    async fn ingest_to_unknown_alias_persists_nothing() {
        let fx = fixture();
        let result = fx.gateway.ingest(inbound_to("never@vanish.example")).await;
        assert!(matches!(result, Err(IngestError::MailboxNotFound)));

        let hash = fx.mailboxes.resolver().resolve("never@vanish.example");
        let items = fx.mail.list(&hash, DEFAULT_LIST_LIMIT).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn ingest_after_destroy_is_not_found() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.mail.empty_all(&hash).await.unwrap();
        fx.mailboxes.destroy(&hash).await.unwrap();

        // No resurrection of destroyed mailboxes.
        let result = fx.gateway.ingest(inbound_to(&mailbox.alias)).await;
        assert!(matches!(result, Err(IngestError::MailboxNotFound)));
    }

    #[tokio::test]
    async fn append_to_vanished_mailbox_is_gone() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        // Simulate the TTL race: record disappears before the append.
        fx.store.delete(&hash).unwrap();
        let result = fx.mail.append(&hash, "blob".to_string()).await;
        assert!(matches!(result, Err(StoreError::MailboxGone)));
    }

    // === Quota ===

    #[tokio::test]
    async fn quota_check_precedes_encryption_size() {
        let fx = fixture_with_quota(100);
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        // usage = limit - 1: still admitted, even though the sealed blob
        // will land well past the 100-byte limit.
        fx.store.bump_usage(&hash, 99).unwrap();
        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();
        assert!(fx.mailboxes.usage(&hash).await.unwrap() > 100);

        // The next attempt is rejected.
        let result = fx.gateway.ingest(inbound_to(&mailbox.alias)).await;
        assert!(matches!(result, Err(IngestError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn usage_at_limit_rejects() {
        let fx = fixture_with_quota(100);
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.store.bump_usage(&hash, 100).unwrap();
        let result = fx.gateway.ingest(inbound_to(&mailbox.alias)).await;
        assert!(matches!(
            result,
            Err(IngestError::QuotaExceeded { current: 100, limit: 100 })
        ));
    }

    // === Listing and batch decryption ===

    #[tokio::test]
    async fn list_respects_limit() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        for _ in 0..5 {
            fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();
        }
        let items = fx.mail.list(&hash, 2).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_item_does_not_abort_the_batch() {
        let fx = fixture();
        let (client_pk, client_sk) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();
        fx.mail
            .append(&hash, "bm90IGEgcmVhbCBibG9i".to_string())
            .await
            .unwrap();
        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();

        let server_pk = PublicKey::from_bytes(&mailbox.server_public_key).unwrap();
        let secret = compute_shared_secret(&server_pk, &client_sk).unwrap();

        // Corrupt items are skipped, not fatal for the rest of the batch.
        let items = fx.mail.list(&hash, DEFAULT_LIST_LIMIT).await.unwrap();
        let decrypted: Vec<MailItem> = items
            .iter()
            .filter_map(|item| open(&secret, &item.blob).ok())
            .filter_map(|plain| serde_json::from_slice(&plain).ok())
            .collect();

        assert_eq!(items.len(), 3);
        assert_eq!(decrypted.len(), 2);
    }

    #[tokio::test]
    async fn empty_all_clears_the_mailbox() {
        let fx = fixture();
        let (client_pk, _) = client_keypair();
        let mailbox = fx.mailboxes.create(&client_pk).await.unwrap();
        let hash = fx.mailboxes.resolver().resolve(&mailbox.alias);

        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();
        fx.gateway.ingest(inbound_to(&mailbox.alias)).await.unwrap();
        fx.mail.empty_all(&hash).await.unwrap();

        let items = fx.mail.list(&hash, DEFAULT_LIST_LIMIT).await.unwrap();
        assert!(items.is_empty());
    }
}
