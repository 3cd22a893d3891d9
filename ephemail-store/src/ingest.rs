//! Mail ingestion pipeline: resolve, check, encrypt, persist.
//!
//! Source authorization (step 1 of the gateway) lives at the HTTP boundary;
//! everything after the envelope is parsed happens here so it can be
//! exercised without a server.

use crate::error::IngestError;
use crate::mail::MailStore;
use crate::mailbox::MailboxStore;
use crate::quota;
use crate::types::{Attachment, MailBody, MailItem, NameAddress};

use chrono::{DateTime, Utc};
use ephemail_crypto::seal;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Inbound envelope (what the upstream forwarder posts)
// ---------------------------------------------------------------------------

/// An address header as the forwarder parses it: display text plus the
/// structured name/address pairs.
#[derive(Clone, Debug, Deserialize)]
pub struct AddressField {
    pub text: String,
    #[serde(default)]
    pub value: Vec<NameAddress>,
}

/// Parsed MIME envelope delivered by the trusted upstream.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundMail {
    pub to: AddressField,
    pub from: AddressField,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub raw: Option<String>,
}

impl From<InboundMail> for MailItem {
    fn from(inbound: InboundMail) -> Self {
        Self {
            to: inbound.to.text,
            from: inbound.from.value,
            date: inbound.date.unwrap_or_else(Utc::now),
            subject: inbound.subject,
            body: MailBody {
                plain: inbound.text,
                html: inbound.html,
            },
            attachments: inbound.attachments,
            raw: inbound.raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MailGateway {
    mailboxes: MailboxStore,
    mail: MailStore,
    quota_limit: u64,
}

impl MailGateway {
    pub fn new(mailboxes: MailboxStore, mail: MailStore, quota_limit: u64) -> Self {
        Self {
            mailboxes,
            mail,
            quota_limit,
        }
    }

    /// Accept one inbound envelope.
    ///
    /// Resolves the destination alias, checks existence and quota, seals
    /// the payload under the mailbox's stored shared secret, and appends.
    /// No retry on failure — the upstream forwarder owns retry/backoff.
    pub async fn ingest(&self, inbound: InboundMail) -> Result<(), IngestError> {
        let alias_hash = self.mailboxes.resolver().resolve(&inbound.to.text);

        // Expected and common: mail routinely arrives after expiry.
        if !self.mailboxes.exists(&alias_hash).await? {
            tracing::debug!("inbound mail for unknown or expired mailbox");
            return Err(IngestError::MailboxNotFound);
        }

        let current = self.mailboxes.usage(&alias_hash).await?;
        if !quota::admit(current, self.quota_limit) {
            tracing::debug!(current, limit = self.quota_limit, "quota exceeded");
            return Err(IngestError::QuotaExceeded {
                current,
                limit: self.quota_limit,
            });
        }

        let secret = self.mailboxes.secret(&alias_hash).await?;
        let item = MailItem::from(inbound);
        let payload = serde_json::to_vec(&item)
            .map_err(|e| IngestError::Crypto(format!("serialize: {}", e)))?;
        let blob =
            seal(&secret, &payload).map_err(|e| IngestError::Crypto(format!("seal: {}", e)))?;

        self.mail.append(&alias_hash, blob).await?;
        Ok(())
    }
}
