//! Error types for the store layer.
//!
//! Not-found is routine control flow here (mail regularly arrives after a
//! mailbox has expired), so it gets its own variant instead of hiding in a
//! backend error — and backend errors are never masked as not-found.

use std::fmt;

// ---------------------------------------------------------------------------
// Store adapter errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    /// The mailbox never existed or its TTL already reclaimed it.
    MailboxNotFound,
    /// The mailbox existed at the start of the operation and vanished
    /// mid-flight (TTL race between existence check and write).
    MailboxGone,
    /// Backend failure (transient network, serialization, ...). Retries, if
    /// any, belong to the backend client's own transport layer.
    Storage(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MailboxNotFound => write!(f, "mailbox not found"),
            Self::MailboxGone => write!(f, "mailbox gone mid-operation"),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Ingestion pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IngestError {
    MailboxNotFound,
    MailboxGone,
    QuotaExceeded { current: u64, limit: u64 },
    Crypto(String),
    Storage(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MailboxNotFound => write!(f, "mailbox not found"),
            Self::MailboxGone => write!(f, "mailbox gone mid-ingestion"),
            Self::QuotaExceeded { current, limit } => {
                write!(f, "storage quota exceeded: {} of {} bytes used", current, limit)
            }
            Self::Crypto(msg) => write!(f, "crypto error: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MailboxNotFound => Self::MailboxNotFound,
            StoreError::MailboxGone => Self::MailboxGone,
            StoreError::Storage(msg) => Self::Storage(msg),
        }
    }
}
