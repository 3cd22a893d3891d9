//! Quota enforcement: cumulative encrypted-byte ceiling per mailbox.

/// Admission policy for the next inbound message.
///
/// The check runs against current usage alone, *before* the encrypted size
/// is known; usage is bumped afterwards with the actual ciphertext length.
/// A single oversized message can therefore land past the limit — the limit
/// bounds acceptance of the next message, not the size of any one message.
pub fn admit(current_usage: u64, limit: u64) -> bool {
    current_usage < limit
}
