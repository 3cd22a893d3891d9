//! Gateway source authorization.
//!
//! The ingestion webhook only accepts mail from operator-configured
//! sources. Each configured entry is either a literal IP, compared
//! directly, or a hostname that is resolved and matched against the
//! caller's address. Resolution failures count as a mismatch: the
//! gateway fails closed.

use std::net::IpAddr;
use tokio::net::lookup_host;

#[derive(Clone)]
pub struct SourcePolicy {
    sources: Vec<String>,
}

impl SourcePolicy {
    pub fn new(sources: Vec<String>) -> Self {
        SourcePolicy { sources }
    }

    /// Whether `ip` belongs to any trusted source. An empty source list
    /// authorizes nobody.
    pub async fn authorize(&self, ip: IpAddr) -> bool {
        for source in &self.sources {
            if let Ok(literal) = source.parse::<IpAddr>() {
                if literal == ip {
                    return true;
                }
                continue;
            }
            // Port is only there to satisfy the resolver API.
            match lookup_host((source.as_str(), 25)).await {
                Ok(addrs) => {
                    if addrs.map(|a| a.ip()).any(|resolved| resolved == ip) {
                        return true;
                    }
                }
                Err(err) => {
                    tracing::warn!(source = %source, error = %err, "source lookup failed");
                }
            }
        }
        false
    }
}
