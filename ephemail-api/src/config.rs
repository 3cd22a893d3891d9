//! Environment configuration, validated once at startup.
//!
//! Every value is read and checked before the server binds a socket. A
//! missing or malformed variable aborts the process with a message naming
//! the variable, rather than surfacing later as a runtime failure.

use std::fmt;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_QUOTA_BYTES: u64 = 10_000_000;
const DEFAULT_RATE_RPS: f64 = 20.0;
const DEFAULT_RATE_BURST: u32 = 50;

/// Fully validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Domains new aliases are minted under.
    pub domains: Vec<String>,
    pub mailbox_ttl: Duration,
    pub quota_bytes: u64,
    /// Key for signing session tokens.
    pub token_secret: String,
    /// Salt for the alias hash.
    pub alias_salt: String,
    /// Hostnames (or literal IPs) allowed to deliver to the gateway.
    pub trusted_sources: Vec<String>,
    pub rate_rps: f64,
    pub rate_burst: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required variable {key}"),
            ConfigError::Invalid { key, reason } => write!(f, "invalid value for {key}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let domains = parse_domains(&required("EPHEMAIL_DOMAINS")?)?;
        let alias_salt = required("EPHEMAIL_ALIAS_SALT")?;
        let token_secret = required("EPHEMAIL_TOKEN_SECRET")?;

        let mailbox_ttl = match optional("EPHEMAIL_TTL") {
            Some(raw) => parse_duration(&raw).ok_or(ConfigError::Invalid {
                key: "EPHEMAIL_TTL",
                reason: format!("cannot parse {raw:?} as a duration"),
            })?,
            None => DEFAULT_TTL,
        };
        let quota_bytes = parse_or("EPHEMAIL_QUOTA_BYTES", DEFAULT_QUOTA_BYTES)?;
        let port = parse_or("EPHEMAIL_PORT", DEFAULT_PORT)?;
        let rate_rps = parse_or("EPHEMAIL_RATE_LIMIT_RPS", DEFAULT_RATE_RPS)?;
        let rate_burst = parse_or("EPHEMAIL_RATE_LIMIT_BURST", DEFAULT_RATE_BURST)?;

        let trusted_sources = optional("EPHEMAIL_TRUSTED_SOURCES")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        if mailbox_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                key: "EPHEMAIL_TTL",
                reason: "mailbox lifetime must be non-zero".into(),
            });
        }
        if quota_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "EPHEMAIL_QUOTA_BYTES",
                reason: "quota must be non-zero".into(),
            });
        }

        Ok(Config {
            port,
            domains,
            mailbox_ttl,
            quota_bytes,
            token_secret,
            alias_salt,
            trusted_sources,
            rate_rps,
            rate_burst,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("cannot parse {raw:?}"),
        }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_domains(raw: &str) -> Result<Vec<String>, ConfigError> {
    let domains = split_list(raw);
    if domains.is_empty() {
        return Err(ConfigError::Invalid {
            key: "EPHEMAIL_DOMAINS",
            reason: "at least one domain is required".into(),
        });
    }
    for domain in &domains {
        if !looks_like_domain(domain) {
            return Err(ConfigError::Invalid {
                key: "EPHEMAIL_DOMAINS",
                reason: format!("{domain:?} is not a valid domain name"),
            });
        }
    }
    Ok(domains)
}

/// Syntactic check only. Labels of alphanumerics and interior hyphens,
/// joined by dots, with at least one dot.
fn looks_like_domain(s: &str) -> bool {
    if s.len() > 253 || !s.contains('.') {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Accepts `"90s"`, `"30m"`, `"2h"` or a bare number of seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.chars().last()? {
        's' => (&raw[..raw.len() - 1], 1),
        'm' => (&raw[..raw.len() - 1], 60),
        'h' => (&raw[..raw.len() - 1], 3600),
        c if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };
    let n: u64 = digits.trim().parse().ok()?;
    Some(Duration::from_secs(n * unit))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
