//! Ephemail API Server
//!
//! HTTP interface to the disposable-mailbox store and the mail ingestion
//! gateway. Mailboxes are anonymous: the only credential is the session
//! cookie handed out at creation, and mail is stored encrypted to a key
//! only the creating client can reconstruct.
//!
//! Configuration (environment variables):
//!   EPHEMAIL_DOMAINS           - Comma-separated alias domains (required)
//!   EPHEMAIL_ALIAS_SALT        - Salt for the alias hash (required)
//!   EPHEMAIL_TOKEN_SECRET      - Session token signing key (required)
//!   EPHEMAIL_TTL               - Mailbox lifetime, e.g. "30m" (default: 30m)
//!   EPHEMAIL_QUOTA_BYTES       - Per-mailbox storage quota (default: 10000000)
//!   EPHEMAIL_TRUSTED_SOURCES   - Hosts/IPs allowed to deliver to /gateway
//!   EPHEMAIL_PORT              - Listen port (default: 3000)
//!   EPHEMAIL_RATE_LIMIT_RPS    - Requests per second per IP (default: 20)
//!   EPHEMAIL_RATE_LIMIT_BURST  - Burst capacity per IP (default: 50)
//!   EPHEMAIL_LOG_FORMAT        - "json" for structured logging, "pretty" for dev

mod config;
mod source;
mod token;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use config::Config;
use ephemail_crypto::{AliasResolver, PublicKey};
use ephemail_store::{
    EncryptedMailRef, InMemoryStore, InboundMail, IngestError, MailGateway, MailStore,
    MailboxStore, DEFAULT_LIST_LIMIT,
};
use serde::{Deserialize, Serialize};
use source::SourcePolicy;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use token::{Claims, TokenError, TokenSigner, RESET_THRESHOLD};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    mailboxes: MailboxStore,
    mail: MailStore,
    gateway: MailGateway,
    signer: TokenSigner,
    source: SourcePolicy,
    rate_limiter: RateLimiter,
    quota_bytes: u64,
    mailbox_ttl: std::time::Duration,
}

type Shared = Arc<AppState>;

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    rps: f64,
    burst: u32,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(rps: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps,
            burst,
        }
    }

    async fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: self.burst as f64,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.burst as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn cleanup_rate_limiter(limiter: &RateLimiter) {
    let mut buckets = limiter.buckets.lock().await;
    let now = Instant::now();
    buckets.retain(|_, bucket| now.duration_since(bucket.last_refill).as_secs() < 300);
}

async fn rate_limit_middleware(
    State(state): State<Shared>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    // Gateway traffic is gated by source authorization instead; mail
    // delivery bursts must not be throttled away.
    let path = req.uri().path();
    if path == "/health" || path == "/gateway" {
        return next.run(req).await.into_response();
    }

    if !state.rate_limiter.check(addr.ip()).await {
        tracing::warn!(ip = %addr.ip(), path = %req.uri().path(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "1")],
            Json(ApiError { error: "rate limit exceeded".into() }),
        )
            .into_response();
    }

    next.run(req).await.into_response()
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateMailboxReq {
    /// Client-side public key, raw 32 bytes.
    #[serde(rename = "publicKey")]
    public_key: Vec<u8>,
}

#[derive(Serialize, Clone)]
struct ApiError {
    error: String,
}

#[derive(Serialize)]
struct CreatedMailbox {
    alias: String,
}

#[derive(Serialize)]
struct UsageInfo {
    current: u64,
    max: u64,
}

#[derive(Serialize)]
struct MailboxView {
    mail: Vec<EncryptedMailRef>,
    /// Server public key (base64), included only when there is mail to
    /// decrypt with it.
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    usage: UsageInfo,
    /// Session expiry, unix seconds.
    expires: i64,
}

fn err(code: StatusCode, msg: impl Into<String>) -> Response {
    (code, Json(ApiError { error: msg.into() })).into_response()
}

fn err500() -> Response {
    err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

// ---------------------------------------------------------------------------
// Session extraction
// ---------------------------------------------------------------------------

/// Pulls and verifies the session token from the request cookies.
///
/// A missing or forged token reads as "no such mailbox" rather than an
/// auth failure: mailboxes are anonymous, so their existence is never
/// confirmed to anyone without a valid session. An expired session is the
/// one exception, so clients can tell it apart from throttling and from
/// a mailbox that never existed.
fn session_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, Response> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(token::token_from_cookies)
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "no such mailbox"))?;

    match state.signer.verify(token) {
        Ok(claims) => Ok(claims),
        Err(TokenError::Expired) => Err(err(StatusCode::UNAUTHORIZED, "mailbox session expired")),
        Err(TokenError::Invalid) => Err(err(StatusCode::NOT_FOUND, "no such mailbox")),
    }
}

fn resolver(state: &AppState) -> &AliasResolver {
    state.mailboxes.resolver()
}

// ---------------------------------------------------------------------------
// Routes — mailbox resource
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn create_mailbox(
    State(state): State<Shared>,
    Json(req): Json<CreateMailboxReq>,
) -> Response {
    let client_key = match PublicKey::from_bytes(&req.public_key) {
        Ok(key) => key,
        Err(_) => return err(StatusCode::BAD_REQUEST, "invalid key provided"),
    };

    let mailbox = match state.mailboxes.create(&client_key).await {
        Ok(mailbox) => mailbox,
        Err(e) => {
            tracing::error!(error = %e, "mailbox creation failed");
            return err500();
        }
    };

    let claims = Claims::new(
        mailbox.alias.clone(),
        BASE64.encode(&mailbox.server_public_key),
        state.mailbox_ttl,
    );
    let cookie = token::session_cookie(&state.signer.issue(&claims), state.mailbox_ttl);

    tracing::info!(alias = %mailbox.alias, "created mailbox");
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(CreatedMailbox { alias: mailbox.alias }),
    )
        .into_response()
}

async fn read_mailbox(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let claims = match session_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let alias_hash = resolver(&state).resolve(&claims.alias);

    match state.mailboxes.exists(&alias_hash).await {
        Ok(true) => {}
        Ok(false) => return err(StatusCode::NOT_FOUND, "no such mailbox"),
        Err(e) => {
            tracing::error!(error = %e, "mailbox lookup failed");
            return err500();
        }
    }

    let mail = match state.mail.list(&alias_hash, DEFAULT_LIST_LIMIT).await {
        Ok(mail) => mail,
        Err(e) => {
            tracing::error!(error = %e, "mail listing failed");
            return err500();
        }
    };
    let usage = match state.mailboxes.usage(&alias_hash).await {
        Ok(usage) => usage,
        Err(e) => {
            tracing::error!(error = %e, "usage lookup failed");
            return err500();
        }
    };

    let key = if mail.is_empty() {
        None
    } else {
        Some(claims.server_public_key.clone())
    };
    Json(MailboxView {
        mail,
        key,
        usage: UsageInfo { current: usage, max: state.quota_bytes },
        expires: claims.expires_at,
    })
    .into_response()
}

async fn renew_mailbox(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let claims = match session_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let alias_hash = resolver(&state).resolve(&claims.alias);

    match state.mailboxes.renew(&alias_hash).await {
        Ok(()) => {
            // The session must track the renewed lifetime, otherwise the
            // mailbox outlives its only credential and becomes unreachable.
            let renewed = claims.renew(state.mailbox_ttl);
            let cookie = token::session_cookie(&state.signer.issue(&renewed), state.mailbox_ttl);
            (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
        }
        Err(ephemail_store::StoreError::MailboxNotFound) => {
            err(StatusCode::NOT_FOUND, "no such mailbox")
        }
        Err(e) => {
            tracing::error!(error = %e, "mailbox renewal failed");
            err500()
        }
    }
}

async fn destroy_mailbox(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let claims = match session_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let alias_hash = resolver(&state).resolve(&claims.alias);

    match state.mailboxes.exists(&alias_hash).await {
        Ok(true) => {}
        Ok(false) => return err(StatusCode::NOT_FOUND, "no such mailbox"),
        Err(e) => {
            tracing::error!(error = %e, "mailbox lookup failed");
            return err500();
        }
    }

    if !claims.reset_eligible(RESET_THRESHOLD) {
        return err(
            StatusCode::FORBIDDEN,
            "mailbox is not yet eligible for reset",
        );
    }

    if let Err(e) = state.mail.empty_all(&alias_hash).await {
        // Orphaned mail with a dead alias hash is unreadable and ages out
        // on its own TTL; the destroy still proceeds.
        tracing::warn!(error = %e, "failed to empty mailbox during destroy");
    }

    match state.mailboxes.destroy(&alias_hash).await {
        Ok(()) => {
            tracing::info!(alias = %claims.alias, "destroyed mailbox");
            (
                StatusCode::NO_CONTENT,
                [(header::SET_COOKIE, token::expired_cookie())],
            )
                .into_response()
        }
        Err(ephemail_store::StoreError::MailboxNotFound) => {
            err(StatusCode::NOT_FOUND, "no such mailbox")
        }
        Err(e) => {
            tracing::error!(error = %e, "mailbox destroy failed");
            err500()
        }
    }
}

// ---------------------------------------------------------------------------
// Routes — ingestion gateway
// ---------------------------------------------------------------------------

/// The delivery IP as seen by the gateway. Behind a proxy the socket peer
/// is the proxy itself, so a forwarding header takes precedence.
fn delivery_ip(headers: &HeaderMap, peer: SocketAddr) -> Option<IpAddr> {
    for name in ["x-real-ip", "x-forwarded-for"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next()?.trim();
            return first.parse().ok();
        }
    }
    Some(peer.ip())
}

async fn ingest_mail(
    State(state): State<Shared>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(inbound): Json<InboundMail>,
) -> Response {
    let ip = match delivery_ip(&headers, peer) {
        Some(ip) => ip,
        None => {
            tracing::error!("could not determine delivery source address");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    if !state.source.authorize(ip).await {
        tracing::warn!(ip = %ip, "unauthorized delivery attempt");
        return (StatusCode::UNAUTHORIZED, "not authorized").into_response();
    }

    // The upstream forwarder only looks at the status code; plain text
    // bodies, no JSON envelope.
    match state.gateway.ingest(inbound).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(IngestError::MailboxNotFound) | Err(IngestError::MailboxGone) => {
            (StatusCode::NOT_FOUND, "mailbox does not exist").into_response()
        }
        Err(IngestError::QuotaExceeded { current, limit }) => {
            tracing::debug!(current, limit, "delivery rejected, quota exceeded");
            (StatusCode::FORBIDDEN, "storage quota exceeded").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "mail ingestion failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn build_state(cfg: &Config) -> Shared {
    let backend = Arc::new(InMemoryStore::new());
    let resolver = AliasResolver::new(cfg.alias_salt.as_bytes())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "invalid alias salt");
            std::process::exit(1);
        });

    let mailboxes = MailboxStore::new(
        backend.clone(),
        resolver,
        cfg.domains.clone(),
        cfg.mailbox_ttl,
    );
    let mail = MailStore::new(backend);
    let gateway = MailGateway::new(mailboxes.clone(), mail.clone(), cfg.quota_bytes);

    Arc::new(AppState {
        mailboxes,
        mail,
        gateway,
        signer: TokenSigner::new(cfg.token_secret.as_bytes()),
        source: SourcePolicy::new(cfg.trusted_sources.clone()),
        rate_limiter: RateLimiter::new(cfg.rate_rps, cfg.rate_burst),
        quota_bytes: cfg.quota_bytes,
        mailbox_ttl: cfg.mailbox_ttl,
    })
}

#[tokio::main]
async fn main() {
    let log_format = std::env::var("EPHEMAIL_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ephemail_api=info,ephemail_store=info,tower_http=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    if cfg.trusted_sources.is_empty() {
        tracing::warn!("no trusted sources configured — gateway will reject all deliveries");
    }

    let state = build_state(&cfg);

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_rate_limiter(&cleanup_state.rate_limiter).await;
        }
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/mailbox",
            get(read_mailbox)
                .post(create_mailbox)
                .put(renew_mailbox)
                .delete(destroy_mailbox),
        )
        .route("/gateway", post(ingest_mail))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors)
        .with_state(state);

    tracing::info!(
        port = cfg.port,
        domains = ?cfg.domains,
        ttl_secs = cfg.mailbox_ttl.as_secs(),
        quota_bytes = cfg.quota_bytes,
        "starting Ephemail API Server"
    );

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) =
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
