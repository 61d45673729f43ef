use thiserror::Error;

/// Top-level error type for the `surfctl-api` crate.
///
/// Covers transport failures against the SAS portal and I/O failures
/// against the MME log. `surfctl-core` folds all of these into a single
/// "feed unavailable" condition for the affected reconciliation cycle.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing or joining error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Credentials rejected by the portal (401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Any other non-success HTTP status.
    #[error("SAS portal returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Local sources ───────────────────────────────────────────────
    /// The MME log could not be read.
    #[error("MME log unavailable at {path}: {reason}")]
    LogUnavailable { path: String, reason: String },

    /// The feed has no configuration (e.g. no SAS customer id).
    #[error("{feed} is not configured")]
    NotConfigured { feed: &'static str },
}

impl Error {
    /// Whether this error means "nothing to query" rather than "query failed".
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured { .. })
    }
}
