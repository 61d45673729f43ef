// ── Core error types ──
//
// User-facing errors from surfctl-core. Consumers never see pool indices,
// HTTP status codes or log-parse failures directly: the `From` impls below
// translate lower-layer errors into domain variants.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Subscriber {imsi} already exists")]
    DuplicateIdentity { imsi: String },

    #[error("Address {ip} is not available: {reason}")]
    AddressUnavailable { ip: String, reason: String },

    #[error("No free values left in the {pool} pool")]
    PoolExhausted { pool: String },

    #[error("Not found: {entity} {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Subscriber store failure: {message}")]
    StoreFailure { message: String },

    // ── Upstream feeds ───────────────────────────────────────────────
    #[error("{feed} feed unavailable: {reason}")]
    FeedUnavailable { feed: String, reason: String },

    #[error("{feed} feed is not configured")]
    FeedNotConfigured { feed: String },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn subscriber_not_found(imsi: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: "subscriber",
            identifier: imsi.to_string(),
        }
    }

    /// Whether retrying the same call unchanged may succeed.
    ///
    /// Only store failures qualify; every other variant describes a
    /// conflict or bad input that a retry would reproduce.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreFailure { .. })
    }
}

// ── Pool errors ──────────────────────────────────────────────────────

/// Failure to reserve a value from an [`AllocationPool`](crate::pool::AllocationPool).
///
/// Values are carried pre-rendered so the pool stays generic over its key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("{pool} pool is exhausted")]
    Exhausted { pool: &'static str },

    #[error("{value} is already held in the {pool} pool")]
    Unavailable { pool: &'static str, value: String },

    #[error("{value} is outside the {pool} pool range")]
    OutOfRange { pool: &'static str, value: String },

    #[error("{pool} pool range {first}..={last} is empty")]
    InvalidRange {
        pool: &'static str,
        first: String,
        last: String,
    },
}

// ── Conversion from lower layers ─────────────────────────────────────

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Exists { imsi } => Self::DuplicateIdentity { imsi },
            other => Self::StoreFailure {
                message: other.to_string(),
            },
        }
    }
}

impl From<surfctl_api::Error> for CoreError {
    fn from(err: surfctl_api::Error) -> Self {
        use surfctl_api::Error;

        match err {
            Error::NotConfigured { feed } => Self::FeedNotConfigured { feed: feed.into() },
            Error::LogUnavailable { path, reason } => Self::FeedUnavailable {
                feed: "MME link".into(),
                reason: format!("{path}: {reason}"),
            },
            Error::Authentication { message } => Self::FeedUnavailable {
                feed: "SAS portal".into(),
                reason: format!("authentication rejected: {message}"),
            },
            Error::Http { status, .. } => Self::FeedUnavailable {
                feed: "SAS portal".into(),
                reason: format!("HTTP {status}"),
            },
            Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid SAS portal URL: {e}"),
            },
            other => Self::FeedUnavailable {
                feed: "SAS portal".into(),
                reason: other.to_string(),
            },
        }
    }
}
