//! Error types used throughout the MTD integration layer.
//!
//! The taxonomy distinguishes terminal failures (surfaced immediately with
//! caller-actionable context) from transient ones (retried internally up to
//! a bounded count). Error text never carries token material or unmasked
//! NINOs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth credential failures. All variants are terminal and require either
/// full re-authorization or corrected client configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// The authorization code or refresh token is expired, revoked, or has
    /// already been consumed. Recovery requires a full re-authorization.
    #[error("authorization grant is invalid or has been consumed")]
    InvalidGrant,

    /// The client credentials were rejected by the authorization server.
    #[error("client is not authorized for this grant type")]
    UnauthorizedClient,

    /// The `state` returned by the authorization callback does not match
    /// the one issued for this session.
    #[error("authorization state mismatch")]
    StateMismatch,

    /// No credentials are available for the session.
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Failures of the encrypted at-rest token store.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStorageError {
    /// Decryption or integrity verification failed, or the file is
    /// truncated. The stored credentials are unusable.
    #[error("token store is corrupted")]
    Corrupted,

    /// Underlying filesystem or keychain operation failed.
    #[error("token store I/O failure: {0}")]
    Io(String),
}

/// Endpoint-dependent 409 outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// A quarterly update for this period has already been accepted.
    /// Treated as an idempotent success by callers.
    DuplicateSubmission,
    /// A final declaration already exists for the tax year.
    AlreadyDeclared,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSubmission => write!(f, "period already submitted"),
            Self::AlreadyDeclared => write!(f, "tax year already declared"),
        }
    }
}

/// 422-class outcomes requiring caller correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationKind {
    /// The request payload was rejected by upstream validation.
    MalformedRequest(String),
    /// Fewer than four quarterly periods are on file for the tax year.
    IncompleteSubmission,
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedRequest(msg) => write!(f, "malformed request: {msg}"),
            Self::IncompleteSubmission => {
                write!(f, "fewer than four quarterly periods are on file")
            }
        }
    }
}

/// Main error type for the MTD integration core.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum MtdError {
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("token storage error: {0}")]
    TokenStorage(#[from] TokenStorageError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("access forbidden for this resource")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    #[error("validation failed: {0}")]
    Validation(ValidationKind),

    #[error("rate limited by upstream")]
    RateLimited {
        /// Server-supplied delay, when one was present.
        retry_after_secs: Option<u64>,
    },

    #[error("upstream server error: {0}")]
    ServerError(String),

    #[error("upstream service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("fraud prevention header error: {0}")]
    FraudPrevention(String),

    #[error("submission state error: {0}")]
    State(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MtdError {
    /// Whether this error class is retried by the bounded-retry policy.
    ///
    /// Only rate limiting, 5xx-class upstream failures, and transport
    /// errors qualify; everything else is terminal and surfaces
    /// immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError(_) | Self::Unavailable(_) | Self::Network(_)
        )
    }

    /// Server-supplied retry delay in seconds, if this error carries one.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for MTD operations.
pub type Result<T> = std::result::Result<T, MtdError>;
