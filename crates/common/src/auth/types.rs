//! OAuth 2.0 token types.
//!
//! [`TokenSet`] is the in-memory credential value handed out by the token
//! store. Its `Debug` and `Display` implementations render only safe
//! metadata (type, scope, obtained-at, TTL); token values are redacted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth 2.0 access and refresh tokens with metadata.
///
/// Replaced wholesale on refresh and deleted entirely on disconnect. The
/// serialized form exists only inside the encrypted store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer access token.
    pub access_token: String,

    /// Refresh token. Rotated by the server on every refresh; the previous
    /// value is invalid the moment a new pair is issued.
    pub refresh_token: String,

    /// Token type (always `Bearer` for this API).
    pub token_type: String,

    /// Granted scopes (space-separated), when reported.
    pub scope: Option<String>,

    /// Access-token lifetime in seconds at issue time.
    pub expires_in: i64,

    /// Instant the token pair was obtained (UTC).
    pub obtained_at: DateTime<Utc>,
}

impl TokenSet {
    /// Create a token set stamped with the current instant.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            scope,
            expires_in,
            obtained_at: Utc::now(),
        }
    }

    /// Absolute expiry instant of the access token.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.obtained_at + Duration::seconds(self.expires_in)
    }

    /// Whether the access token is expired or expires within
    /// `margin_seconds`.
    #[must_use]
    pub fn is_expired(&self, margin_seconds: i64) -> bool {
        Utc::now() + Duration::seconds(margin_seconds) >= self.expires_at()
    }

    /// Seconds until the access token expires (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at() - Utc::now()).num_seconds()
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

impl std::fmt::Display for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} token obtained {} (scope: {})",
            self.token_type,
            self.obtained_at.to_rfc3339(),
            self.scope.as_deref().unwrap_or("-")
        )
    }
}

/// Standard OAuth 2.0 token response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: Option<String>,
}

/// Standard OAuth 2.0 error response (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}
