//! Traits for OAuth and token-store operations.
//!
//! These traits enable dependency injection and testing by abstracting
//! the authorization server and the at-rest credential store.

use async_trait::async_trait;
use taxdesk_domain::Result;

use super::types::TokenSet;

/// Operations against the OAuth authorization server.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Build the authorization URL; returns (url, state).
    async fn authorization_url(&self) -> (String, String);

    /// Exchange an authorization code, validating the callback state.
    async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenSet>;

    /// Obtain a fresh token pair from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;
}

/// At-rest credential storage.
///
/// Implementations must serialize concurrent access internally: the
/// backing file is single-writer.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a token set durably, replacing any previous one.
    async fn save(&self, tokens: &TokenSet) -> Result<()>;

    /// Load the stored token set, or `None` when nothing is stored.
    async fn load(&self) -> Result<Option<TokenSet>>;

    /// Remove the stored token set entirely.
    async fn delete(&self) -> Result<()>;

    /// Whether a stored token set currently exists.
    async fn exists(&self) -> bool;
}
