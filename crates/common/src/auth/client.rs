//! OAuth 2.0 client for the HMRC authorization server.
//!
//! Handles the redirect-based authorization flow for a desktop client:
//! authorization-URL construction with a CSRF `state`, authorization-code
//! exchange, and refresh-token rotation. All token-endpoint requests are
//! form-urlencoded POSTs (RFC 6749).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use taxdesk_domain::{AuthError, MtdError, OAuthSettings};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::state::{generate_state, validate_state};
use super::traits::AuthorizationFlow;
use super::types::{OAuthErrorBody, TokenResponse, TokenSet};

const TOKEN_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth 2.0 client for authorization, code exchange, and refresh.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    settings: OAuthSettings,
    http: Client,
    pending_state: Arc<Mutex<Option<String>>>,
}

impl OAuthClient {
    /// Create a new OAuth client for the configured authorization server.
    ///
    /// # Errors
    /// Returns `MtdError::Config` if the HTTP client cannot be built.
    pub fn new(settings: OAuthSettings) -> Result<Self, MtdError> {
        let http = Client::builder()
            .timeout(TOKEN_ENDPOINT_TIMEOUT)
            .build()
            .map_err(|e| MtdError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { settings, http, pending_state: Arc::new(Mutex::new(None)) })
    }

    /// Build the authorization URL for the browser-based flow.
    ///
    /// Returns the URL together with the generated `state`, which is also
    /// retained internally for comparison when the callback arrives.
    pub async fn authorization_url(&self) -> (String, String) {
        let state = generate_state();
        *self.pending_state.lock().await = Some(state.clone());

        let params = [
            ("response_type", "code".to_string()),
            ("client_id", self.settings.client_id.clone()),
            ("redirect_uri", self.settings.redirect_uri.clone()),
            ("scope", self.settings.scope_string()),
            ("state", state.clone()),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let url = format!("{}?{}", self.settings.authorize_url, query_string);

        debug!("built authorization URL");
        (url, state)
    }

    /// Exchange an authorization code for a token set.
    ///
    /// Validates the callback `state` against the retained value first;
    /// a mismatch is a CSRF failure and no network call is made.
    ///
    /// # Errors
    /// - `AuthError::StateMismatch` when the callback state differs
    /// - `AuthError::InvalidGrant` for an expired/invalid/reused code
    /// - `AuthError::UnauthorizedClient` for rejected client credentials
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenSet, MtdError> {
        let expected = self
            .pending_state
            .lock()
            .await
            .take()
            .ok_or_else(|| MtdError::State("no authorization in progress".to_string()))?;

        if !validate_state(&expected, state) {
            warn!("authorization callback state mismatch");
            return Err(AuthError::StateMismatch.into());
        }

        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.settings.client_id.clone()),
            ("client_secret", self.settings.client_secret.clone()),
            ("redirect_uri", self.settings.redirect_uri.clone()),
            ("code", code.to_string()),
        ];

        self.post_token_request(&form).await
    }

    /// Obtain a fresh token pair from a refresh token.
    ///
    /// The server rotates the refresh token on every use: the returned set
    /// carries a new refresh token and the one passed in is dead. Callers
    /// must persist the new set durably before discarding the old one.
    ///
    /// # Errors
    /// `AuthError::InvalidGrant` (terminal, requires full
    /// re-authorization) when the refresh token is expired or has already
    /// been consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, MtdError> {
        if refresh_token.is_empty() {
            return Err(AuthError::NotAuthenticated.into());
        }

        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.settings.client_id.clone()),
            ("client_secret", self.settings.client_secret.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];

        self.post_token_request(&form).await
    }

    async fn post_token_request(&self, form: &[(&str, String)]) -> Result<TokenSet, MtdError> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| MtdError::Network(format!("token endpoint request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body: OAuthErrorBody = response
                .json()
                .await
                .unwrap_or(OAuthErrorBody { error: format!("http {status}"), error_description: None });
            return Err(map_oauth_error(&body));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| MtdError::Internal(format!("malformed token response: {e}")))?;

        let refresh_token = token_response.refresh_token.ok_or_else(|| {
            MtdError::Internal("token response is missing a refresh token".to_string())
        })?;

        debug!("token endpoint returned a new token pair");

        Ok(TokenSet::new(
            token_response.access_token,
            refresh_token,
            token_response.expires_in,
            token_response.scope,
        ))
    }
}

fn map_oauth_error(body: &OAuthErrorBody) -> MtdError {
    match body.error.as_str() {
        "invalid_grant" => AuthError::InvalidGrant.into(),
        "invalid_client" | "unauthorized_client" => AuthError::UnauthorizedClient.into(),
        _ => MtdError::Network(format!("token endpoint rejected the request: {body}")),
    }
}

#[async_trait]
impl AuthorizationFlow for OAuthClient {
    async fn authorization_url(&self) -> (String, String) {
        self.authorization_url().await
    }

    async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenSet, MtdError> {
        self.exchange_code(code, state).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, MtdError> {
        self.refresh(refresh_token).await
    }
}
