//! Token lifecycle management for the single MTD session.
//!
//! One logical OAuth session exists per installation. The manager owns the
//! in-memory token set, refreshes lazily immediately before authenticated
//! calls (never via a background timer), and guarantees that a refreshed
//! pair is durably persisted before the old pair is discarded from
//! memory: the refresh token is single-use, so losing the new pair after
//! rotation would strand the session.

use std::sync::Arc;

use taxdesk_domain::constants::TOKEN_REFRESH_MARGIN_SECS;
use taxdesk_domain::{AuthError, MtdError, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::traits::{AuthorizationFlow, TokenStore};
use super::types::TokenSet;

/// Authentication lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials held.
    Unauthenticated,
    /// An authorization redirect has been issued and awaits its callback.
    Authorizing,
    /// Valid credentials held.
    Authenticated,
    /// Credentials held but the access token has passed its expiry.
    Expired,
}

/// Manages the OAuth session: authorization, lazy refresh, disconnect.
pub struct TokenManager<F: AuthorizationFlow, S: TokenStore> {
    flow: Arc<F>,
    store: Arc<S>,
    current: RwLock<Option<TokenSet>>,
    // Refresh mutual exclusion: the refresh token is single-use, so
    // concurrent discoveries of an expiring token must funnel through one
    // refresh while the rest await its result.
    refresh_lock: Mutex<()>,
    refresh_margin_secs: i64,
    authorizing: RwLock<bool>,
}

impl<F: AuthorizationFlow, S: TokenStore> TokenManager<F, S> {
    /// Create a manager with the default refresh margin.
    pub fn new(flow: Arc<F>, store: Arc<S>) -> Self {
        Self::with_refresh_margin(flow, store, TOKEN_REFRESH_MARGIN_SECS)
    }

    /// Create a manager refreshing tokens whose remaining TTL is below
    /// `refresh_margin_secs`.
    pub fn with_refresh_margin(flow: Arc<F>, store: Arc<S>, refresh_margin_secs: i64) -> Self {
        Self {
            flow,
            store,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_margin_secs,
            authorizing: RwLock::new(false),
        }
    }

    /// Load any stored credentials into memory. Call once at startup.
    ///
    /// Returns whether credentials were found.
    ///
    /// # Errors
    /// Propagates storage corruption; a missing file is not an error.
    pub async fn initialize(&self) -> Result<bool> {
        match self.store.load().await? {
            Some(tokens) => {
                *self.current.write().await = Some(tokens);
                info!("session initialized from stored credentials");
                Ok(true)
            }
            None => {
                debug!("no stored credentials found");
                Ok(false)
            }
        }
    }

    /// Start the authorization flow; returns (url, state) for the browser
    /// redirect.
    pub async fn begin_authorization(&self) -> (String, String) {
        *self.authorizing.write().await = true;
        self.flow.authorization_url().await
    }

    /// Complete the authorization flow from the redirect callback.
    ///
    /// The exchanged token set is persisted durably before it becomes the
    /// session credential.
    ///
    /// # Errors
    /// Propagates exchange failures (state mismatch, invalid grant) and
    /// storage failures; the session stays unauthenticated on error.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<()> {
        let result = self.flow.exchange_code(code, state).await;
        *self.authorizing.write().await = false;

        let tokens = result?;
        self.store.save(&tokens).await?;
        *self.current.write().await = Some(tokens);

        info!("authorization complete");
        Ok(())
    }

    /// Current access token, refreshing first when the remaining TTL is
    /// below the margin.
    ///
    /// # Errors
    /// `AuthError::NotAuthenticated` without credentials; refresh errors
    /// propagate.
    pub async fn access_token(&self) -> Result<String> {
        if self.needs_refresh().await {
            self.refresh_if_needed().await?;
        }

        let guard = self.current.read().await;
        guard
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Refresh unless another caller already did while we waited for the
    /// lock.
    ///
    /// # Errors
    /// See [`TokenManager::access_token`].
    pub async fn refresh_if_needed(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        // A sibling may have refreshed while we waited; re-check under the
        // lock before consuming the single-use refresh token.
        if !self.needs_refresh().await {
            return Ok(());
        }

        self.rotate_tokens().await
    }

    /// Refresh after an upstream 401, unless the token has already been
    /// replaced since `stale_access_token` was issued to the caller.
    ///
    /// # Errors
    /// See [`TokenManager::access_token`].
    pub async fn refresh_after_auth_failure(&self, stale_access_token: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        {
            let guard = self.current.read().await;
            match guard.as_ref() {
                None => return Err(AuthError::NotAuthenticated.into()),
                // Another caller already rotated; the new token may work.
                Some(t) if t.access_token != stale_access_token => return Ok(()),
                Some(_) => {}
            }
        }

        self.rotate_tokens().await
    }

    /// Discard the session entirely: stored file, memory, lifecycle state.
    ///
    /// # Errors
    /// Propagates storage deletion failures.
    pub async fn disconnect(&self) -> Result<()> {
        self.store.delete().await?;
        *self.current.write().await = None;
        *self.authorizing.write().await = false;
        info!("session disconnected");
        Ok(())
    }

    /// Whether credentials are currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Current lifecycle state.
    pub async fn session_state(&self) -> SessionState {
        if *self.authorizing.read().await {
            return SessionState::Authorizing;
        }
        match self.current.read().await.as_ref() {
            None => SessionState::Unauthenticated,
            Some(t) if t.is_expired(0) => SessionState::Expired,
            Some(_) => SessionState::Authenticated,
        }
    }

    async fn needs_refresh(&self) -> bool {
        let guard = self.current.read().await;
        guard.as_ref().is_some_and(|t| t.is_expired(self.refresh_margin_secs))
    }

    // Caller must hold `refresh_lock`.
    async fn rotate_tokens(&self) -> Result<()> {
        let refresh_token = {
            let guard = self.current.read().await;
            match guard.as_ref() {
                Some(t) => t.refresh_token.clone(),
                None => return Err(AuthError::NotAuthenticated.into()),
            }
        };

        let new_tokens = match self.flow.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(err @ MtdError::Auth(AuthError::InvalidGrant)) => {
                // The refresh token is dead (expired or replayed). The
                // session cannot be recovered; require re-authorization.
                warn!("refresh token rejected; clearing session");
                self.store.delete().await.ok();
                *self.current.write().await = None;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        // Persist the new pair durably before the old pair leaves memory.
        // The old refresh token is already invalid server-side, so losing
        // the new pair here would strand the session.
        self.store.save(&new_tokens).await?;
        *self.current.write().await = Some(new_tokens);

        debug!("access token refreshed");
        Ok(())
    }
}
