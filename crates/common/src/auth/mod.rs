//! OAuth 2.0 authentication for the MTD session.
//!
//! Module layering, bottom up:
//! - `types`: token values and wire DTOs
//! - `state`: CSRF state generation
//! - `client`: the authorization-server client (authorize/exchange/refresh)
//! - `store`: encrypted at-rest persistence
//! - `manager`: session lifecycle over client + store
//! - `traits`: ports for dependency injection and mocks

pub mod client;
pub mod manager;
pub mod state;
pub mod store;
pub mod traits;
pub mod types;

pub use client::OAuthClient;
pub use manager::{SessionState, TokenManager};
pub use state::{generate_state, validate_state};
pub use store::{EncryptedTokenStore, KeyringKeyProvider, StaticKeyProvider, TokenKeyProvider};
pub use traits::{AuthorizationFlow, TokenStore};
pub use types::{OAuthErrorBody, TokenResponse, TokenSet};
