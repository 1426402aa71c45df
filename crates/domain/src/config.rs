//! Configuration structures for the MTD integration core.
//!
//! Loaded by the infra config loader from environment variables with a
//! file fallback. The client secret is configuration-held and is never
//! rendered by `Debug` or logged.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the integration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtdConfig {
    /// Base URL of the resource API (e.g. `https://api.service.hmrc.gov.uk`).
    pub api_base_url: String,
    /// OAuth2 endpoints and client credentials.
    pub oauth: OAuthSettings,
    /// Vendor identity reported in fraud-prevention headers.
    pub vendor: VendorInfo,
    /// Display metrics supplied by the embedding UI layer.
    ///
    /// Required for fraud-prevention header construction; absence fails
    /// header assembly rather than fabricating values.
    pub display: Option<DisplayMetrics>,
}

/// OAuth2 authorization-server settings and client credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Authorization endpoint (redirect-based).
    pub authorize_url: String,
    /// Token endpoint (form-urlencoded POST).
    pub token_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret. Never logged.
    pub client_secret: String,
    /// Redirect URI registered for this client.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
}

impl OAuthSettings {
    /// Scopes as the space-separated string the authorization server
    /// expects.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Vendor identity for fraud-prevention headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorInfo {
    /// Product name reported upstream.
    pub product_name: String,
    /// Product version reported upstream.
    pub version: String,
}

/// Screen and application-window metrics supplied by the UI layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisplayMetrics {
    /// Primary screen width in pixels.
    pub screen_width: u32,
    /// Primary screen height in pixels.
    pub screen_height: u32,
    /// Display scaling factor.
    pub scaling_factor: f32,
    /// Colour depth in bits.
    pub colour_depth: u32,
    /// Application window width in pixels.
    pub window_width: u32,
    /// Application window height in pixels.
    pub window_height: u32,
}
