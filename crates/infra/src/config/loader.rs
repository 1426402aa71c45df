//! Configuration loader.
//!
//! Loads the MTD core configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TAXDESK_API_BASE_URL`: resource API base URL
//! - `TAXDESK_OAUTH_AUTHORIZE_URL` / `TAXDESK_OAUTH_TOKEN_URL`
//! - `TAXDESK_CLIENT_ID` / `TAXDESK_CLIENT_SECRET`
//! - `TAXDESK_REDIRECT_URI`
//! - `TAXDESK_SCOPES`: space-separated scope list
//! - `TAXDESK_VENDOR_PRODUCT` / `TAXDESK_VENDOR_VERSION`
//!
//! Display metrics are not environment-configurable: they come from the
//! embedding UI through the file form or are set programmatically.

use std::path::{Path, PathBuf};

use taxdesk_domain::{MtdConfig, MtdError, OAuthSettings, Result, VendorInfo};

/// Load configuration with automatic fallback strategy.
///
/// A `.env` file in the working directory is honored before the
/// environment is read.
///
/// # Errors
/// Returns `MtdError::Config` when neither source yields a complete
/// configuration.
pub fn load() -> Result<MtdConfig> {
    let _ = dotenvy::dotenv();

    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "environment configuration incomplete, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables.
///
/// # Errors
/// Returns `MtdError::Config` when a required variable is missing.
pub fn load_from_env() -> Result<MtdConfig> {
    let scopes = env_var("TAXDESK_SCOPES")?
        .split_whitespace()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    Ok(MtdConfig {
        api_base_url: env_var("TAXDESK_API_BASE_URL")?,
        oauth: OAuthSettings {
            authorize_url: env_var("TAXDESK_OAUTH_AUTHORIZE_URL")?,
            token_url: env_var("TAXDESK_OAUTH_TOKEN_URL")?,
            client_id: env_var("TAXDESK_CLIENT_ID")?,
            client_secret: env_var("TAXDESK_CLIENT_SECRET")?,
            redirect_uri: env_var("TAXDESK_REDIRECT_URI")?,
            scopes,
        },
        vendor: VendorInfo {
            product_name: env_var("TAXDESK_VENDOR_PRODUCT")?,
            version: env_var("TAXDESK_VENDOR_VERSION")?,
        },
        display: None,
    })
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations. Format is chosen
/// by extension: `.toml` is parsed as TOML, anything else as JSON.
///
/// # Errors
/// Returns `MtdError::Config` for a missing file, no probe hit, or a
/// parse failure.
pub fn load_from_file(path: Option<PathBuf>) -> Result<MtdConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(MtdError::Config(format!("config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            MtdError::Config("no config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| MtdError::Config(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<MtdConfig> {
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");

    if is_toml {
        toml::from_str(contents)
            .map_err(|e| MtdError::Config(format!("invalid TOML config: {e}")))
    } else {
        serde_json::from_str(contents)
            .map_err(|e| MtdError::Config(format!("invalid JSON config: {e}")))
    }
}

fn probe_config_paths() -> Option<PathBuf> {
    let candidates = [
        "taxdesk.toml",
        "taxdesk.json",
        "config.toml",
        "config.json",
        "../taxdesk.toml",
        "../taxdesk.json",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| MtdError::Config(format!("missing environment variable {name}")))
}
