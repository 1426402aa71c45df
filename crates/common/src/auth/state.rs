//! CSRF state generation for the authorization redirect.
//!
//! The `state` parameter ties the authorization callback to the session
//! that initiated it. Values are drawn from the operating system CSPRNG
//! with 256 bits of entropy and encoded URL-safe without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a random state token for CSRF protection.
///
/// 32 random bytes encoded as 43 URL-safe characters.
#[must_use]
pub fn generate_state() -> String {
    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Constant-shape comparison of the expected and received state.
#[must_use]
pub fn validate_state(expected: &str, received: &str) -> bool {
    expected == received
}
