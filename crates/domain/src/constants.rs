//! Domain constants shared across the MTD integration layer.

use std::time::Duration;

/// Versioned JSON media type requested from the resource API.
pub const HMRC_ACCEPT_HEADER: &str = "application/vnd.hmrc.2.0+json";

/// Connection method reported in fraud-prevention headers for a desktop
/// client talking to HMRC directly.
pub const CONNECTION_METHOD_DESKTOP_DIRECT: &str = "DESKTOP_APP_DIRECT";

/// Number of quarterly updates required before a calculation can be
/// triggered for a tax year.
pub const QUARTERS_PER_TAX_YEAR: u8 = 4;

/// Remaining access-token lifetime below which a refresh is performed
/// before issuing an authenticated call.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Default bounded-retry settings for transient API failures.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
/// Base delay for the first retry.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on any single backoff delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
/// Default jitter factor applied to computed backoff delays.
pub const DEFAULT_RETRY_JITTER_FACTOR: f64 = 0.3;

/// Default interval between calculation-readiness polls.
pub const DEFAULT_CALCULATION_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default bound on calculation-readiness polls before giving up.
pub const DEFAULT_CALCULATION_POLL_ATTEMPTS: u32 = 20;
