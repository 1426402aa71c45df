//! Conversions from transport-layer failures into the domain taxonomy.

use taxdesk_domain::MtdError;

/// Map a reqwest transport failure onto the domain taxonomy.
///
/// Everything here is a network-class (transient) failure; HTTP status
/// codes are mapped separately by the gateway once a response exists.
/// The URL is stripped from the error before it is rendered; request
/// paths carry identifiers that must stay masked.
pub(crate) fn map_transport_error(err: reqwest::Error) -> MtdError {
    if err.is_timeout() {
        return MtdError::Network("request timed out".to_string());
    }
    let is_connect = err.is_connect();
    let sanitized = err.without_url();
    if is_connect {
        return MtdError::Network(format!("connection failed: {sanitized}"));
    }
    MtdError::Network(format!("transport failure: {sanitized}"))
}
