//! Assembly of the mandatory fraud-prevention header set.
//!
//! Nine headers, all mandatory; values containing spaces or reserved
//! characters are percent-encoded. The provider collects fresh values on
//! every request (the timezone can change under a running process), and
//! any value that cannot be determined fails assembly before a request
//! is built.

use std::sync::Arc;

use taxdesk_domain::constants::CONNECTION_METHOD_DESKTOP_DIRECT;
use taxdesk_domain::{DisplayMetrics, MtdError, Result, VendorInfo};

use super::device::DeviceIdentity;
use super::probe::EnvironmentProbe;

/// The nine mandatory header names, in wire order.
pub const MANDATORY_HEADERS: [&str; 9] = [
    "Gov-Client-Connection-Method",
    "Gov-Client-Device-ID",
    "Gov-Client-User-IDs",
    "Gov-Client-Timezone",
    "Gov-Client-Local-IPs",
    "Gov-Client-Screens",
    "Gov-Client-Window-Size",
    "Gov-Vendor-Product-Name",
    "Gov-Vendor-Version",
];

/// A fully-assembled, ordered fraud-prevention header set.
///
/// Existence of a value implies completeness: the only constructor fails
/// unless every mandatory header resolved.
#[derive(Debug, Clone)]
pub struct FraudPreventionHeaders {
    entries: Vec<(&'static str, String)>,
}

impl FraudPreventionHeaders {
    /// The ordered name/value pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.entries
    }

    /// Value for a header name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }
}

/// Builds the fraud-prevention header set for every outbound request.
pub struct FraudPreventionProvider {
    device: DeviceIdentity,
    probe: Arc<dyn EnvironmentProbe>,
    vendor: VendorInfo,
    display: DisplayMetrics,
}

impl FraudPreventionProvider {
    /// Create a provider.
    ///
    /// Display metrics come from the embedding UI layer; a `None` there
    /// is a construction failure here, not a silent omission.
    pub fn new(
        device: DeviceIdentity,
        probe: Arc<dyn EnvironmentProbe>,
        vendor: VendorInfo,
        display: Option<DisplayMetrics>,
    ) -> Result<Self> {
        let display = display.ok_or_else(|| {
            MtdError::FraudPrevention(
                "display metrics are unavailable; Gov-Client-Screens cannot be built".to_string(),
            )
        })?;

        Ok(Self { device, probe, vendor, display })
    }

    /// Assemble the full header set, failing if any value is
    /// undeterminable.
    ///
    /// # Errors
    /// `MtdError::FraudPrevention` naming the missing value.
    pub fn headers(&self) -> Result<FraudPreventionHeaders> {
        let user = self.probe.os_username()?;
        let timezone = self.probe.timezone()?;
        let ips = self.probe.local_ips()?;

        let screens = format!(
            "width={}&height={}&scaling-factor={}&colour-depth={}",
            self.display.screen_width,
            self.display.screen_height,
            self.display.scaling_factor,
            self.display.colour_depth
        );
        let window =
            format!("width={}&height={}", self.display.window_width, self.display.window_height);

        let entries = vec![
            ("Gov-Client-Connection-Method", CONNECTION_METHOD_DESKTOP_DIRECT.to_string()),
            ("Gov-Client-Device-ID", self.device.id().to_string()),
            ("Gov-Client-User-IDs", format!("os={}", encode(&user))),
            ("Gov-Client-Timezone", timezone),
            (
                "Gov-Client-Local-IPs",
                ips.iter().map(|ip| encode(ip)).collect::<Vec<_>>().join(","),
            ),
            ("Gov-Client-Screens", screens),
            ("Gov-Client-Window-Size", window),
            ("Gov-Vendor-Product-Name", encode(&self.vendor.product_name)),
            ("Gov-Vendor-Version", encode(&self.vendor.version)),
        ];

        debug_assert_eq!(entries.len(), MANDATORY_HEADERS.len());
        Ok(FraudPreventionHeaders { entries })
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
