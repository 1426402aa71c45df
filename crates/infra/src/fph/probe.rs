//! Environment probes feeding the fraud-prevention headers.
//!
//! The probe is a trait so tests (and headless environments) can inject
//! fixed values; [`SystemProbe`] reads the real operating system.

use std::net::UdpSocket;

use taxdesk_domain::{MtdError, Result};

/// Source of the machine-derived fraud-prevention values.
pub trait EnvironmentProbe: Send + Sync {
    /// Operating-system username of the current session.
    fn os_username(&self) -> Result<String>;

    /// Local timezone as `UTC±HH:MM`.
    fn timezone(&self) -> Result<String>;

    /// Local (non-loopback) IP addresses of the machine.
    fn local_ips(&self) -> Result<Vec<String>>;
}

/// Probe reading the live operating system.
#[derive(Debug, Default, Clone)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn os_username(&self) -> Result<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .map_err(|_| MtdError::FraudPrevention("OS username cannot be determined".to_string()))
    }

    fn timezone(&self) -> Result<String> {
        let offset_seconds = chrono::Local::now().offset().local_minus_utc();
        let sign = if offset_seconds < 0 { '-' } else { '+' };
        let magnitude = offset_seconds.unsigned_abs();
        Ok(format!("UTC{sign}{:02}:{:02}", magnitude / 3600, (magnitude % 3600) / 60))
    }

    fn local_ips(&self) -> Result<Vec<String>> {
        // Routing-table probe: no packet is sent, but the socket binds to
        // the interface the OS would route external traffic through.
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
            MtdError::FraudPrevention(format!("cannot determine local IP: {e}"))
        })?;
        socket.connect("198.51.100.1:443").map_err(|e| {
            MtdError::FraudPrevention(format!("cannot determine local IP: {e}"))
        })?;
        let addr = socket.local_addr().map_err(|e| {
            MtdError::FraudPrevention(format!("cannot determine local IP: {e}"))
        })?;

        Ok(vec![addr.ip().to_string()])
    }
}

/// Probe returning fixed values, for tests and headless environments.
#[derive(Debug, Clone)]
pub struct FixedProbe {
    /// Username to report.
    pub username: String,
    /// Timezone to report.
    pub timezone: String,
    /// IP addresses to report.
    pub ips: Vec<String>,
}

impl Default for FixedProbe {
    fn default() -> Self {
        Self {
            username: "taxdesk".to_string(),
            timezone: "UTC+00:00".to_string(),
            ips: vec!["10.1.2.3".to_string()],
        }
    }
}

impl EnvironmentProbe for FixedProbe {
    fn os_username(&self) -> Result<String> {
        Ok(self.username.clone())
    }

    fn timezone(&self) -> Result<String> {
        Ok(self.timezone.clone())
    }

    fn local_ips(&self) -> Result<Vec<String>> {
        if self.ips.is_empty() {
            return Err(MtdError::FraudPrevention("no local IPs available".to_string()));
        }
        Ok(self.ips.clone())
    }
}
