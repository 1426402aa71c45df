//! Stable per-installation device identity.
//!
//! The device id must survive restarts and is independent of user
//! identity: a UUID generated once per installation and persisted to a
//! small file next to the application configuration.

use std::path::{Path, PathBuf};

use taxdesk_domain::{MtdError, Result};
use tracing::debug;
use uuid::Uuid;

/// Per-installation device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: Uuid,
}

impl DeviceIdentity {
    /// Load the device id from `path`, generating and persisting a new
    /// one when the file does not exist yet.
    ///
    /// # Errors
    /// `MtdError::FraudPrevention` when the file cannot be read, parsed,
    /// or written; a device id is mandatory, so there is no fallback.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let id = Uuid::parse_str(contents.trim()).map_err(|_| {
                    MtdError::FraudPrevention(format!(
                        "device id file {} is not a valid UUID",
                        path.display()
                    ))
                })?;
                Ok(Self { id })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::create_at(&path),
            Err(e) => Err(MtdError::FraudPrevention(format!(
                "cannot read device id file {}: {e}",
                path.display()
            ))),
        }
    }

    /// The identifier value.
    #[must_use]
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    fn create_at(path: &Path) -> Result<Self> {
        let id = Uuid::new_v4();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MtdError::FraudPrevention(format!(
                    "cannot create device id directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        std::fs::write(path, id.to_string()).map_err(|e| {
            MtdError::FraudPrevention(format!(
                "cannot persist device id to {}: {e}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "generated new device identity");
        Ok(Self { id })
    }
}
