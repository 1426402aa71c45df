//! Fraud-prevention header assembly.
//!
//! HMRC rejects any request missing one of the mandatory `Gov-*` headers
//! with a 400, so construction is all-or-nothing: every value must be
//! determinable or assembly fails before a network call is attempted.

pub mod device;
pub mod headers;
pub mod probe;

pub use device::DeviceIdentity;
pub use headers::{FraudPreventionHeaders, FraudPreventionProvider, MANDATORY_HEADERS};
pub use probe::{EnvironmentProbe, FixedProbe, SystemProbe};
