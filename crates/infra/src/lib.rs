//! # TaxDesk Infra
//!
//! Outward-facing adapters for the MTD integration core:
//! - `http`: reqwest wrapper with transport-level retry
//! - `fph`: mandatory fraud-prevention header assembly
//! - `mtd`: the HMRC submission gateway (implements the core port)
//! - `config`: environment-first configuration loading

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod errors;
pub mod fph;
pub mod http;
pub mod mtd;

pub use fph::{DeviceIdentity, EnvironmentProbe, FraudPreventionProvider, SystemProbe};
pub use http::HttpClient;
pub use mtd::MtdGateway;
