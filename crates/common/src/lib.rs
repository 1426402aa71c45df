//! Shared infrastructure for the TaxDesk MTD integration core.
//!
//! - `auth`: OAuth2 client, encrypted token store, and session manager
//! - `crypto`: AES-256-GCM encryption primitives
//! - `retry`: bounded exponential backoff with jitter, driven by a policy
//!   object

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod crypto;
pub mod retry;
