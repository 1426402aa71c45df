//! # TaxDesk Core
//!
//! Business orchestration for the MTD submission protocol: the per
//! (business, tax year) state machine, the gateway port it drives, and
//! the flow service that walks a tax year from business registration
//! through four quarterly updates to calculation and final declaration.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod submission;

pub use submission::flow::{PollSettings, SubmissionFlow};
pub use submission::ports::{DeclarationSink, SubmissionGateway};
pub use submission::state::{SubmissionState, SubmissionTracker};
