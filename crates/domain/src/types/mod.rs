//! Common data types used throughout the MTD integration layer.

pub mod identifiers;
pub mod submission;

pub use identifiers::{BusinessId, Nino, TaxYear};
pub use submission::{
    BusinessDetails, CalculationHandle, DeclarationRecord, PeriodSummary, PeriodTotals, Quarter,
    QuarterlyOutcome, SubmissionPeriod, TaxCalculation,
};
