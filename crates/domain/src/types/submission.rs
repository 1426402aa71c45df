//! Submission-protocol data types.
//!
//! These types are produced by the (out-of-scope) calculation engine and
//! transported to HMRC verbatim: in particular, whether Class 2 NI is
//! credited or payable is decided upstream and never reinterpreted here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::identifiers::{BusinessId, TaxYear};

/// Quarter index within a tax year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    /// First quarterly update of the tax year.
    Q1,
    /// Second quarterly update.
    Q2,
    /// Third quarterly update.
    Q3,
    /// Fourth and final quarterly update.
    Q4,
}

impl Quarter {
    /// One-based index of this quarter.
    #[must_use]
    pub fn index(&self) -> u8 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    /// Quarter for a one-based index, if in range.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::Q1),
            2 => Some(Self::Q2),
            3 => Some(Self::Q3),
            4 => Some(Self::Q4),
            _ => None,
        }
    }

    /// The quarter following this one, or `None` after Q4.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.index())
    }
}

/// Cumulative income and expense totals for the tax year to date.
///
/// Later periods carry running totals, not per-quarter deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    /// Cumulative income for the tax year to date.
    pub income: Decimal,
    /// Cumulative expenses for the tax year to date.
    pub expenses: Decimal,
}

impl PeriodTotals {
    /// Whether `self` is a valid cumulative successor to `previous`.
    #[must_use]
    pub fn is_cumulative_from(&self, previous: &PeriodTotals) -> bool {
        self.income >= previous.income && self.expenses >= previous.expenses
    }
}

/// One quarterly update: a business, a date range, and cumulative totals.
///
/// Periods for one business/tax-year are contiguous, non-overlapping, and
/// strictly cumulative; each period is submitted at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPeriod {
    /// Business the update belongs to.
    pub business_id: BusinessId,
    /// First day covered by the update.
    pub start: NaiveDate,
    /// Last day covered by the update.
    pub end: NaiveDate,
    /// Running totals for the tax year to date.
    pub totals: PeriodTotals,
}

impl SubmissionPeriod {
    /// Whether `self` starts the day after `previous` ends.
    #[must_use]
    pub fn is_contiguous_with(&self, previous: &SubmissionPeriod) -> bool {
        previous.end.succ_opt().is_some_and(|next_day| self.start == next_day)
    }
}

/// An already-accepted period as reported by the upstream API.
///
/// Used to reconstruct submission state after a restart instead of
/// trusting local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// First day covered by the accepted period.
    pub start: NaiveDate,
    /// Last day covered by the accepted period.
    pub end: NaiveDate,
}

/// Outcome of a quarterly update submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarterlyOutcome {
    /// The update was accepted; the server assigned an opaque id.
    Accepted {
        /// Opaque submission identifier assigned by the server.
        submission_id: String,
    },
    /// The period had already been accepted earlier. Idempotent success.
    AlreadySubmitted,
}

/// Ephemeral link between a calculation trigger and its retrieval.
///
/// Never persisted beyond the session that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationHandle {
    /// Server-assigned calculation identifier.
    pub calculation_id: String,
    /// Tax year the calculation covers.
    pub tax_year: TaxYear,
}

/// A retrieved tax calculation breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculation {
    /// Server-assigned calculation identifier.
    pub calculation_id: String,
    /// Tax year the calculation covers.
    pub tax_year: TaxYear,
    /// Total income tax and National Insurance contributions due.
    pub total_income_tax_and_nics_due: Decimal,
    /// Income tax component.
    pub income_tax_due: Option<Decimal>,
    /// Class 4 National Insurance component.
    pub class4_nics_due: Option<Decimal>,
    /// Class 2 National Insurance component, as reported upstream.
    pub class2_nics_due: Option<Decimal>,
    /// Total taxable income the calculation is based on.
    pub taxable_income: Option<Decimal>,
}

/// Terminal audit artifact of the flow: an accepted final declaration.
///
/// Immutable once accepted; the charge reference is assigned only on
/// server acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    /// Calculation the declaration finalizes.
    pub calculation_id: String,
    /// Server-asserted acceptance timestamp (UTC).
    pub declared_at: DateTime<Utc>,
    /// Charge reference assigned on acceptance.
    pub charge_reference: String,
}

/// Business details returned by the lookup endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDetails {
    /// Validated business identifier.
    pub business_id: BusinessId,
    /// Business type as reported upstream (e.g. "self-employment").
    pub type_of_business: String,
    /// Trading name, when one is registered.
    pub trading_name: Option<String>,
    /// Start of the accounting period, when reported.
    pub accounting_period_start: Option<NaiveDate>,
    /// End of the accounting period, when reported.
    pub accounting_period_end: Option<NaiveDate>,
}
