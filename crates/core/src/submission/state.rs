//! Client-side state machine for one (business, tax year) submission.
//!
//! The server enforces the same ordering rules; these guards exist so
//! that out-of-order operations fail fast locally instead of burning a
//! network round trip on a guaranteed rejection.

use serde::{Deserialize, Serialize};
use taxdesk_domain::constants::QUARTERS_PER_TAX_YEAR;
use taxdesk_domain::{
    BusinessId, CalculationHandle, MtdError, Quarter, Result, SubmissionPeriod, TaxCalculation,
    TaxYear,
};

/// Progress of one business/tax-year through the submission protocol.
///
/// `Declared` is terminal: a crystallised tax year accepts nothing
/// further through this flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    /// Nothing has happened yet.
    NotStarted,
    /// The business has been confirmed upstream.
    BusinessRegistered,
    /// First quarterly update accepted.
    Q1Submitted,
    /// Second quarterly update accepted.
    Q2Submitted,
    /// Third quarterly update accepted.
    Q3Submitted,
    /// Fourth quarterly update accepted.
    Q4Submitted,
    /// A calculation has been triggered and awaits retrieval.
    CalculationTriggered,
    /// The calculation has been retrieved and reviewed.
    CalculationRetrieved,
    /// The final declaration has been accepted. Terminal.
    Declared,
}

impl SubmissionState {
    /// Number of quarterly updates accepted so far.
    #[must_use]
    pub fn submitted_quarters(&self) -> u8 {
        match self {
            Self::NotStarted | Self::BusinessRegistered => 0,
            Self::Q1Submitted => 1,
            Self::Q2Submitted => 2,
            Self::Q3Submitted => 3,
            Self::Q4Submitted | Self::CalculationTriggered | Self::CalculationRetrieved
            | Self::Declared => 4,
        }
    }

    /// State after `count` accepted quarters (used when reconstructing
    /// from upstream data).
    #[must_use]
    pub fn for_accepted_quarters(count: u8) -> Self {
        match count {
            0 => Self::BusinessRegistered,
            1 => Self::Q1Submitted,
            2 => Self::Q2Submitted,
            3 => Self::Q3Submitted,
            _ => Self::Q4Submitted,
        }
    }

    /// Whether this state accepts no further operations.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declared)
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::BusinessRegistered => "business registered",
            Self::Q1Submitted => "Q1 submitted",
            Self::Q2Submitted => "Q2 submitted",
            Self::Q3Submitted => "Q3 submitted",
            Self::Q4Submitted => "Q4 submitted",
            Self::CalculationTriggered => "calculation triggered",
            Self::CalculationRetrieved => "calculation retrieved",
            Self::Declared => "declared",
        };
        f.write_str(name)
    }
}

/// Tracks and guards one business/tax-year submission.
#[derive(Debug, Clone)]
pub struct SubmissionTracker {
    business_id: BusinessId,
    tax_year: TaxYear,
    state: SubmissionState,
    last_period: Option<SubmissionPeriod>,
    calculation: Option<CalculationHandle>,
}

impl SubmissionTracker {
    /// Start tracking a business/tax-year from scratch.
    #[must_use]
    pub fn new(business_id: BusinessId, tax_year: TaxYear) -> Self {
        Self {
            business_id,
            tax_year,
            state: SubmissionState::NotStarted,
            last_period: None,
            calculation: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Tax year being tracked.
    #[must_use]
    pub fn tax_year(&self) -> TaxYear {
        self.tax_year
    }

    /// Business being tracked.
    #[must_use]
    pub fn business_id(&self) -> &BusinessId {
        &self.business_id
    }

    /// Calculation handle from the trigger step, while one is live.
    #[must_use]
    pub fn calculation(&self) -> Option<&CalculationHandle> {
        self.calculation.as_ref()
    }

    /// The next quarter due, or `None` once all four are in.
    #[must_use]
    pub fn next_quarter(&self) -> Option<Quarter> {
        Quarter::from_index(self.state.submitted_quarters() + 1)
    }

    /// Record that the business was confirmed upstream.
    ///
    /// # Errors
    /// `MtdError::State` unless the flow is at `NotStarted`.
    pub fn record_business_registered(&mut self) -> Result<()> {
        if self.state != SubmissionState::NotStarted {
            return Err(MtdError::State(format!(
                "business already registered (state: {})",
                self.state
            )));
        }
        self.state = SubmissionState::BusinessRegistered;
        Ok(())
    }

    /// Validate a candidate quarterly period against the guards without
    /// recording it.
    ///
    /// # Errors
    /// `MtdError::State` for ordering violations, a business mismatch,
    /// non-contiguous dates, or shrinking cumulative totals.
    pub fn validate_period(&self, period: &SubmissionPeriod) -> Result<Quarter> {
        if period.business_id != self.business_id {
            return Err(MtdError::State(format!(
                "period belongs to {} but this flow tracks {}",
                period.business_id, self.business_id
            )));
        }

        let quarter = match self.state {
            SubmissionState::NotStarted => {
                return Err(MtdError::State(
                    "business must be registered before submitting updates".to_string(),
                ));
            }
            SubmissionState::BusinessRegistered
            | SubmissionState::Q1Submitted
            | SubmissionState::Q2Submitted
            | SubmissionState::Q3Submitted => self
                .next_quarter()
                .ok_or_else(|| MtdError::Internal("quarter index out of range".to_string()))?,
            other => {
                return Err(MtdError::State(format!(
                    "all quarterly updates are already in (state: {other})"
                )));
            }
        };

        if let Some(previous) = &self.last_period {
            if !period.is_contiguous_with(previous) {
                return Err(MtdError::State(format!(
                    "{quarter} must start the day after the previous period ends"
                )));
            }
            if !period.totals.is_cumulative_from(&previous.totals) {
                return Err(MtdError::State(format!(
                    "{quarter} totals are lower than the previous cumulative totals"
                )));
            }
        }

        Ok(quarter)
    }

    /// Record an accepted (or already-accepted) quarterly period.
    ///
    /// # Errors
    /// Same guards as [`SubmissionTracker::validate_period`].
    pub fn record_quarter(&mut self, period: &SubmissionPeriod) -> Result<Quarter> {
        let quarter = self.validate_period(period)?;

        self.state = SubmissionState::for_accepted_quarters(quarter.index());
        self.last_period = Some(period.clone());

        Ok(quarter)
    }

    /// Record that a calculation was triggered.
    ///
    /// # Errors
    /// `MtdError::State` unless all four quarters are submitted and no
    /// declaration exists yet.
    pub fn record_calculation_triggered(&mut self, handle: CalculationHandle) -> Result<()> {
        match self.state {
            SubmissionState::Q4Submitted
            | SubmissionState::CalculationTriggered
            | SubmissionState::CalculationRetrieved => {
                self.state = SubmissionState::CalculationTriggered;
                self.calculation = Some(handle);
                Ok(())
            }
            SubmissionState::Declared => {
                Err(MtdError::State("tax year is already declared".to_string()))
            }
            other => Err(MtdError::State(format!(
                "cannot trigger a calculation before all four quarters are submitted \
                 (state: {other}, {} of {QUARTERS_PER_TAX_YEAR} quarters in)",
                other.submitted_quarters()
            ))),
        }
    }

    /// Record that the triggered calculation was retrieved.
    ///
    /// # Errors
    /// `MtdError::State` without a live trigger, or when the retrieved
    /// calculation does not match the triggered one.
    pub fn record_calculation_retrieved(&mut self, calculation: &TaxCalculation) -> Result<()> {
        let handle = match (&self.state, &self.calculation) {
            (SubmissionState::CalculationTriggered, Some(handle)) => handle,
            (SubmissionState::Declared, _) => {
                return Err(MtdError::State("tax year is already declared".to_string()));
            }
            _ => {
                return Err(MtdError::State(format!(
                    "no calculation has been triggered (state: {})",
                    self.state
                )));
            }
        };

        if calculation.calculation_id != handle.calculation_id {
            return Err(MtdError::State(
                "retrieved calculation does not match the triggered one".to_string(),
            ));
        }

        self.state = SubmissionState::CalculationRetrieved;
        Ok(())
    }

    /// The calculation eligible for declaration.
    ///
    /// # Errors
    /// `MtdError::State` unless the state is exactly
    /// `CalculationRetrieved`.
    pub fn ensure_can_declare(&self) -> Result<&CalculationHandle> {
        if self.state == SubmissionState::Declared {
            return Err(MtdError::State("tax year is already declared".to_string()));
        }
        if self.state != SubmissionState::CalculationRetrieved {
            return Err(MtdError::State(format!(
                "declaration requires a retrieved calculation (state: {})",
                self.state
            )));
        }
        self.calculation
            .as_ref()
            .ok_or_else(|| MtdError::Internal("retrieved state without a handle".to_string()))
    }

    /// Record an accepted final declaration. Terminal.
    ///
    /// # Errors
    /// Same guard as [`SubmissionTracker::ensure_can_declare`].
    pub fn record_declared(&mut self) -> Result<()> {
        self.ensure_can_declare()?;
        self.state = SubmissionState::Declared;
        self.calculation = None;
        Ok(())
    }

    /// Overwrite local progress with state reconstructed from upstream
    /// data (`count` accepted periods on file).
    pub fn resume_with_accepted_quarters(&mut self, count: u8) {
        self.state = SubmissionState::for_accepted_quarters(count);
        // Local period history is unknown after a restart; contiguity and
        // totals guards re-arm from the next accepted period.
        self.last_period = None;
        self.calculation = None;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the submission state machine.
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use taxdesk_domain::PeriodTotals;

    use super::*;

    fn business() -> BusinessId {
        BusinessId::parse("XAIS12345678901").unwrap()
    }

    fn tax_year() -> TaxYear {
        TaxYear::parse("2025-26").unwrap()
    }

    fn quarter_period(index: u8, income: Decimal, expenses: Decimal) -> SubmissionPeriod {
        let (start, end) = match index {
            1 => ((2025, 4, 6), (2025, 7, 5)),
            2 => ((2025, 7, 6), (2025, 10, 5)),
            3 => ((2025, 10, 6), (2026, 1, 5)),
            _ => ((2026, 1, 6), (2026, 4, 5)),
        };
        SubmissionPeriod {
            business_id: business(),
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            totals: PeriodTotals { income, expenses },
        }
    }

    fn handle() -> CalculationHandle {
        CalculationHandle { calculation_id: "calc-001".to_string(), tax_year: tax_year() }
    }

    fn calculation() -> TaxCalculation {
        TaxCalculation {
            calculation_id: "calc-001".to_string(),
            tax_year: tax_year(),
            total_income_tax_and_nics_due: dec!(7850.00),
            income_tax_due: Some(dec!(6150.00)),
            class4_nics_due: Some(dec!(1520.50)),
            class2_nics_due: Some(dec!(179.50)),
            taxable_income: Some(dec!(35500)),
        }
    }

    fn tracker_with_quarters(count: u8) -> SubmissionTracker {
        let mut tracker = SubmissionTracker::new(business(), tax_year());
        tracker.record_business_registered().unwrap();
        let totals = [
            (dec!(10000), dec!(2500)),
            (dec!(22000), dec!(5500)),
            (dec!(35000), dec!(9000)),
            (dec!(48000), dec!(12500)),
        ];
        for index in 1..=count {
            let (income, expenses) = totals[(index - 1) as usize];
            tracker.record_quarter(&quarter_period(index, income, expenses)).unwrap();
        }
        tracker
    }

    #[test]
    fn full_protocol_walk() {
        let mut tracker = tracker_with_quarters(4);
        assert_eq!(tracker.state(), SubmissionState::Q4Submitted);

        tracker.record_calculation_triggered(handle()).unwrap();
        assert_eq!(tracker.state(), SubmissionState::CalculationTriggered);

        tracker.record_calculation_retrieved(&calculation()).unwrap();
        assert_eq!(tracker.state(), SubmissionState::CalculationRetrieved);

        tracker.record_declared().unwrap();
        assert_eq!(tracker.state(), SubmissionState::Declared);
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn updates_require_a_registered_business() {
        let tracker = SubmissionTracker::new(business(), tax_year());
        let result = tracker.validate_period(&quarter_period(1, dec!(10000), dec!(2500)));
        assert!(matches!(result, Err(MtdError::State(_))));
    }

    #[test]
    fn quarters_are_strictly_ordered() {
        let mut tracker = tracker_with_quarters(1);

        // Skipping Q2 (submitting the Q3 window next) breaks contiguity.
        let result = tracker.record_quarter(&quarter_period(3, dec!(35000), dec!(9000)));
        assert!(matches!(result, Err(MtdError::State(_))));

        // A fifth quarter cannot exist.
        let mut full = tracker_with_quarters(4);
        let result = full.record_quarter(&quarter_period(4, dec!(50000), dec!(13000)));
        assert!(matches!(result, Err(MtdError::State(_))));
    }

    #[test]
    fn cumulative_totals_must_not_shrink() {
        let mut tracker = tracker_with_quarters(1);

        let mut q2 = quarter_period(2, dec!(9000), dec!(2000));
        let result = tracker.record_quarter(&q2);
        assert!(matches!(result, Err(MtdError::State(_))));

        q2.totals = PeriodTotals { income: dec!(22000), expenses: dec!(5500) };
        tracker.record_quarter(&q2).unwrap();
    }

    #[test]
    fn period_for_a_different_business_is_rejected() {
        let tracker = tracker_with_quarters(0);
        let mut period = quarter_period(1, dec!(10000), dec!(2500));
        period.business_id = BusinessId::parse("XAIS99999999999").unwrap();

        assert!(matches!(tracker.validate_period(&period), Err(MtdError::State(_))));
    }

    #[test]
    fn calculation_needs_all_four_quarters() {
        for count in 0..4 {
            let mut tracker = tracker_with_quarters(count);
            let result = tracker.record_calculation_triggered(handle());
            assert!(
                matches!(result, Err(MtdError::State(_))),
                "calculation allowed with {count} quarters"
            );
        }
    }

    #[test]
    fn calculation_can_be_retriggered_before_declaration() {
        let mut tracker = tracker_with_quarters(4);
        tracker.record_calculation_triggered(handle()).unwrap();
        tracker.record_calculation_retrieved(&calculation()).unwrap();

        // Amended figures: trigger again, superseding the old handle.
        let new_handle =
            CalculationHandle { calculation_id: "calc-002".to_string(), tax_year: tax_year() };
        tracker.record_calculation_triggered(new_handle).unwrap();
        assert_eq!(tracker.state(), SubmissionState::CalculationTriggered);
    }

    #[test]
    fn retrieval_must_match_the_triggered_calculation() {
        let mut tracker = tracker_with_quarters(4);
        tracker.record_calculation_triggered(handle()).unwrap();

        let mut other = calculation();
        other.calculation_id = "calc-999".to_string();

        assert!(matches!(
            tracker.record_calculation_retrieved(&other),
            Err(MtdError::State(_))
        ));
    }

    #[test]
    fn declaration_requires_a_retrieved_calculation() {
        // Every state before CalculationRetrieved refuses to declare.
        let mut tracker = tracker_with_quarters(4);
        assert!(tracker.ensure_can_declare().is_err());

        tracker.record_calculation_triggered(handle()).unwrap();
        assert!(tracker.ensure_can_declare().is_err());

        tracker.record_calculation_retrieved(&calculation()).unwrap();
        assert!(tracker.ensure_can_declare().is_ok());
    }

    #[test]
    fn declared_is_terminal() {
        let mut tracker = tracker_with_quarters(4);
        tracker.record_calculation_triggered(handle()).unwrap();
        tracker.record_calculation_retrieved(&calculation()).unwrap();
        tracker.record_declared().unwrap();

        assert!(matches!(tracker.record_declared(), Err(MtdError::State(_))));
        assert!(matches!(tracker.record_calculation_triggered(handle()), Err(MtdError::State(_))));
        assert!(matches!(
            tracker.record_quarter(&quarter_period(1, dec!(1), dec!(0))),
            Err(MtdError::State(_))
        ));
    }

    #[test]
    fn resume_maps_accepted_period_counts_onto_states() {
        let mut tracker = SubmissionTracker::new(business(), tax_year());

        tracker.resume_with_accepted_quarters(0);
        assert_eq!(tracker.state(), SubmissionState::BusinessRegistered);

        tracker.resume_with_accepted_quarters(2);
        assert_eq!(tracker.state(), SubmissionState::Q2Submitted);
        assert_eq!(tracker.next_quarter(), Some(Quarter::Q3));

        tracker.resume_with_accepted_quarters(4);
        assert_eq!(tracker.state(), SubmissionState::Q4Submitted);
        assert_eq!(tracker.next_quarter(), None);
    }
}
