//! Orchestration of one tax year's submission flow.
//!
//! `SubmissionFlow` drives the protocol through the gateway port while the
//! tracker guards ordering. Operations are serialized per flow instance;
//! the calculation poll supports caller-initiated cancellation without
//! touching OAuth session state.

use std::sync::Arc;
use std::time::Duration;

use taxdesk_domain::constants::{
    DEFAULT_CALCULATION_POLL_ATTEMPTS, DEFAULT_CALCULATION_POLL_INTERVAL,
};
use taxdesk_domain::{
    BusinessDetails, BusinessId, CalculationHandle, DeclarationRecord, MtdError, Nino,
    QuarterlyOutcome, Result, SubmissionPeriod, TaxCalculation, TaxYear,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ports::{DeclarationSink, SubmissionGateway};
use super::state::{SubmissionState, SubmissionTracker};

/// Calculation polling settings.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between readiness polls.
    pub interval: Duration,
    /// Bound on readiness polls before the wait is abandoned.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CALCULATION_POLL_INTERVAL,
            max_attempts: DEFAULT_CALCULATION_POLL_ATTEMPTS,
        }
    }
}

/// Walks one (business, tax year) through the submission protocol.
pub struct SubmissionFlow<G: SubmissionGateway, D: DeclarationSink> {
    gateway: Arc<G>,
    sink: Arc<D>,
    nino: Nino,
    // One protocol step at a time per flow; guards and records stay
    // consistent with the network call between them.
    tracker: Mutex<SubmissionTracker>,
    poll: PollSettings,
}

impl<G: SubmissionGateway, D: DeclarationSink> SubmissionFlow<G, D> {
    /// Create a flow for one business and tax year.
    pub fn new(
        gateway: Arc<G>,
        sink: Arc<D>,
        nino: Nino,
        business_id: BusinessId,
        tax_year: TaxYear,
    ) -> Self {
        Self {
            gateway,
            sink,
            nino,
            tracker: Mutex::new(SubmissionTracker::new(business_id, tax_year)),
            poll: PollSettings::default(),
        }
    }

    /// Override the calculation polling settings.
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Current protocol state.
    pub async fn state(&self) -> SubmissionState {
        self.tracker.lock().await.state()
    }

    /// Reconstruct protocol state from upstream records.
    ///
    /// Local state may be stale or lost after a restart, so the accepted
    /// periods on file upstream are authoritative for how many quarters
    /// are in.
    ///
    /// # Errors
    /// Propagates gateway failures; a business not found upstream leaves
    /// the flow at `NotStarted`.
    #[instrument(skip(self), fields(nino = %self.nino))]
    pub async fn resume(&self) -> Result<SubmissionState> {
        let mut tracker = self.tracker.lock().await;

        let business = match self.gateway.get_business(&self.nino, tracker.business_id()).await {
            Ok(details) => details,
            Err(MtdError::NotFound(_)) => {
                debug!("business not registered upstream; flow starts fresh");
                return Ok(tracker.state());
            }
            Err(err) => return Err(err),
        };

        let tax_year = tracker.tax_year();
        let periods =
            self.gateway.list_periods(&self.nino, &business.business_id, &tax_year).await?;

        let accepted = periods.len().min(4) as u8;
        tracker.resume_with_accepted_quarters(accepted);

        info!(accepted_quarters = accepted, state = %tracker.state(), "submission state reconstructed from upstream");
        Ok(tracker.state())
    }

    /// Confirm the business upstream and mark it registered.
    ///
    /// # Errors
    /// Propagates gateway failures and ordering violations.
    #[instrument(skip(self), fields(nino = %self.nino))]
    pub async fn register_business(&self) -> Result<BusinessDetails> {
        let mut tracker = self.tracker.lock().await;

        let details = self.gateway.get_business(&self.nino, tracker.business_id()).await?;
        tracker.record_business_registered()?;

        info!(business_id = %details.business_id, "business registered for submission");
        Ok(details)
    }

    /// Submit the next cumulative quarterly update.
    ///
    /// An upstream duplicate conflict is surfaced as
    /// [`QuarterlyOutcome::AlreadySubmitted`] and advances the state just
    /// like an acceptance: the period is on file either way.
    ///
    /// # Errors
    /// Guard violations (`MtdError::State`) and gateway failures.
    #[instrument(skip(self, period), fields(nino = %self.nino))]
    pub async fn submit_quarter(&self, period: SubmissionPeriod) -> Result<QuarterlyOutcome> {
        let mut tracker = self.tracker.lock().await;

        let quarter = tracker.validate_period(&period)?;

        let outcome = self
            .gateway
            .submit_quarterly_update(&self.nino, tracker.business_id(), &period)
            .await?;

        tracker.record_quarter(&period)?;

        match &outcome {
            QuarterlyOutcome::Accepted { submission_id } => {
                info!(%quarter, submission_id, "quarterly update accepted");
            }
            QuarterlyOutcome::AlreadySubmitted => {
                warn!(%quarter, "quarterly update was already on file; treated as submitted");
            }
        }

        Ok(outcome)
    }

    /// Trigger the tax calculation for the year.
    ///
    /// # Errors
    /// `MtdError::State` before all four quarters are in; gateway
    /// failures propagate.
    #[instrument(skip(self), fields(nino = %self.nino))]
    pub async fn trigger_calculation(&self) -> Result<CalculationHandle> {
        let mut tracker = self.tracker.lock().await;

        if tracker.state().submitted_quarters() < 4 {
            return Err(MtdError::State(format!(
                "cannot trigger a calculation with {} of 4 quarters submitted",
                tracker.state().submitted_quarters()
            )));
        }

        let tax_year = tracker.tax_year();
        let handle = self.gateway.trigger_calculation(&self.nino, &tax_year).await?;
        tracker.record_calculation_triggered(handle.clone())?;

        info!(calculation_id = %handle.calculation_id, "calculation triggered");
        Ok(handle)
    }

    /// Poll until the triggered calculation is ready, honoring
    /// cancellation.
    ///
    /// Cancellation aborts the wait cleanly: session state and tracker
    /// state are untouched and a later call can resume polling.
    ///
    /// # Errors
    /// `MtdError::Cancelled` when the token fires; `MtdError::Unavailable`
    /// when the poll bound is exhausted; gateway failures propagate.
    #[instrument(skip(self, cancel), fields(nino = %self.nino))]
    pub async fn await_calculation(&self, cancel: &CancellationToken) -> Result<TaxCalculation> {
        let handle = {
            let tracker = self.tracker.lock().await;
            tracker
                .calculation()
                .cloned()
                .ok_or_else(|| MtdError::State("no calculation has been triggered".to_string()))?
        };

        for attempt in 1..=self.poll.max_attempts {
            if cancel.is_cancelled() {
                debug!("calculation poll cancelled by caller");
                return Err(MtdError::Cancelled);
            }

            if let Some(calculation) = self.gateway.get_calculation(&self.nino, &handle).await? {
                let mut tracker = self.tracker.lock().await;
                tracker.record_calculation_retrieved(&calculation)?;
                info!(
                    calculation_id = %calculation.calculation_id,
                    "calculation retrieved"
                );
                return Ok(calculation);
            }

            debug!(attempt, "calculation not ready yet");

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("calculation poll cancelled while waiting");
                    return Err(MtdError::Cancelled);
                }
                () = tokio::time::sleep(self.poll.interval) => {}
            }
        }

        Err(MtdError::Unavailable(format!(
            "calculation {} was not ready after {} polls",
            handle.calculation_id, self.poll.max_attempts
        )))
    }

    /// Submit the final declaration and emit the accepted record to the
    /// audit sink. Terminal for the tax year.
    ///
    /// # Errors
    /// `MtdError::State` before the calculation has been retrieved;
    /// gateway and sink failures propagate.
    #[instrument(skip(self), fields(nino = %self.nino))]
    pub async fn submit_final_declaration(&self) -> Result<DeclarationRecord> {
        let mut tracker = self.tracker.lock().await;

        let calculation_id = tracker.ensure_can_declare()?.calculation_id.clone();
        let tax_year = tracker.tax_year();

        let record = self
            .gateway
            .submit_final_declaration(&self.nino, &tax_year, &calculation_id)
            .await?;

        self.sink.record_declaration(&self.nino, &tax_year, &record).await?;
        tracker.record_declared()?;

        info!(
            charge_reference = %record.charge_reference,
            declared_at = %record.declared_at,
            "final declaration accepted"
        );
        Ok(record)
    }
}
