//! Port interfaces for the submission flow.
//!
//! `SubmissionGateway` is implemented by the HTTP adapter in the infra
//! crate; `DeclarationSink` is implemented by the (out-of-scope)
//! persistence/audit collaborator. Both are injected so the flow is
//! testable without a network or a database.

use async_trait::async_trait;
use taxdesk_domain::{
    BusinessDetails, BusinessId, CalculationHandle, DeclarationRecord, Nino, PeriodSummary,
    QuarterlyOutcome, Result, SubmissionPeriod, TaxCalculation, TaxYear,
};

/// Client-side view of the MTD resource API.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// List the businesses registered for a taxpayer.
    async fn list_businesses(&self, nino: &Nino) -> Result<Vec<BusinessDetails>>;

    /// Fetch one business by id.
    async fn get_business(&self, nino: &Nino, business_id: &BusinessId)
        -> Result<BusinessDetails>;

    /// List periods already accepted upstream for a business/tax-year.
    ///
    /// Used to reconstruct submission state after a restart instead of
    /// trusting local state.
    async fn list_periods(
        &self,
        nino: &Nino,
        business_id: &BusinessId,
        tax_year: &TaxYear,
    ) -> Result<Vec<PeriodSummary>>;

    /// Submit one cumulative quarterly update.
    ///
    /// A repeat submission of an already-accepted period yields
    /// `QuarterlyOutcome::AlreadySubmitted`, not an error.
    async fn submit_quarterly_update(
        &self,
        nino: &Nino,
        business_id: &BusinessId,
        period: &SubmissionPeriod,
    ) -> Result<QuarterlyOutcome>;

    /// Trigger a tax calculation. Returns immediately; the server
    /// computes asynchronously and callers poll for the result.
    async fn trigger_calculation(&self, nino: &Nino, tax_year: &TaxYear)
        -> Result<CalculationHandle>;

    /// Retrieve a calculation, or `None` while the server is still
    /// computing it.
    async fn get_calculation(
        &self,
        nino: &Nino,
        handle: &CalculationHandle,
    ) -> Result<Option<TaxCalculation>>;

    /// Submit the final declaration (crystallisation) for a tax year.
    async fn submit_final_declaration(
        &self,
        nino: &Nino,
        tax_year: &TaxYear,
        calculation_id: &str,
    ) -> Result<DeclarationRecord>;
}

/// Receiver of accepted declaration records.
#[async_trait]
pub trait DeclarationSink: Send + Sync {
    /// Record an accepted declaration. Called exactly once per accepted
    /// declaration, after server acceptance.
    async fn record_declaration(
        &self,
        nino: &Nino,
        tax_year: &TaxYear,
        record: &DeclarationRecord,
    ) -> Result<()>;
}
