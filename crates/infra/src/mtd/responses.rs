//! Wire DTOs for the MTD resource API.
//!
//! Kept separate from the domain types: the wire shapes follow the
//! upstream camelCase contract and are converted at the gateway
//! boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use taxdesk_domain::{
    BusinessDetails, BusinessId, DeclarationRecord, MtdError, PeriodSummary, Result,
    SubmissionPeriod, TaxCalculation, TaxYear,
};

/// Upstream error body: `{ "code": "...", "message": "..." }`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListBusinessesResponse {
    pub business_details: Vec<BusinessDetailsDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BusinessDetailsDto {
    pub business_id: String,
    pub type_of_business: String,
    pub trading_name: Option<String>,
    pub accounting_period_start_date: Option<NaiveDate>,
    pub accounting_period_end_date: Option<NaiveDate>,
}

impl BusinessDetailsDto {
    pub(crate) fn into_domain(self) -> Result<BusinessDetails> {
        Ok(BusinessDetails {
            business_id: BusinessId::parse(&self.business_id)?,
            type_of_business: self.type_of_business,
            trading_name: self.trading_name,
            accounting_period_start: self.accounting_period_start_date,
            accounting_period_end: self.accounting_period_end_date,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PeriodsResponse {
    pub periods: Vec<PeriodDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PeriodDto {
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
}

impl From<PeriodDto> for PeriodSummary {
    fn from(dto: PeriodDto) -> Self {
        Self { start: dto.period_start_date, end: dto.period_end_date }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitPeriodRequest {
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub period_income: Decimal,
    pub period_expenses: Decimal,
}

impl From<&SubmissionPeriod> for SubmitPeriodRequest {
    fn from(period: &SubmissionPeriod) -> Self {
        Self {
            period_start_date: period.start,
            period_end_date: period.end,
            period_income: period.totals.income,
            period_expenses: period.totals.expenses,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitPeriodResponse {
    pub submission_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerCalculationResponse {
    pub calculation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalculationResponse {
    pub calculation_id: String,
    pub total_income_tax_and_nics_due: Decimal,
    pub income_tax_due: Option<Decimal>,
    pub class4_nics_due: Option<Decimal>,
    pub class2_nics_due: Option<Decimal>,
    pub taxable_income: Option<Decimal>,
}

impl CalculationResponse {
    pub(crate) fn into_domain(self, tax_year: TaxYear) -> TaxCalculation {
        TaxCalculation {
            calculation_id: self.calculation_id,
            tax_year,
            total_income_tax_and_nics_due: self.total_income_tax_and_nics_due,
            income_tax_due: self.income_tax_due,
            class4_nics_due: self.class4_nics_due,
            class2_nics_due: self.class2_nics_due,
            taxable_income: self.taxable_income,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinalDeclarationResponse {
    pub charge_reference: String,
    pub processing_date: DateTime<Utc>,
}

impl FinalDeclarationResponse {
    pub(crate) fn into_domain(self, calculation_id: &str) -> DeclarationRecord {
        DeclarationRecord {
            calculation_id: calculation_id.to_string(),
            declared_at: self.processing_date,
            charge_reference: self.charge_reference,
        }
    }
}

pub(crate) fn malformed(endpoint: &str, err: impl std::fmt::Display) -> MtdError {
    MtdError::Internal(format!("malformed {endpoint} response: {err}"))
}
