//! HTTP gateway for the MTD resource API.
//!
//! Composes the OAuth session, the fraud-prevention provider, and the
//! bounded-retry policy. Every outbound request carries the bearer token,
//! the nine fraud-prevention headers, and the versioned Accept header;
//! fraud-header assembly failures abort before any network traffic.
//!
//! Status policy per logical call: a 401 gets exactly one
//! refresh-and-retry; transient classes (429, 5xx, transport) go through
//! the `RetryStrategy`; everything else is terminal and maps onto the
//! domain taxonomy. NINOs appear only masked in trace output.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use taxdesk_common::auth::{AuthorizationFlow, TokenManager, TokenStore};
use taxdesk_common::retry::RetryStrategy;
use taxdesk_core::SubmissionGateway;
use taxdesk_domain::constants::HMRC_ACCEPT_HEADER;
use taxdesk_domain::{
    AuthError, BusinessDetails, BusinessId, CalculationHandle, ConflictKind, DeclarationRecord,
    MtdError, Nino, PeriodSummary, QuarterlyOutcome, Result, SubmissionPeriod, TaxCalculation,
    TaxYear, ValidationKind,
};
use tracing::{debug, info, instrument};

use super::responses::{
    malformed, ApiErrorBody, CalculationResponse, FinalDeclarationResponse, ListBusinessesResponse,
    PeriodsResponse, SubmitPeriodRequest, SubmitPeriodResponse, TriggerCalculationResponse,
};
use crate::fph::{FraudPreventionHeaders, FraudPreventionProvider};
use crate::http::HttpClient;

/// Client for the MTD resource API. Implements the core
/// [`SubmissionGateway`] port.
pub struct MtdGateway<F: AuthorizationFlow, S: TokenStore> {
    http: HttpClient,
    base_url: String,
    tokens: Arc<TokenManager<F, S>>,
    fraud: Arc<FraudPreventionProvider>,
    retry: RetryStrategy,
}

impl<F: AuthorizationFlow, S: TokenStore> MtdGateway<F, S> {
    /// Start building a gateway.
    pub fn builder() -> MtdGatewayBuilder<F, S> {
        MtdGatewayBuilder::default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// One logical call: request, map, parse. Wrapped in the retry policy
    /// so transient failures re-run the whole thing (including a fresh
    /// token fetch and fresh fraud headers).
    async fn request_json<T: DeserializeOwned>(
        &self,
        name: &'static str,
        method: Method,
        url: String,
        body: Option<Value>,
        conflict: ConflictKind,
    ) -> Result<T> {
        self.retry
            .run(name, move |_attempt| {
                let method = method.clone();
                let url = url.clone();
                let body = body.clone();
                async move {
                    let response = self.send_once(&method, &url, body.as_ref()).await?;
                    if !response.status().is_success() {
                        return Err(Self::map_error_response(response, conflict).await);
                    }
                    response.json::<T>().await.map_err(|e| malformed(name, e))
                }
            })
            .await
    }

    /// Send with at most one token-refresh-and-retry on a 401.
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        // All nine fraud headers must resolve before any traffic.
        let fraud_headers = self.fraud.headers()?;
        let token = self.tokens.access_token().await?;

        let response = self.execute(method, url, body, &fraud_headers, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("access token rejected upstream; refreshing once");
        self.tokens.refresh_after_auth_failure(&token).await?;
        let token = self.tokens.access_token().await?;

        let retried = self.execute(method, url, body, &fraud_headers, &token).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            // The refreshed token was rejected too; surfacing terminally
            // rather than looping.
            return Err(AuthError::NotAuthenticated.into());
        }
        Ok(retried)
    }

    async fn execute(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        fraud_headers: &FraudPreventionHeaders,
        token: &str,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(header::ACCEPT, HMRC_ACCEPT_HEADER)
            .bearer_auth(token);

        for (name, value) in fraud_headers.pairs() {
            request = request.header(*name, value);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        self.http.send(request).await
    }

    async fn map_error_response(response: Response, conflict: ConflictKind) -> MtdError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body: ApiErrorBody = response
            .json()
            .await
            .unwrap_or(ApiErrorBody { code: None, message: None });
        let message =
            body.message.unwrap_or_else(|| format!("upstream returned status {status}"));

        match status.as_u16() {
            400 => MtdError::BadRequest(message),
            403 => MtdError::Forbidden,
            404 => MtdError::NotFound(message),
            409 => MtdError::Conflict(conflict),
            422 => {
                let code = body.code.unwrap_or_default();
                if code.contains("INCOMPLETE") {
                    MtdError::Validation(ValidationKind::IncompleteSubmission)
                } else {
                    MtdError::Validation(ValidationKind::MalformedRequest(message))
                }
            }
            429 => MtdError::RateLimited { retry_after_secs: retry_after },
            503 => MtdError::Unavailable(message),
            _ if status.is_server_error() => MtdError::ServerError(message),
            _ => MtdError::Internal(format!("unexpected status {status}: {message}")),
        }
    }
}

#[async_trait]
impl<F: AuthorizationFlow, S: TokenStore> SubmissionGateway for MtdGateway<F, S> {
    #[instrument(skip_all, fields(nino = %nino))]
    async fn list_businesses(&self, nino: &Nino) -> Result<Vec<BusinessDetails>> {
        let url = self.url(&format!("/individuals/business/details/{}/list", nino.as_str()));

        let response: ListBusinessesResponse = self
            .request_json(
                "list_businesses",
                Method::GET,
                url,
                None,
                ConflictKind::DuplicateSubmission,
            )
            .await?;

        let businesses = response
            .business_details
            .into_iter()
            .map(|dto| dto.into_domain())
            .collect::<Result<Vec<_>>>()?;

        info!(count = businesses.len(), "businesses listed");
        Ok(businesses)
    }

    #[instrument(skip_all, fields(nino = %nino, business_id = %business_id))]
    async fn get_business(
        &self,
        nino: &Nino,
        business_id: &BusinessId,
    ) -> Result<BusinessDetails> {
        let url = self.url(&format!(
            "/individuals/business/details/{}/{}",
            nino.as_str(),
            business_id.as_str()
        ));

        let dto: super::responses::BusinessDetailsDto = self
            .request_json("get_business", Method::GET, url, None, ConflictKind::DuplicateSubmission)
            .await?;

        dto.into_domain()
    }

    #[instrument(skip_all, fields(nino = %nino, business_id = %business_id, tax_year = %tax_year))]
    async fn list_periods(
        &self,
        nino: &Nino,
        business_id: &BusinessId,
        tax_year: &TaxYear,
    ) -> Result<Vec<PeriodSummary>> {
        let url = self.url(&format!(
            "/individuals/business/self-employment/{}/{}/periods/{}",
            nino.as_str(),
            business_id.as_str(),
            tax_year
        ));

        let response: Result<PeriodsResponse> = self
            .request_json("list_periods", Method::GET, url, None, ConflictKind::DuplicateSubmission)
            .await;

        match response {
            Ok(periods) => Ok(periods.periods.into_iter().map(Into::into).collect()),
            // No periods resource yet means nothing has been submitted.
            Err(MtdError::NotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(nino = %nino, business_id = %business_id))]
    async fn submit_quarterly_update(
        &self,
        nino: &Nino,
        business_id: &BusinessId,
        period: &SubmissionPeriod,
    ) -> Result<QuarterlyOutcome> {
        let url = self.url(&format!(
            "/individuals/business/self-employment/{}/{}/periods",
            nino.as_str(),
            business_id.as_str()
        ));
        let body = serde_json::to_value(SubmitPeriodRequest::from(period))
            .map_err(|e| MtdError::Internal(format!("period serialization failed: {e}")))?;

        let result: Result<SubmitPeriodResponse> = self
            .request_json(
                "submit_quarterly_update",
                Method::POST,
                url,
                Some(body),
                ConflictKind::DuplicateSubmission,
            )
            .await;

        match result {
            Ok(response) => {
                info!(submission_id = %response.submission_id, "quarterly update accepted");
                Ok(QuarterlyOutcome::Accepted { submission_id: response.submission_id })
            }
            // The server already holds this period: an idempotent success,
            // never something to retry.
            Err(MtdError::Conflict(ConflictKind::DuplicateSubmission)) => {
                info!("quarterly update already on file");
                Ok(QuarterlyOutcome::AlreadySubmitted)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(nino = %nino, tax_year = %tax_year))]
    async fn trigger_calculation(
        &self,
        nino: &Nino,
        tax_year: &TaxYear,
    ) -> Result<CalculationHandle> {
        let url = self.url(&format!(
            "/individuals/calculations/{}/self-assessment/{}/trigger",
            nino.as_str(),
            tax_year
        ));

        let response: TriggerCalculationResponse = self
            .request_json(
                "trigger_calculation",
                Method::POST,
                url,
                Some(Value::Object(serde_json::Map::new())),
                ConflictKind::DuplicateSubmission,
            )
            .await?;

        info!(calculation_id = %response.calculation_id, "calculation triggered");
        Ok(CalculationHandle { calculation_id: response.calculation_id, tax_year: *tax_year })
    }

    #[instrument(skip_all, fields(nino = %nino, calculation_id = %handle.calculation_id))]
    async fn get_calculation(
        &self,
        nino: &Nino,
        handle: &CalculationHandle,
    ) -> Result<Option<TaxCalculation>> {
        let url = self.url(&format!(
            "/individuals/calculations/{}/self-assessment/{}",
            nino.as_str(),
            handle.calculation_id
        ));
        let tax_year = handle.tax_year;

        self.retry
            .run("get_calculation", move |_attempt| {
                let url = url.clone();
                async move {
                    let response = self.send_once(&Method::GET, &url, None).await?;

                    match response.status() {
                        // Still computing server-side; the caller polls.
                        StatusCode::ACCEPTED | StatusCode::NOT_FOUND => {
                            debug!("calculation not ready yet");
                            Ok(None)
                        }
                        status if status.is_success() => {
                            let parsed: CalculationResponse = response
                                .json()
                                .await
                                .map_err(|e| malformed("get_calculation", e))?;
                            Ok(Some(parsed.into_domain(tax_year)))
                        }
                        _ => Err(Self::map_error_response(
                            response,
                            ConflictKind::DuplicateSubmission,
                        )
                        .await),
                    }
                }
            })
            .await
    }

    #[instrument(skip_all, fields(nino = %nino, tax_year = %tax_year, calculation_id = %calculation_id))]
    async fn submit_final_declaration(
        &self,
        nino: &Nino,
        tax_year: &TaxYear,
        calculation_id: &str,
    ) -> Result<DeclarationRecord> {
        let url = self.url(&format!(
            "/individuals/calculations/{}/self-assessment/{}/{}/final-declaration",
            nino.as_str(),
            tax_year,
            calculation_id
        ));

        let response: FinalDeclarationResponse = self
            .request_json(
                "submit_final_declaration",
                Method::POST,
                url,
                Some(Value::Object(serde_json::Map::new())),
                ConflictKind::AlreadyDeclared,
            )
            .await?;

        let record = response.into_domain(calculation_id);
        info!(
            charge_reference = %record.charge_reference,
            declared_at = %record.declared_at,
            "final declaration accepted"
        );
        Ok(record)
    }
}

/// Builder for [`MtdGateway`].
pub struct MtdGatewayBuilder<F: AuthorizationFlow, S: TokenStore> {
    base_url: Option<String>,
    tokens: Option<Arc<TokenManager<F, S>>>,
    fraud: Option<Arc<FraudPreventionProvider>>,
    retry: RetryStrategy,
    http: Option<HttpClient>,
}

impl<F: AuthorizationFlow, S: TokenStore> Default for MtdGatewayBuilder<F, S> {
    fn default() -> Self {
        Self {
            base_url: None,
            tokens: None,
            fraud: None,
            retry: RetryStrategy::transient_api_policy(),
            http: None,
        }
    }
}

impl<F: AuthorizationFlow, S: TokenStore> MtdGatewayBuilder<F, S> {
    /// Resource API base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// OAuth session manager supplying bearer tokens.
    #[must_use]
    pub fn tokens(mut self, tokens: Arc<TokenManager<F, S>>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Fraud-prevention header provider.
    #[must_use]
    pub fn fraud_prevention(mut self, fraud: Arc<FraudPreventionProvider>) -> Self {
        self.fraud = Some(fraud);
        self
    }

    /// Retry policy for transient failures.
    #[must_use]
    pub fn retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Custom HTTP client (a default one is built otherwise).
    #[must_use]
    pub fn http(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    /// `MtdError::Config` when a required component is missing or the
    /// default HTTP client cannot be built.
    pub fn build(self) -> Result<MtdGateway<F, S>> {
        let base_url = self
            .base_url
            .ok_or_else(|| MtdError::Config("gateway base URL not set".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let tokens =
            self.tokens.ok_or_else(|| MtdError::Config("token manager not set".to_string()))?;
        let fraud = self
            .fraud
            .ok_or_else(|| MtdError::Config("fraud prevention provider not set".to_string()))?;
        let http = match self.http {
            Some(http) => http,
            None => HttpClient::new()?,
        };

        Ok(MtdGateway { http, base_url, tokens, fraud, retry: self.retry })
    }
}
