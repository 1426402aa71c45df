//! Integration tests for the MTD gateway against a mock upstream:
//! the end-to-end quarterly flow, the 401 single-refresh property,
//! duplicate-submission idempotency, rate limiting, and the error
//! taxonomy mapping.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use taxdesk_common::auth::{
    EncryptedTokenStore, OAuthClient, StaticKeyProvider, TokenManager, TokenSet, TokenStore,
};
use taxdesk_common::crypto::EncryptionService;
use taxdesk_common::retry::RetryStrategy;
use taxdesk_core::SubmissionGateway;
use taxdesk_domain::{
    AuthError, BusinessId, ConflictKind, DisplayMetrics, MtdError, Nino, OAuthSettings,
    PeriodTotals, QuarterlyOutcome, SubmissionPeriod, TaxYear, ValidationKind, VendorInfo,
};
use taxdesk_infra::fph::{DeviceIdentity, FixedProbe, FraudPreventionProvider};
use taxdesk_infra::mtd::MtdGateway;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NINO: &str = "AA000001A";
const BUSINESS: &str = "XAIS12345678901";

struct Harness {
    server: MockServer,
    gateway: MtdGateway<OAuthClient, EncryptedTokenStore>,
    // Keeps the temporary store/device files alive for the test duration.
    _dir: TempDir,
}

async fn harness_with_access_token(access_token: &str) -> Harness {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let oauth = OAuthClient::new(OAuthSettings {
        authorize_url: format!("{}/oauth/authorize", server.uri()),
        token_url: format!("{}/oauth/token", server.uri()),
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
        redirect_uri: "http://localhost:9876/callback".to_string(),
        scopes: vec!["read:self-assessment".to_string(), "write:self-assessment".to_string()],
    })
    .unwrap();

    let keys = StaticKeyProvider::new(EncryptionService::generate_key());
    let store = EncryptedTokenStore::open(dir.path().join("tokens.enc"), &keys).unwrap();
    store
        .save(&TokenSet::new(access_token.to_string(), "refresh-token".to_string(), 14400, None))
        .await
        .unwrap();

    let tokens = Arc::new(TokenManager::new(Arc::new(oauth), Arc::new(store)));
    tokens.initialize().await.unwrap();

    let device = DeviceIdentity::load_or_create(dir.path().join("device-id")).unwrap();
    let fraud = FraudPreventionProvider::new(
        device,
        Arc::new(FixedProbe::default()),
        VendorInfo { product_name: "TaxDesk Desktop".to_string(), version: "0.3.0".to_string() },
        Some(DisplayMetrics {
            screen_width: 1920,
            screen_height: 1080,
            scaling_factor: 1.0,
            colour_depth: 24,
            window_width: 1280,
            window_height: 800,
        }),
    )
    .unwrap();

    let retry = RetryStrategy::default()
        .with_base_delay(Duration::from_millis(1))
        .unwrap()
        .with_max_delay(Duration::from_millis(20))
        .unwrap()
        .with_jitter_factor(0.0);

    let gateway = MtdGateway::builder()
        .base_url(server.uri())
        .tokens(tokens)
        .fraud_prevention(Arc::new(fraud))
        .retry(retry)
        .build()
        .unwrap();

    Harness { server, gateway, _dir: dir }
}

async fn harness() -> Harness {
    harness_with_access_token("valid-access").await
}

fn nino() -> Nino {
    Nino::parse(NINO).unwrap()
}

fn business_id() -> BusinessId {
    BusinessId::parse(BUSINESS).unwrap()
}

fn tax_year() -> TaxYear {
    TaxYear::parse("2025-26").unwrap()
}

fn quarter(index: u8, income: Decimal, expenses: Decimal) -> SubmissionPeriod {
    let (start, end) = match index {
        1 => ((2025, 4, 6), (2025, 7, 5)),
        2 => ((2025, 7, 6), (2025, 10, 5)),
        3 => ((2025, 10, 6), (2026, 1, 5)),
        _ => ((2026, 1, 6), (2026, 4, 5)),
    };
    SubmissionPeriod {
        business_id: business_id(),
        start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
        end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        totals: PeriodTotals { income, expenses },
    }
}

#[tokio::test]
async fn every_request_carries_fraud_headers_accept_and_bearer() {
    let h = harness().await;

    let mut mock = Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("Accept", "application/vnd.hmrc.2.0+json"))
        .and(header("Authorization", "Bearer valid-access"))
        .and(header("Gov-Client-Connection-Method", "DESKTOP_APP_DIRECT"));
    for name in [
        "Gov-Client-Device-ID",
        "Gov-Client-User-IDs",
        "Gov-Client-Timezone",
        "Gov-Client-Local-IPs",
        "Gov-Client-Screens",
        "Gov-Client-Window-Size",
        "Gov-Vendor-Product-Name",
        "Gov-Vendor-Version",
    ] {
        mock = mock.and(header_exists(name));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "businessDetails": [{
            "businessId": BUSINESS,
            "typeOfBusiness": "self-employment",
            "tradingName": "Acme Plumbing"
        }]
    })))
    .expect(1)
    .mount(&h.server)
    .await;

    let businesses = h.gateway.list_businesses(&nino()).await.unwrap();

    assert_eq!(businesses.len(), 1);
    assert_eq!(businesses[0].business_id, business_id());
    assert_eq!(businesses[0].trading_name.as_deref(), Some("Acme Plumbing"));
}

#[tokio::test]
async fn end_to_end_quarterlies_calculation_and_declaration() {
    let h = harness().await;
    let totals = [
        (dec!(10000), dec!(2500)),
        (dec!(22000), dec!(5500)),
        (dec!(35000), dec!(9000)),
        (dec!(48000), dec!(12500)),
    ];

    Mock::given(method("POST"))
        .and(path(format!("/individuals/business/self-employment/{NINO}/{BUSINESS}/periods")))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "submissionId": "sub-001" })),
        )
        .expect(4)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/individuals/calculations/{NINO}/self-assessment/2025-26/trigger")))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({ "calculationId": "calc-777" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    // First two polls find the calculation still cooking; the third
    // returns the breakdown.
    Mock::given(method("GET"))
        .and(path(format!("/individuals/calculations/{NINO}/self-assessment/calc-777")))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(2)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/calculations/{NINO}/self-assessment/calc-777")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "calculationId": "calc-777",
            "totalIncomeTaxAndNicsDue": "7850.50",
            "incomeTaxDue": "6150.00",
            "class4NicsDue": "1521.00",
            "class2NicsDue": "179.50",
            "taxableIncome": "35500"
        })))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!(
            "/individuals/calculations/{NINO}/self-assessment/2025-26/calc-777/final-declaration"
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "chargeReference": "XJ012345678901",
            "processingDate": "2026-01-31T09:30:00Z"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    // Four cumulative quarterly updates.
    for (index, (income, expenses)) in totals.into_iter().enumerate() {
        let outcome = h
            .gateway
            .submit_quarterly_update(&nino(), &business_id(), &quarter(index as u8 + 1, income, expenses))
            .await
            .unwrap();
        assert_eq!(outcome, QuarterlyOutcome::Accepted { submission_id: "sub-001".to_string() });
    }

    // Trigger, then poll until the breakdown is ready.
    let handle = h.gateway.trigger_calculation(&nino(), &tax_year()).await.unwrap();
    assert_eq!(handle.calculation_id, "calc-777");

    let mut calculation = None;
    for _ in 0..5 {
        if let Some(found) = h.gateway.get_calculation(&nino(), &handle).await.unwrap() {
            calculation = Some(found);
            break;
        }
    }
    let calculation = calculation.expect("calculation never became ready");
    assert_eq!(calculation.total_income_tax_and_nics_due, dec!(7850.50));

    // Crystallise.
    let record = h
        .gateway
        .submit_final_declaration(&nino(), &tax_year(), &handle.calculation_id)
        .await
        .unwrap();

    assert_eq!(record.charge_reference, "XJ012345678901");
    assert_eq!(record.calculation_id, "calc-777");
    assert_eq!(record.declared_at.to_rfc3339(), "2026-01-31T09:30:00+00:00");
}

#[tokio::test]
async fn quarterly_body_carries_cumulative_totals() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(format!("/individuals/business/self-employment/{NINO}/{BUSINESS}/periods")))
        .and(body_string_contains("\"periodStartDate\":\"2025-04-06\""))
        .and(body_string_contains("\"periodEndDate\":\"2025-07-05\""))
        .and(body_string_contains("\"periodIncome\":\"10000\""))
        .and(body_string_contains("\"periodExpenses\":\"2500\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "submissionId": "sub-100" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h
        .gateway
        .submit_quarterly_update(&nino(), &business_id(), &quarter(1, dec!(10000), dec!(2500)))
        .await
        .unwrap();
    assert!(matches!(outcome, QuarterlyOutcome::Accepted { .. }));
}

#[tokio::test]
async fn a_401_storm_performs_exactly_two_resource_attempts() {
    let h = harness_with_access_token("stale-access").await;

    // Every resource response is 401.
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&h.server)
        .await;

    // The refresh succeeds; the new token is simply rejected again.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "token_type": "Bearer",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.gateway.list_businesses(&nino()).await;

    assert_eq!(result.unwrap_err(), MtdError::Auth(AuthError::NotAuthenticated));
    // Mock expectations assert the exact counts: two resource attempts
    // (one refresh-and-retry, never more), one token refresh.
}

#[tokio::test]
async fn refreshed_token_is_used_on_the_single_retry() {
    let h = harness_with_access_token("stale-access").await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("Authorization", "Bearer stale-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "token_type": "Bearer",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("Authorization", "Bearer fresh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "businessDetails": []
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let businesses = h.gateway.list_businesses(&nino()).await.unwrap();
    assert!(businesses.is_empty());
}

#[tokio::test]
async fn duplicate_quarterly_submission_is_idempotent_success() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(format!("/individuals/business/self-employment/{NINO}/{BUSINESS}/periods")))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": "DUPLICATE_SUBMISSION",
            "message": "A submission already exists for this period"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h
        .gateway
        .submit_quarterly_update(&nino(), &business_id(), &quarter(1, dec!(10000), dec!(2500)))
        .await
        .unwrap();

    // One request only: a conflict is terminal, never retried.
    assert_eq!(outcome, QuarterlyOutcome::AlreadySubmitted);
}

#[tokio::test]
async fn second_declaration_maps_to_already_declared() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(format!(
            "/individuals/calculations/{NINO}/self-assessment/2025-26/calc-777/final-declaration"
        )))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": "RULE_ALREADY_DECLARED",
            "message": "A final declaration already exists for this tax year"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.gateway.submit_final_declaration(&nino(), &tax_year(), "calc-777").await;

    let err = result.unwrap_err();
    assert_eq!(err, MtdError::Conflict(ConflictKind::AlreadyDeclared));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn incomplete_submission_maps_to_terminal_validation_error() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(format!(
            "/individuals/calculations/{NINO}/self-assessment/2025-26/calc-777/final-declaration"
        )))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "code": "RULE_SUBMISSION_INCOMPLETE",
            "message": "Fewer than four quarterly updates are on file"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.gateway.submit_final_declaration(&nino(), &tax_year(), "calc-777").await;

    let err = result.unwrap_err();
    assert_eq!(err, MtdError::Validation(ValidationKind::IncompleteSubmission));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn rate_limit_honors_retry_after_and_succeeds() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "businessDetails": []
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let businesses = h.gateway.list_businesses(&nino()).await.unwrap();
    assert!(businesses.is_empty());
}

#[tokio::test]
async fn server_errors_are_retried_with_bounded_attempts() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "code": "SERVER_ERROR",
            "message": "Scheduled maintenance"
        })))
        .expect(5)
        .mount(&h.server)
        .await;

    let result = h.gateway.list_businesses(&nino()).await;

    // Five attempts (the policy bound), then the transient error surfaces.
    let err = result.unwrap_err();
    assert!(matches!(err, MtdError::Unavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn bad_request_is_terminal_and_not_retried() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "INVALID_REQUEST",
            "message": "Missing mandatory header Gov-Client-Connection-Method"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.gateway.list_businesses(&nino()).await;

    match result.unwrap_err() {
        MtdError::BadRequest(message) => {
            assert!(message.contains("Gov-Client-Connection-Method"));
        }
        other => panic!("expected BadRequest, got {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_and_not_found_map_terminally() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/{BUSINESS}")))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/{BUSINESS}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": "MATCHING_RESOURCE_NOT_FOUND",
            "message": "No business found"
        })))
        .mount(&h.server)
        .await;

    let forbidden = h.gateway.get_business(&nino(), &business_id()).await.unwrap_err();
    assert_eq!(forbidden, MtdError::Forbidden);

    let not_found = h.gateway.get_business(&nino(), &business_id()).await.unwrap_err();
    assert!(matches!(not_found, MtdError::NotFound(_)));
    assert!(!not_found.is_transient());
}

#[tokio::test]
async fn listing_periods_reconstructs_upstream_state() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/individuals/business/self-employment/{NINO}/{BUSINESS}/periods/2025-26"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "periods": [
                { "periodStartDate": "2025-04-06", "periodEndDate": "2025-07-05" },
                { "periodStartDate": "2025-07-06", "periodEndDate": "2025-10-05" }
            ]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let periods = h.gateway.list_periods(&nino(), &business_id(), &tax_year()).await.unwrap();

    assert_eq!(periods.len(), 2);
    assert_eq!(periods[0].start, NaiveDate::from_ymd_opt(2025, 4, 6).unwrap());
    assert_eq!(periods[1].end, NaiveDate::from_ymd_opt(2025, 10, 5).unwrap());
}

#[tokio::test]
async fn no_periods_resource_means_nothing_submitted() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/individuals/business/self-employment/{NINO}/{BUSINESS}/periods/2025-26"
        )))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": "MATCHING_RESOURCE_NOT_FOUND",
            "message": "No periods found"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let periods = h.gateway.list_periods(&nino(), &business_id(), &tax_year()).await.unwrap();
    assert!(periods.is_empty());
}
