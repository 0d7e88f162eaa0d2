//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeDelta, Utc};
use common::MerchantId;
use domain::{ApplyToRule, GuaranteeConfig, Money};
use lifecycle::InMemoryBookingHandoff;
use metrics_exporter_prometheus::PrometheusHandle;
use session_store::{GuaranteeStore, InMemorySessionStore};
use tower::ServiceExt;

type TestState = Arc<api::routes::AppState<InMemorySessionStore, InMemoryBookingHandoff>>;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> api::config::Config {
    api::config::Config {
        master_key: "test-master".to_string(),
        webhook_secret: "test-secret".to_string(),
        public_base_url: "https://app.test".to_string(),
        ..api::config::Config::default()
    }
}

fn setup() -> (axum::Router, TestState) {
    let store = InMemorySessionStore::new();
    let state = api::create_default_state(store, &test_config());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

/// Seeds a merchant with a charge-capable account; returns its config.
async fn seed_merchant(state: &TestState) -> GuaranteeConfig {
    let mut config = GuaranteeConfig::new(MerchantId::new(), "Chez Test");
    config.enabled = true;
    config.penalty_per_person = Money::from_major(30);
    config.connected_account_id = Some("acct_test".to_string());
    config.account_charges_enabled = true;
    state.gateway.seed_ready_account("acct_test");
    state.store.upsert_config(config.clone()).await.unwrap();
    config
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_key(uri: &str, header: &str, key: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header, key)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, headers: &[(&str, &str)], body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn create_session_body(reservation_id: &str, nb_persons: u32) -> serde_json::Value {
    serde_json::json!({
        "reservation_id": reservation_id,
        "customer_name": "Ada Lovelace",
        "customer_email": "ada@example.com",
        "customer_phone": "+33600000000",
        "nb_persons": nb_persons,
        "date": "2025-06-06",
        "time": "20:00:00",
    })
}

/// Creates a session and returns `(session_id, checkout_session_id)`.
async fn create_session(
    app: &axum::Router,
    state: &TestState,
    api_key: &str,
    reservation_id: &str,
    nb_persons: u32,
) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/guarantee/create-session",
            &[("x-api-key", api_key)],
            create_session_body(reservation_id, nb_persons),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let session_id = json["session_id"].as_str().unwrap().to_string();

    let session = state
        .store
        .session(common::SessionId::from_uuid(
            uuid::Uuid::parse_str(&session_id).unwrap(),
        ))
        .await
        .unwrap()
        .unwrap();
    let checkout_id = session.payment.checkout_session_id.unwrap();
    (session_id, checkout_id)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_agent_status_public() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/guarantee/status/{}", config.agent_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["available"], true);
    assert_eq!(json["business_name"], "Chez Test");
    assert_eq!(json["penalty_per_person"], 3000);
    // Non-sensitive only: no API key in the public payload.
    assert!(json.get("api_key").is_none());

    let response = app
        .oneshot(get("/guarantee/status/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_session_requires_api_key() {
    let (app, _) = setup();

    let response = app
        .oneshot(post_json(
            "/guarantee/create-session",
            &[],
            create_session_body("R-1", 2),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_session_and_idempotent_replay() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/guarantee/create-session",
            &[("x-api-key", &config.api_key)],
            create_session_body("R-100", 6),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = body_json(response).await;
    assert_eq!(first["required"], true);
    assert_eq!(first["already_exists"], false);
    assert_eq!(first["status"], "pending");
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(
        first["guarantee_url"]
            .as_str()
            .unwrap()
            .starts_with("https://app.test/guarantee/")
    );
    assert_eq!(first["notifications"]["email_sent"], true);

    // Same reservation id: same session, no new checkout.
    let response = app
        .oneshot(post_json(
            "/guarantee/create-session",
            &[("x-api-key", &config.api_key)],
            create_session_body("R-100", 6),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_eq!(second["already_exists"], true);
    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(state.gateway.checkout_count(), 1);
}

#[tokio::test]
async fn test_create_session_not_required() {
    let (app, state) = setup();
    let mut config = seed_merchant(&state).await;
    config.apply_to = ApplyToRule::MinPersons;
    config.min_persons = 4;
    state.store.upsert_config(config.clone()).await.unwrap();

    let response = app
        .oneshot(post_json(
            "/guarantee/create-session",
            &[("x-api-key", &config.api_key)],
            create_session_body("R-1", 2),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["required"], false);
    assert_eq!(json["reason"], "min_persons_not_met");
    assert!(json.get("session_id").is_none());
}

#[tokio::test]
async fn test_webhook_rejects_bad_secret() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (_, checkout_id) = create_session(&app, &state, &config.api_key, "R-1", 2).await;

    let response = app
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "wrong")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_validates_and_replays_idempotently() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, checkout_id) =
        create_session(&app, &state, &config.api_key, "R-1", 2).await;

    // Webhook before the customer finished: reported, not an error.
    let response = app
        .clone()
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validated"], false);
    assert_eq!(json["error"], "checkout_not_complete");

    // Customer completes card setup, webhook fires again.
    state.gateway.complete_checkout(&checkout_id);
    let response = app
        .clone()
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validated"], true);
    assert_eq!(json["already_validated"], false);
    assert_eq!(json["session_id"], session_id.as_str());

    // Duplicate delivery is a no-op success.
    let response = app
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validated"], true);
    assert_eq!(json["already_validated"], true);
}

#[tokio::test]
async fn test_webhook_rejects_unknown_shape() {
    let (app, _) = setup();

    let response = app
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({
                "checkout_session_id": "cs_1",
                "injected": "field",
            }),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_public_session_expires_with_410() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, _) = create_session(&app, &state, &config.api_key, "R-1", 2).await;

    let uri = format!("/guarantee/public/session/{session_id}");
    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    state
        .store
        .backdate_session(
            common::SessionId::from_uuid(uuid::Uuid::parse_str(&session_id).unwrap()),
            Utc::now() - TimeDelta::days(8),
        )
        .await;

    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    let response = app
        .oneshot(post_json(
            &format!("/guarantee/public/checkout/{session_id}"),
            &[],
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_public_checkout_rejects_completed_session() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, checkout_id) =
        create_session(&app, &state, &config.api_key, "R-1", 2).await;

    state.gateway.complete_checkout(&checkout_id);
    app.clone()
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/guarantee/public/checkout/{session_id}"),
            &[],
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Session already confirmed");
}

#[tokio::test]
async fn test_noshow_marking_charges_snapshot_amount() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, checkout_id) =
        create_session(&app, &state, &config.api_key, "R-1", 6).await;

    state.gateway.complete_checkout(&checkout_id);
    app.clone()
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/guarantee/reservations/{session_id}/status"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({ "status": "noshow" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["charged"], true);
    assert_eq!(json["status"], "noshow_charged");
    // 30.00 x 6 guests, in minor units.
    assert_eq!(json["amount"], 18000);
    assert!(json["payment_intent_id"].as_str().is_some());
}

#[tokio::test]
async fn test_noshow_charge_failure_reported_with_reason() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, checkout_id) =
        create_session(&app, &state, &config.api_key, "R-1", 2).await;

    state.gateway.complete_checkout(&checkout_id);
    app.clone()
        .oneshot(post_json(
            "/guarantee/webhook/checkout-complete",
            &[("x-webhook-secret", "test-secret")],
            serde_json::json!({ "checkout_session_id": checkout_id }),
        ))
        .await
        .unwrap();

    state.gateway.set_fail_charge_with(Some("card_declined"));
    let response = app
        .oneshot(post_json(
            &format!("/guarantee/reservations/{session_id}/status"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({ "status": "noshow" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["charged"], false);
    assert_eq!(json["status"], "noshow_failed");
    assert!(json["error"].as_str().unwrap().contains("card_declined"));
}

#[tokio::test]
async fn test_attendance_on_pending_session_conflicts() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, _) = create_session(&app, &state, &config.api_key, "R-1", 2).await;

    let response = app
        .oneshot(post_json(
            &format!("/guarantee/reservations/{session_id}/status"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({ "status": "attended" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reservations_dashboard() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;

    let today = Utc::now().date_naive();
    let mut body = create_session_body("R-1", 2);
    body["date"] = serde_json::json!(today.to_string());
    let response = app
        .clone()
        .oneshot(post_json(
            "/guarantee/create-session",
            &[("x-api-key", &config.api_key)],
            body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get_with_key(
            "/guarantee/reservations?period=week",
            "x-api-key",
            &config.api_key,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["pending"].as_array().unwrap().len(), 1);
    assert_eq!(json["today"].as_array().unwrap().len(), 1);
    assert_eq!(json["validation_rate"], 0.0);

    let response = app
        .oneshot(get_with_key(
            "/guarantee/reservations?period=fortnight",
            "x-api-key",
            &config.api_key,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_config_downgrades_enabled_without_account() {
    let (app, state) = setup();
    let mut config = GuaranteeConfig::new(MerchantId::new(), "Chez Neuf");
    let api_key = config.api_key.clone();
    config.enabled = false;
    state.store.upsert_config(config).await.unwrap();

    let response = app
        .oneshot(post_json_put(
            "/guarantee/config",
            &[("x-api-key", &api_key)],
            serde_json::json!({
                "enabled": true,
                "penalty_per_person": 2000,
                "cancellation_delay_hours": 24,
                "apply_to": "all",
                "min_persons": 0,
                "auto_send_email_on_create": true,
                "auto_send_sms_on_create": false,
                "auto_send_email_on_validation": true,
                "auto_send_sms_on_validation": false,
                "sms_enabled": false,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    // No charge-capable account: the update lands but enabled is downgraded.
    assert_eq!(json["enabled"], false);
    assert_eq!(json["penalty_per_person"], 2000);
    assert_eq!(json["charge_ready"], false);
}

fn post_json_put(uri: &str, headers: &[(&str, &str)], body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_master_key_endpoints() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, _) = create_session(&app, &state, &config.api_key, "R-1", 2).await;

    // Merchant API keys do not open workflow endpoints.
    let response = app
        .clone()
        .oneshot(get_with_key(
            &format!("/guarantee/session-details/{session_id}"),
            "x-api-key",
            &config.api_key,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get_with_key(
            &format!("/guarantee/session-details/{session_id}"),
            "x-master-key",
            "test-master",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_id"], session_id.as_str());
    assert_eq!(json["penalty_total"], 6000);

    let response = app
        .oneshot(post_json(
            "/guarantee/confirm-booking",
            &[("x-master-key", "test-master")],
            serde_json::json!({
                "session_id": session_id,
                "status": "booked",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], true);
}

#[tokio::test]
async fn test_resend_and_cancel() {
    let (app, state) = setup();
    let config = seed_merchant(&state).await;
    let (session_id, _) = create_session(&app, &state, &config.api_key, "R-1", 2).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/guarantee/resend/{session_id}"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["reminder_count"], 1);
    assert_eq!(state.gateway.checkout_count(), 2);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/guarantee/cancel/{session_id}"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "cancelled");

    // A cancelled session cannot get a new link.
    let response = app
        .oneshot(post_json(
            &format!("/guarantee/resend/{session_id}"),
            &[("x-api-key", &config.api_key)],
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_check_status_eligibility() {
    let (app, state) = setup();
    let mut config = seed_merchant(&state).await;
    config.apply_to = ApplyToRule::Weekend;
    state.store.upsert_config(config.clone()).await.unwrap();

    // 2025-06-02 is a Monday: the weekend rule says no guarantee.
    let response = app
        .clone()
        .oneshot(get_with_key(
            "/guarantee/check-status?nb_persons=4&date=2025-06-02",
            "x-api-key",
            &config.api_key,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["required"], false);
    assert_eq!(json["reason"], "not_weekend");

    // 2025-06-06 is a Friday: covered by the weekend rule.
    let response = app
        .oneshot(get_with_key(
            "/guarantee/check-status?nb_persons=4&date=2025-06-06",
            "x-api-key",
            &config.api_key,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["required"], true);
    assert_eq!(json["reason"], "required");
}
