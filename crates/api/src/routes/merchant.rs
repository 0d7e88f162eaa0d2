//! Merchant-facing endpoints: config, account onboarding, automation
//! (eligibility check + session creation), dashboard, and staff actions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{NaiveDate, NaiveTime};
use common::SessionId;
use domain::{ApplyToRule, CustomerDetails, GuaranteeConfig, Money, ReservationId, ReservationSlot};
use lifecycle::{
    AccountState, Attendance, AttendanceOutcome, BookingHandoff, ConnectOutcome,
    CreateSessionOutcome, CreateSessionRequest, DispatchReport, Period,
};
use serde::{Deserialize, Serialize};
use session_store::GuaranteeStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::{AppState, SessionView, format_amount, merchant_from_headers};

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateConfigRequest {
    pub enabled: bool,
    /// Penalty per guest in minor currency units.
    pub penalty_per_person: i64,
    pub cancellation_delay_hours: u32,
    pub apply_to: ApplyToRule,
    pub min_persons: u32,
    pub currency: Option<String>,
    pub business_name: Option<String>,
    pub business_email: Option<String>,
    pub business_phone: Option<String>,
    pub auto_send_email_on_create: bool,
    pub auto_send_sms_on_create: bool,
    pub auto_send_email_on_validation: bool,
    pub auto_send_sms_on_validation: bool,
    pub sms_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckStatusQuery {
    pub nb_persons: Option<u32>,
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub reservation_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub nb_persons: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_duration() -> u32 {
    90
}

fn default_timezone() -> String {
    "Europe/Paris".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ReservationsQuery {
    pub period: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Attended,
    Noshow,
}

#[derive(Deserialize)]
pub struct AttendanceBody {
    pub status: AttendanceStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct ConfigResponse {
    pub enabled: bool,
    pub penalty_per_person: i64,
    pub cancellation_delay_hours: u32,
    pub apply_to: String,
    pub min_persons: u32,
    pub currency: String,
    pub business_name: String,
    pub business_email: Option<String>,
    pub business_phone: Option<String>,
    pub agent_id: String,
    pub api_key: String,
    pub connected: bool,
    pub charge_ready: bool,
    pub auto_send_email_on_create: bool,
    pub auto_send_sms_on_create: bool,
    pub auto_send_email_on_validation: bool,
    pub auto_send_sms_on_validation: bool,
    pub sms_enabled: bool,
}

impl ConfigResponse {
    fn from_config(config: &GuaranteeConfig) -> Self {
        Self {
            enabled: config.enabled,
            penalty_per_person: config.penalty_per_person.minor(),
            cancellation_delay_hours: config.cancellation_delay_hours,
            apply_to: config.apply_to.as_str().to_string(),
            min_persons: config.min_persons,
            currency: config.currency.clone(),
            business_name: config.business_name.clone(),
            business_email: config.business_email.clone(),
            business_phone: config.business_phone.clone(),
            agent_id: config.agent_id.clone(),
            api_key: config.api_key.clone(),
            connected: config.connected_account_id.is_some(),
            charge_ready: config.charge_ready(),
            auto_send_email_on_create: config.auto_send_email_on_create,
            auto_send_sms_on_create: config.auto_send_sms_on_create,
            auto_send_email_on_validation: config.auto_send_email_on_validation,
            auto_send_sms_on_validation: config.auto_send_sms_on_validation,
            sms_enabled: config.sms_enabled,
        }
    }
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub connected: bool,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_url: Option<String>,
}

#[derive(Serialize)]
pub struct StripeStatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_submitted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charges_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payouts_enabled: Option<bool>,
}

#[derive(Serialize)]
pub struct CheckStatusResponse {
    pub guarantee_enabled: bool,
    pub charge_ready: bool,
    pub penalty_per_person: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub required: bool,
    pub already_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantee_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DispatchReport>,
}

#[derive(Serialize)]
pub struct ReservationsResponse {
    pub period: String,
    pub pending: Vec<SessionView>,
    pub validated: Vec<SessionView>,
    pub today: Vec<SessionView>,
    pub validation_rate: f64,
}

#[derive(Serialize)]
pub struct AttendanceResponse {
    pub status: String,
    pub charged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ResendResponse {
    pub status: String,
    pub reminder_count: u32,
    pub guarantee_url: String,
    pub notifications: DispatchReport,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub status: String,
}

// -- Handlers --

/// GET /guarantee/config — the calling merchant's configuration.
#[tracing::instrument(skip(state, headers))]
pub async fn get_config<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
) -> Result<Json<ConfigResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;
    Ok(Json(ConfigResponse::from_config(&config)))
}

/// PUT /guarantee/config — update the calling merchant's configuration.
///
/// Enabling the guarantee without a charge-capable account is downgraded
/// to disabled with a warning rather than rejected.
#[tracing::instrument(skip(state, headers, req))]
pub async fn put_config<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<Json<ConfigResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let mut config = merchant_from_headers(&state, &headers).await?;

    if req.penalty_per_person < 0 {
        return Err(ApiError::BadRequest(
            "penalty_per_person must not be negative".to_string(),
        ));
    }
    if req.apply_to == ApplyToRule::MinPersons && req.min_persons == 0 {
        return Err(ApiError::BadRequest(
            "min_persons must be set for the min_persons rule".to_string(),
        ));
    }

    config.enabled = req.enabled;
    config.penalty_per_person = Money::from_minor(req.penalty_per_person);
    config.cancellation_delay_hours = req.cancellation_delay_hours;
    config.apply_to = req.apply_to;
    config.min_persons = req.min_persons;
    if let Some(currency) = req.currency {
        config.currency = currency.to_lowercase();
    }
    if let Some(name) = req.business_name {
        config.business_name = name;
    }
    config.business_email = req.business_email.or(config.business_email.take());
    config.business_phone = req.business_phone.or(config.business_phone.take());
    config.auto_send_email_on_create = req.auto_send_email_on_create;
    config.auto_send_sms_on_create = req.auto_send_sms_on_create;
    config.auto_send_email_on_validation = req.auto_send_email_on_validation;
    config.auto_send_sms_on_validation = req.auto_send_sms_on_validation;
    config.sms_enabled = req.sms_enabled;

    if config.enabled && !config.charge_ready() {
        tracing::warn!(
            merchant_id = %config.merchant_id,
            "guarantee enabled without a charge-capable account, downgrading to disabled"
        );
        config.enabled = false;
    }

    state.store.upsert_config(config.clone()).await?;
    Ok(Json(ConfigResponse::from_config(&config)))
}

/// POST /guarantee/connect-stripe — idempotent onboarding-link issuance.
#[tracing::instrument(skip(state, headers))]
pub async fn connect_stripe<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
) -> Result<Json<ConnectResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let response = match state.accounts.connect(config.merchant_id).await? {
        ConnectOutcome::AlreadyConnected { account_id } => ConnectResponse {
            connected: true,
            account_id,
            onboarding_url: None,
        },
        ConnectOutcome::OnboardingLink { account_id, url } => ConnectResponse {
            connected: false,
            account_id,
            onboarding_url: Some(url),
        },
    };
    Ok(Json(response))
}

/// GET /guarantee/stripe-status — capability probe.
#[tracing::instrument(skip(state, headers))]
pub async fn stripe_status<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
) -> Result<Json<StripeStatusResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let response = match state.accounts.status(config.merchant_id).await? {
        AccountState::Disconnected => StripeStatusResponse {
            connected: false,
            details_submitted: None,
            charges_enabled: None,
            payouts_enabled: None,
        },
        AccountState::Connected {
            details_submitted,
            charges_enabled,
            payouts_enabled,
        } => StripeStatusResponse {
            connected: true,
            details_submitted: Some(details_submitted),
            charges_enabled: Some(charges_enabled),
            payouts_enabled: Some(payouts_enabled),
        },
    };
    Ok(Json(response))
}

/// POST /guarantee/disconnect-stripe — clear the account and force-disable.
#[tracing::instrument(skip(state, headers))]
pub async fn disconnect_stripe<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;
    state.accounts.disconnect(config.merchant_id).await?;
    Ok(Json(serde_json::json!({
        "disconnected": true,
        "enabled": false,
    })))
}

/// GET /guarantee/check-status — eligibility/config check for automation.
#[tracing::instrument(skip(state, headers))]
pub async fn check_status<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Query(query): Query<CheckStatusQuery>,
) -> Result<Json<CheckStatusResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let eligibility = match (query.nb_persons, query.date) {
        (Some(nb_persons), Some(date)) => {
            Some(state.engine.check_eligibility(&config, nb_persons, date))
        }
        _ => None,
    };

    Ok(Json(CheckStatusResponse {
        guarantee_enabled: config.enabled,
        charge_ready: config.charge_ready(),
        penalty_per_person: config.penalty_per_person.minor(),
        currency: config.currency.clone(),
        required: eligibility.map(|e| e.required),
        reason: eligibility.map(|e| e.reason.as_str().to_string()),
    }))
}

/// POST /guarantee/create-session — idempotent on `reservation_id`.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create_session<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    if body.reservation_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "reservation_id must not be empty".to_string(),
        ));
    }
    if body.customer_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "customer_name must not be empty".to_string(),
        ));
    }

    let request = CreateSessionRequest {
        reservation_id: ReservationId::new(body.reservation_id),
        customer: CustomerDetails::new(body.customer_name, body.customer_email, body.customer_phone),
        nb_persons: body.nb_persons,
        slot: ReservationSlot::new(body.date, body.time, body.duration_minutes, body.timezone),
    };

    let outcome = state.engine.create_session(&config, request).await?;
    let response = match outcome {
        CreateSessionOutcome::NotRequired { eligibility } => (
            StatusCode::OK,
            CreateSessionResponse {
                required: false,
                already_exists: false,
                reason: Some(eligibility.reason.as_str().to_string()),
                session_id: None,
                status: None,
                guarantee_url: None,
                notifications: None,
            },
        ),
        CreateSessionOutcome::AlreadyExists {
            session,
            guarantee_url,
        } => (
            StatusCode::OK,
            CreateSessionResponse {
                required: true,
                already_exists: true,
                reason: None,
                session_id: Some(session.id.to_string()),
                status: Some(session.status.as_str().to_string()),
                guarantee_url: Some(guarantee_url),
                notifications: None,
            },
        ),
        CreateSessionOutcome::Created {
            session,
            guarantee_url,
            notifications,
        } => (
            StatusCode::CREATED,
            CreateSessionResponse {
                required: true,
                already_exists: false,
                reason: None,
                session_id: Some(session.id.to_string()),
                status: Some(session.status.as_str().to_string()),
                guarantee_url: Some(guarantee_url),
                notifications: Some(notifications),
            },
        ),
    };

    Ok((response.0, Json(response.1)))
}

/// GET /guarantee/reservations — dashboard buckets for a period.
#[tracing::instrument(skip(state, headers))]
pub async fn reservations<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Query(query): Query<ReservationsQuery>,
) -> Result<Json<ReservationsResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let period_str = query.period.unwrap_or_else(|| "week".to_string());
    let period = Period::parse(&period_str)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown period '{period_str}'")))?;

    let view = state.engine.dashboard(config.merchant_id, period).await?;

    Ok(Json(ReservationsResponse {
        period: period_str,
        pending: view.pending.iter().map(SessionView::from_session).collect(),
        validated: view
            .validated
            .iter()
            .map(SessionView::from_session)
            .collect(),
        today: view.today.iter().map(SessionView::from_session).collect(),
        validation_rate: view.validation_rate,
    }))
}

/// POST /guarantee/reservations/{id}/status — attended / no-show marking.
#[tracing::instrument(skip(state, headers, body))]
pub async fn set_reservation_status<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AttendanceBody>,
) -> Result<Json<AttendanceResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;
    let session_id = SessionId::from_uuid(id);

    let attendance = match body.status {
        AttendanceStatus::Attended => Attendance::Attended,
        AttendanceStatus::Noshow => Attendance::Noshow,
    };

    let outcome = state
        .engine
        .mark_attendance(config.merchant_id, session_id, attendance)
        .await?;

    let response = match outcome {
        AttendanceOutcome::Completed { session } => AttendanceResponse {
            status: session.status.as_str().to_string(),
            charged: false,
            amount: None,
            amount_display: None,
            payment_intent_id: None,
            error: None,
        },
        AttendanceOutcome::Charged { session, charge } => AttendanceResponse {
            status: session.status.as_str().to_string(),
            charged: true,
            amount: Some(charge.amount.minor()),
            amount_display: Some(format_amount(charge.amount, &charge.currency)),
            payment_intent_id: charge.payment_intent_id,
            error: None,
        },
        AttendanceOutcome::ChargeFailed { session, charge } => AttendanceResponse {
            status: session.status.as_str().to_string(),
            charged: false,
            amount: Some(charge.amount.minor()),
            amount_display: None,
            payment_intent_id: None,
            error: charge.failure_reason,
        },
    };

    Ok(Json(response))
}

/// POST /guarantee/resend/{id} — fresh card-setup link + reminder.
#[tracing::instrument(skip(state, headers))]
pub async fn resend<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ResendResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let outcome = state
        .engine
        .resend_link(config.merchant_id, SessionId::from_uuid(id))
        .await?;

    Ok(Json(ResendResponse {
        status: outcome.session.status.as_str().to_string(),
        reminder_count: outcome.session.reminder_count,
        guarantee_url: outcome.guarantee_url,
        notifications: outcome.notifications,
    }))
}

/// POST /guarantee/cancel/{id} — cancel a pending session.
#[tracing::instrument(skip(state, headers))]
pub async fn cancel<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = merchant_from_headers(&state, &headers).await?;

    let session = state
        .engine
        .cancel_session(config.merchant_id, SessionId::from_uuid(id))
        .await?;

    Ok(Json(CancelResponse {
        status: session.status.as_str().to_string(),
    }))
}
