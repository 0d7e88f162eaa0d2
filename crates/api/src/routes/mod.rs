//! HTTP route handlers.

pub mod health;
pub mod merchant;
pub mod metrics;
pub mod public;
pub mod workflow;

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{NaiveDate, NaiveTime};
use domain::{GuaranteeConfig, GuaranteeSession, Money};
use lifecycle::{
    AccountManager, BookingHandoff, GuaranteeEngine, InMemoryNotifier, InMemoryPaymentGateway,
};
use serde::Serialize;
use session_store::GuaranteeStore;

use crate::error::ApiError;

/// Header carrying the merchant-scoped API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the platform master key (workflow endpoints).
pub const MASTER_KEY_HEADER: &str = "x-master-key";

/// Header carrying the payment-processor webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Shared application state accessible from all handlers.
pub struct AppState<S, H>
where
    S: GuaranteeStore + Clone,
    H: BookingHandoff,
{
    pub store: S,
    pub engine: GuaranteeEngine<S, InMemoryPaymentGateway, InMemoryNotifier, H>,
    pub accounts: AccountManager<S, InMemoryPaymentGateway>,
    pub gateway: InMemoryPaymentGateway,
    pub notifier: InMemoryNotifier,
    pub master_key: String,
    pub webhook_secret: String,
}

/// Resolves the calling merchant from the API-key header.
///
/// Unknown or missing keys are rejected before any state is read further.
pub async fn merchant_from_headers<S, H>(
    state: &Arc<AppState<S, H>>,
    headers: &HeaderMap,
) -> Result<GuaranteeConfig, ApiError>
where
    S: GuaranteeStore + Clone,
    H: BookingHandoff,
{
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing API key".to_string()))?;

    state
        .store
        .config_by_api_key(key)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid API key".to_string()))
}

/// Rejects callers that do not carry the platform master key.
pub fn require_master_key<S, H>(
    state: &Arc<AppState<S, H>>,
    headers: &HeaderMap,
) -> Result<(), ApiError>
where
    S: GuaranteeStore + Clone,
    H: BookingHandoff,
{
    let key = headers
        .get(MASTER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if key == state.master_key {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid master key".to_string()))
    }
}

/// Rejects webhook deliveries that do not carry the shared secret.
pub fn require_webhook_secret<S, H>(
    state: &Arc<AppState<S, H>>,
    headers: &HeaderMap,
) -> Result<(), ApiError>
where
    S: GuaranteeStore + Clone,
    H: BookingHandoff,
{
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if secret == state.webhook_secret {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid webhook secret".to_string()))
    }
}

/// Session fields shared by merchant and workflow responses.
#[derive(Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub reservation_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub nb_persons: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub timezone: String,
    pub status: String,
    pub penalty_per_person: i64,
    pub penalty_total: i64,
    pub reminder_count: u32,
    pub created_at: String,
    pub validated_at: Option<String>,
    pub charged_at: Option<String>,
}

impl SessionView {
    pub fn from_session(session: &GuaranteeSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            reservation_id: session.reservation_id.as_str().to_string(),
            customer_name: session.customer.name.clone(),
            customer_email: session.customer.email.clone(),
            customer_phone: session.customer.phone.clone(),
            nb_persons: session.nb_persons,
            date: session.slot.date,
            time: session.slot.time,
            duration_minutes: session.slot.duration_minutes,
            timezone: session.slot.timezone.clone(),
            status: session.status.as_str().to_string(),
            penalty_per_person: session.penalty_per_person.minor(),
            penalty_total: session.penalty_total().minor(),
            reminder_count: session.reminder_count,
            created_at: session.created_at.to_rfc3339(),
            validated_at: session.validated_at.map(|t| t.to_rfc3339()),
            charged_at: session.charged_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Formats a minor-unit amount for display fields.
pub fn format_amount(amount: Money, currency: &str) -> String {
    format!("{} {}", amount, currency.to_uppercase())
}
