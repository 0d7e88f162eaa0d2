//! Public (unauthenticated) endpoints: agent availability and the
//! customer-facing guarantee page contracts.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{NaiveDate, NaiveTime};
use common::SessionId;
use domain::SessionError;
use lifecycle::{BookingHandoff, LifecycleError};
use serde::Serialize;
use session_store::GuaranteeStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
pub struct AgentStatusResponse {
    pub available: bool,
    pub business_name: String,
    pub penalty_per_person: i64,
    pub currency: String,
    pub apply_to: String,
    pub min_persons: u32,
    pub cancellation_delay_hours: u32,
}

#[derive(Serialize)]
pub struct PublicSessionResponse {
    pub session_id: String,
    pub business_name: String,
    pub status: String,
    pub already_completed: bool,
    pub customer_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub nb_persons: u32,
    pub penalty_per_person: i64,
    pub currency: String,
}

#[derive(Serialize)]
pub struct PublicCheckoutResponse {
    pub checkout_url: String,
}

/// GET /guarantee/status/{agent_id} — guarantee availability and
/// non-sensitive config for a merchant agent.
#[tracing::instrument(skip(state))]
pub async fn agent_status<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStatusResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let config = state
        .store
        .config_by_agent(&agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown agent {agent_id}")))?;

    Ok(Json(AgentStatusResponse {
        available: config.enabled && config.charge_ready(),
        business_name: config.business_name.clone(),
        penalty_per_person: config.penalty_per_person.minor(),
        currency: config.currency.clone(),
        apply_to: config.apply_to.as_str().to_string(),
        min_persons: config.min_persons,
        cancellation_delay_hours: config.cancellation_delay_hours,
    }))
}

/// GET /guarantee/public/session/{id} — customer-facing session summary.
/// 410 once a pending session has exceeded the expiry window.
#[tracing::instrument(skip(state))]
pub async fn public_session<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicSessionResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let session = state
        .engine
        .public_session(SessionId::from_uuid(id))
        .await?;

    let config = state
        .store
        .config_for_merchant(session.merchant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Merchant configuration missing".to_string()))?;

    Ok(Json(PublicSessionResponse {
        session_id: session.id.to_string(),
        business_name: config.business_name.clone(),
        status: session.status.as_str().to_string(),
        already_completed: !session.status.can_validate(),
        customer_name: session.customer.name.clone(),
        date: session.slot.date,
        time: session.slot.time,
        nb_persons: session.nb_persons,
        penalty_per_person: session.penalty_per_person.minor(),
        currency: config.currency,
    }))
}

/// POST /guarantee/public/checkout/{id} — a (possibly fresh) card-setup
/// checkout URL. 400 once the card is already captured, 410 when expired.
#[tracing::instrument(skip(state))]
pub async fn public_checkout<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicCheckoutResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let checkout = state
        .engine
        .public_checkout(SessionId::from_uuid(id))
        .await
        .map_err(|e| match e {
            LifecycleError::Session(SessionError::InvalidTransition { .. }) => {
                ApiError::BadRequest("Session already confirmed".to_string())
            }
            other => ApiError::from(other),
        })?;

    Ok(Json(PublicCheckoutResponse {
        checkout_url: checkout.checkout_url,
    }))
}
