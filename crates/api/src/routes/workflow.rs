//! Inbound webhooks and master-key workflow endpoints.
//!
//! The processor webhook authenticates with a shared webhook secret; the
//! calendar workflow acts on behalf of the platform and uses the master
//! key rather than any merchant's API key.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::SessionId;
use lifecycle::{BookingHandoff, DispatchReport, LifecycleError, ValidationOutcome};
use serde::{Deserialize, Serialize};
use session_store::GuaranteeStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::{AppState, SessionView, require_master_key, require_webhook_secret};

// -- Request types --
//
// Webhook bodies are strict: unknown shapes are rejected at
// deserialization, before any state is read.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutCompleteBody {
    pub checkout_session_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmBookingBody {
    pub session_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutCompleteResponse {
    pub validated: bool,
    pub already_validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DispatchReport>,
}

#[derive(Serialize)]
pub struct ConfirmBookingResponse {
    pub received: bool,
    pub session_id: String,
}

// -- Handlers --

/// POST /guarantee/webhook/checkout-complete — card-setup validation.
///
/// Replays on an already-validated session answer success without
/// re-processing. An incomplete checkout is reported in the body rather
/// than as a server error, since the processor will redeliver.
#[tracing::instrument(skip(state, headers, body))]
pub async fn checkout_complete<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Json(body): Json<CheckoutCompleteBody>,
) -> Result<Json<CheckoutCompleteResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    require_webhook_secret(&state, &headers)?;

    match state
        .engine
        .handle_checkout_completed(&body.checkout_session_id)
        .await
    {
        Ok(ValidationOutcome::Validated {
            session,
            notifications,
        }) => Ok(Json(CheckoutCompleteResponse {
            validated: true,
            already_validated: false,
            session_id: Some(session.id.to_string()),
            error: None,
            notifications: Some(notifications),
        })),
        Ok(ValidationOutcome::AlreadyValidated { session }) => {
            Ok(Json(CheckoutCompleteResponse {
                validated: true,
                already_validated: true,
                session_id: Some(session.id.to_string()),
                error: None,
                notifications: None,
            }))
        }
        Err(LifecycleError::CheckoutNotComplete) => Ok(Json(CheckoutCompleteResponse {
            validated: false,
            already_validated: false,
            session_id: None,
            error: Some("checkout_not_complete".to_string()),
            notifications: None,
        })),
        Err(e) => Err(e.into()),
    }
}

/// GET /guarantee/session-details/{id} — full session context for the
/// booking workflow.
#[tracing::instrument(skip(state, headers))]
pub async fn session_details<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    require_master_key(&state, &headers)?;

    let session = state
        .engine
        .session_details(SessionId::from_uuid(id))
        .await?;

    Ok(Json(SessionView::from_session(&session)))
}

/// POST /guarantee/confirm-booking — booking outcome from the calendar
/// workflow. Informational only; guarantee state is never mutated here.
#[tracing::instrument(skip(state, headers, body))]
pub async fn confirm_booking<S, H>(
    State(state): State<Arc<AppState<S, H>>>,
    headers: HeaderMap,
    Json(body): Json<ConfirmBookingBody>,
) -> Result<Json<ConfirmBookingResponse>, ApiError>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    require_master_key(&state, &headers)?;

    let session_id = SessionId::from_uuid(body.session_id);
    let session = state.engine.session_details(session_id).await?;

    tracing::info!(
        session_id = %session.id,
        booking_status = %body.status,
        message = body.message.as_deref().unwrap_or(""),
        "booking workflow reported an outcome"
    );

    Ok(Json(ConfirmBookingResponse {
        received: true,
        session_id: session.id.to_string(),
    }))
}
