//! Outbound booking hand-off to the calendar workflow.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use common::SessionId;
use domain::{GuaranteeConfig, GuaranteeSession};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the booking hand-off.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The workflow endpoint could not be reached.
    #[error("Booking workflow unreachable: {0}")]
    Transport(String),

    /// The workflow endpoint answered with a non-success status.
    #[error("Booking workflow rejected the request: {0}")]
    Rejected(String),
}

/// Payload POSTed to the booking workflow after validation.
///
/// Carries enough context for the workflow to book the real-world
/// appointment without calling back: customer, reservation window,
/// merchant contact/branding, toggles, and the merchant's own API key.
#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub session_id: SessionId,
    pub reservation_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub nb_persons: u32,
    pub date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub timezone: String,
    pub business_name: String,
    pub business_email: Option<String>,
    pub business_phone: Option<String>,
    pub auto_send_email_on_validation: bool,
    pub auto_send_sms_on_validation: bool,
    pub sms_enabled: bool,
    pub api_key: String,
}

impl BookingRequest {
    /// Assembles the hand-off payload from a validated session and its
    /// merchant's configuration.
    pub fn assemble(config: &GuaranteeConfig, session: &GuaranteeSession) -> Self {
        Self {
            session_id: session.id,
            reservation_id: session.reservation_id.as_str().to_string(),
            customer_name: session.customer.name.clone(),
            customer_email: session.customer.email.clone(),
            customer_phone: session.customer.phone.clone(),
            nb_persons: session.nb_persons,
            date: session.slot.date,
            starts_at: session.slot.starts_at(),
            ends_at: session.slot.ends_at(),
            timezone: session.slot.timezone.clone(),
            business_name: config.business_name.clone(),
            business_email: config.business_email.clone(),
            business_phone: config.business_phone.clone(),
            auto_send_email_on_validation: config.auto_send_email_on_validation,
            auto_send_sms_on_validation: config.auto_send_sms_on_validation,
            sms_enabled: config.sms_enabled,
            api_key: config.api_key.clone(),
        }
    }
}

/// Trait for the outbound booking hand-off.
#[async_trait]
pub trait BookingHandoff: Send + Sync {
    /// POSTs the booking request to the workflow endpoint.
    async fn book(&self, request: &BookingRequest) -> Result<(), HandoffError>;
}

/// HTTP hand-off posting to a fixed workflow endpoint.
#[derive(Debug, Clone)]
pub struct HttpBookingHandoff {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBookingHandoff {
    /// Creates a hand-off for the given workflow endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BookingHandoff for HttpBookingHandoff {
    async fn book(&self, request: &BookingRequest) -> Result<(), HandoffError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| HandoffError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HandoffError::Rejected(format!(
                "status {}",
                response.status()
            )))
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryHandoffState {
    requests: Vec<BookingRequest>,
    fail: bool,
}

/// In-memory hand-off for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingHandoff {
    state: Arc<RwLock<InMemoryHandoffState>>,
}

impl InMemoryBookingHandoff {
    /// Creates a new in-memory hand-off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the next calls to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns all received booking requests.
    pub fn requests(&self) -> Vec<BookingRequest> {
        self.state.read().unwrap().requests.clone()
    }
}

#[async_trait]
impl BookingHandoff for InMemoryBookingHandoff {
    async fn book(&self, request: &BookingRequest) -> Result<(), HandoffError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(HandoffError::Transport("connection refused".to_string()));
        }
        state.requests.push(request.clone());
        Ok(())
    }
}
