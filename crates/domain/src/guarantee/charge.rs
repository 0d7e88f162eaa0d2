//! No-show charge records.

use chrono::{DateTime, Utc};
use common::{MerchantId, SessionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;

/// Outcome of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// The off-session charge went through.
    Succeeded,

    /// The processor declined or errored.
    Failed,
}

impl ChargeStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Succeeded => "succeeded",
            ChargeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempted no-show penalty charge.
///
/// Rows are append-only: a retry produces a new row, never an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoshowCharge {
    /// Unique charge record identifier.
    pub id: Uuid,

    /// The session this charge belongs to.
    pub session_id: SessionId,

    /// Owning merchant.
    pub merchant_id: MerchantId,

    /// Processor payment intent; absent when the attempt failed before one
    /// was created.
    pub payment_intent_id: Option<String>,

    /// Charged amount in minor units (penalty per person x party size).
    pub amount: Money,

    /// ISO currency code (lowercase).
    pub currency: String,

    /// Outcome of the attempt.
    pub status: ChargeStatus,

    /// Processor decline reason, on failure.
    pub failure_reason: Option<String>,

    /// When the attempt was made.
    pub created_at: DateTime<Utc>,
}

impl NoshowCharge {
    /// Records a successful charge attempt.
    pub fn succeeded(
        session_id: SessionId,
        merchant_id: MerchantId,
        payment_intent_id: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            merchant_id,
            payment_intent_id: Some(payment_intent_id.into()),
            amount,
            currency: currency.into(),
            status: ChargeStatus::Succeeded,
            failure_reason: None,
            created_at,
        }
    }

    /// Records a failed charge attempt.
    pub fn failed(
        session_id: SessionId,
        merchant_id: MerchantId,
        amount: Money,
        currency: impl Into<String>,
        failure_reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            merchant_id,
            payment_intent_id: None,
            amount,
            currency: currency.into(),
            status: ChargeStatus::Failed,
            failure_reason: Some(failure_reason.into()),
            created_at,
        }
    }
}
