//! Guarantee session and its status state machine.

use chrono::{DateTime, TimeDelta, Utc};
use common::{MerchantId, SessionId};
use serde::{Deserialize, Serialize};

use super::{CustomerDetails, Money, ReservationId, ReservationSlot, SessionError};

/// How long a pending session stays actionable on public endpoints.
pub const PENDING_EXPIRY_DAYS: i64 = 7;

/// The state of a guarantee session in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Validated ──┬──► Completed
///           │                ├──► NoshowCharged
///           │                └──► NoshowFailed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the customer to complete card setup.
    #[default]
    Pending,

    /// Card captured and verified; reservation is guaranteed.
    Validated,

    /// Customer attended; no charge (terminal state).
    Completed,

    /// Cancelled before validation (terminal state).
    Cancelled,

    /// No-show penalty charged successfully (terminal state).
    NoshowCharged,

    /// No-show penalty charge was attempted and declined (terminal state).
    NoshowFailed,
}

impl SessionStatus {
    /// Returns true if the session can still be validated from this state.
    pub fn can_validate(&self) -> bool {
        matches!(self, SessionStatus::Pending)
    }

    /// Returns true if a fresh card-setup link can be issued in this state.
    pub fn can_resend(&self) -> bool {
        matches!(self, SessionStatus::Pending)
    }

    /// Returns true if the session can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, SessionStatus::Pending)
    }

    /// Returns true if staff can record attendance in this state.
    pub fn can_mark_attendance(&self) -> bool {
        matches!(self, SessionStatus::Validated)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Cancelled
                | SessionStatus::NoshowCharged
                | SessionStatus::NoshowFailed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Validated => "validated",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoshowCharged => "noshow_charged",
            SessionStatus::NoshowFailed => "noshow_failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// References into the payment processor, all scoped to the merchant's
/// connected account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkage {
    /// Hosted checkout session collecting the card.
    pub checkout_session_id: Option<String>,

    /// Setup intent storing the card without charging it.
    pub setup_intent_id: Option<String>,

    /// Stored payment method, captured at validation.
    pub payment_method_id: Option<String>,

    /// Processor-side customer record, captured at validation.
    pub customer_ref: Option<String>,
}

/// One reservation's card-guarantee record.
///
/// Created by the eligibility flow, mutated only through lifecycle
/// transitions, never hard-deleted (charge audit trail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeSession {
    /// Unique session identifier.
    pub id: SessionId,

    /// Owning merchant.
    pub merchant_id: MerchantId,

    /// Merchant-scoped reservation key; unique per merchant.
    pub reservation_id: ReservationId,

    /// Customer snapshot taken at creation.
    pub customer: CustomerDetails,

    /// Party size; multiplies the penalty on a no-show.
    pub nb_persons: u32,

    /// Reserved time window.
    pub slot: ReservationSlot,

    /// Current lifecycle state.
    pub status: SessionStatus,

    /// Processor references.
    pub payment: PaymentLinkage,

    /// Penalty per guest snapshotted at creation; later config edits
    /// never change what an existing session charges.
    pub penalty_per_person: Money,

    /// How many card-request reminders have been sent.
    pub reminder_count: u32,

    /// When the last reminder went out.
    pub last_reminder_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// When the card guarantee was validated.
    pub validated_at: Option<DateTime<Utc>>,

    /// When the no-show penalty was charged.
    pub charged_at: Option<DateTime<Utc>>,
}

impl GuaranteeSession {
    /// Creates a new pending session.
    pub fn create(
        merchant_id: MerchantId,
        reservation_id: ReservationId,
        customer: CustomerDetails,
        nb_persons: u32,
        slot: ReservationSlot,
        penalty_per_person: Money,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if nb_persons == 0 {
            return Err(SessionError::InvalidPartySize { nb_persons });
        }
        if !penalty_per_person.is_positive() {
            return Err(SessionError::InvalidPenalty {
                minor: penalty_per_person.minor(),
            });
        }

        Ok(Self {
            id: SessionId::new(),
            merchant_id,
            reservation_id,
            customer,
            nb_persons,
            slot,
            status: SessionStatus::Pending,
            payment: PaymentLinkage::default(),
            penalty_per_person,
            reminder_count: 0,
            last_reminder_at: None,
            created_at,
            validated_at: None,
            charged_at: None,
        })
    }

    /// Total penalty for this session, from the creation-time snapshot.
    pub fn penalty_total(&self) -> Money {
        self.penalty_per_person.multiply(self.nb_persons)
    }

    /// Returns true when a still-pending session has outlived the public
    /// checkout window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Pending
            && now - self.created_at > TimeDelta::days(PENDING_EXPIRY_DAYS)
    }

    /// Checks that `action` is legal from the current state.
    pub fn ensure(
        &self,
        allowed: bool,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if allowed {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                current: self.status,
                action,
            })
        }
    }
}
