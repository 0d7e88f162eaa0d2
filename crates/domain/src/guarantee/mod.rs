//! Guarantee session domain types.

mod charge;
mod config;
mod effects;
mod eligibility;
mod session;
mod value_objects;

pub use charge::{ChargeStatus, NoshowCharge};
pub use config::{ApplyToRule, GuaranteeConfig};
pub use effects::{Effect, NotificationKind, creation_effects, validation_effects};
pub use eligibility::{Eligibility, EligibilityReason, evaluate};
pub use session::{GuaranteeSession, PENDING_EXPIRY_DAYS, PaymentLinkage, SessionStatus};
pub use value_objects::{CustomerDetails, Money, ReservationId, ReservationSlot};

use thiserror::Error;

/// Errors that can occur during guarantee session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session is not in the expected state for the requested action.
    #[error("Invalid transition: cannot {action} a {current} session")]
    InvalidTransition {
        current: SessionStatus,
        action: &'static str,
    },

    /// Party size must cover at least one guest.
    #[error("Invalid party size: {nb_persons} (must be greater than 0)")]
    InvalidPartySize { nb_persons: u32 },

    /// Penalty amount must be positive to guarantee anything.
    #[error("Invalid penalty amount: {minor} minor units (must be greater than 0)")]
    InvalidPenalty { minor: i64 },
}
