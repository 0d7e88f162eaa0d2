//! Domain layer for the card-guarantee service.
//!
//! This crate provides the core domain types:
//! - Merchant guarantee configuration and the eligibility evaluator
//! - Guarantee session with its status state machine
//! - No-show charge records
//! - Pure effect planning for lifecycle transitions

pub mod guarantee;

pub use guarantee::{
    ApplyToRule, ChargeStatus, CustomerDetails, Effect, Eligibility, EligibilityReason,
    GuaranteeConfig, GuaranteeSession, Money, NoshowCharge, NotificationKind, PENDING_EXPIRY_DAYS,
    PaymentLinkage, ReservationId, ReservationSlot, SessionError, SessionStatus, creation_effects,
    evaluate, validation_effects,
};
