//! Lifecycle error types.

use common::SessionId;
use domain::SessionError;
use session_store::StoreError;
use thiserror::Error;

use crate::services::payment::GatewayError;

/// Errors that can occur during lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The merchant has no guarantee configuration.
    #[error("Merchant configuration not found")]
    ConfigNotFound,

    /// The session does not exist (or belongs to another merchant).
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// A pending session outlived the public checkout window.
    #[error("Guarantee session {0} has expired")]
    SessionExpired(SessionId),

    /// No session matches the webhook's checkout session id.
    #[error("No session for checkout {0}")]
    UnknownCheckoutSession(String),

    /// The merchant has no connected payment account.
    #[error("No connected payment account")]
    NoConnectedAccount,

    /// The checkout session has not been completed on the processor side.
    #[error("Checkout session is not complete")]
    CheckoutNotComplete,

    /// No stored payment method could be resolved for the session.
    #[error("No stored payment method for session {0}")]
    MissingPaymentMethod(SessionId),

    /// Domain rule violation.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;
