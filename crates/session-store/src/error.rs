use common::{MerchantId, SessionId};
use domain::SessionStatus;
use thiserror::Error;

/// Errors that can occur when interacting with the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session's status advanced since it was read.
    /// The expected status did not match the stored one.
    #[error("Status conflict for session {session_id}: expected {expected}, found {actual}")]
    StatusConflict {
        session_id: SessionId,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    /// The session was not found in the store.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// A session already exists for this merchant-scoped reservation.
    #[error("Reservation {reservation_id} already has a session for merchant {merchant_id}")]
    DuplicateReservation {
        merchant_id: MerchantId,
        reservation_id: String,
    },

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt stored value: {0}")]
    CorruptRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
