use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{MerchantId, SessionId};
use domain::{GuaranteeConfig, GuaranteeSession, NoshowCharge, ReservationId, SessionStatus};

use crate::Result;

/// Fields written together with a status transition.
///
/// `None` fields keep their stored value; the target status is always
/// written. Reminder bumps increment the counter and stamp the send time.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    /// Target status.
    pub status: SessionStatus,

    /// New hosted checkout session id.
    pub checkout_session_id: Option<String>,

    /// New setup intent id.
    pub setup_intent_id: Option<String>,

    /// Stored payment method captured at validation.
    pub payment_method_id: Option<String>,

    /// Processor customer record captured at validation.
    pub customer_ref: Option<String>,

    /// Validation timestamp.
    pub validated_at: Option<DateTime<Utc>>,

    /// Charge timestamp.
    pub charged_at: Option<DateTime<Utc>>,

    /// When set, increments `reminder_count` and stores this as
    /// `last_reminder_at`.
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    /// Creates an update that only moves the session to `status`.
    pub fn to(status: SessionStatus) -> Self {
        Self {
            status,
            checkout_session_id: None,
            setup_intent_id: None,
            payment_method_id: None,
            customer_ref: None,
            validated_at: None,
            charged_at: None,
            reminder_sent_at: None,
        }
    }

    /// Attaches a fresh checkout session and setup intent.
    pub fn with_checkout(
        mut self,
        checkout_session_id: impl Into<String>,
        setup_intent_id: Option<String>,
    ) -> Self {
        self.checkout_session_id = Some(checkout_session_id.into());
        self.setup_intent_id = setup_intent_id;
        self
    }

    /// Attaches the captured payment method and customer record.
    pub fn with_captured_payment(
        mut self,
        payment_method_id: Option<String>,
        customer_ref: Option<String>,
    ) -> Self {
        self.payment_method_id = payment_method_id;
        self.customer_ref = customer_ref;
        self
    }

    /// Stamps the validation time.
    pub fn validated(mut self, at: DateTime<Utc>) -> Self {
        self.validated_at = Some(at);
        self
    }

    /// Stamps the charge time.
    pub fn charged(mut self, at: DateTime<Utc>) -> Self {
        self.charged_at = Some(at);
        self
    }

    /// Records a reminder send.
    pub fn reminded(mut self, at: DateTime<Utc>) -> Self {
        self.reminder_sent_at = Some(at);
        self
    }
}

/// Core trait for guarantee store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Sessions are never
/// deleted; status transitions use an optimistic expected-status check.
#[async_trait]
pub trait GuaranteeStore: Send + Sync {
    /// Inserts or replaces a merchant's guarantee configuration.
    async fn upsert_config(&self, config: GuaranteeConfig) -> Result<()>;

    /// Returns a merchant's configuration, if any.
    async fn config_for_merchant(&self, merchant_id: MerchantId)
    -> Result<Option<GuaranteeConfig>>;

    /// Looks up a configuration by its merchant-scoped API key.
    async fn config_by_api_key(&self, api_key: &str) -> Result<Option<GuaranteeConfig>>;

    /// Looks up a configuration by its public agent handle.
    async fn config_by_agent(&self, agent_id: &str) -> Result<Option<GuaranteeConfig>>;

    /// Inserts a new session.
    ///
    /// Fails with `DuplicateReservation` if the merchant already has a
    /// session for the same reservation id.
    async fn insert_session(&self, session: GuaranteeSession) -> Result<()>;

    /// Returns a session by id.
    async fn session(&self, id: SessionId) -> Result<Option<GuaranteeSession>>;

    /// Returns the session holding a merchant-scoped reservation id, if any.
    /// This is the idempotency lookup for session creation.
    async fn session_by_reservation(
        &self,
        merchant_id: MerchantId,
        reservation_id: &ReservationId,
    ) -> Result<Option<GuaranteeSession>>;

    /// Returns the session tied to a hosted checkout session, if any.
    async fn session_by_checkout(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<GuaranteeSession>>;

    /// Returns a merchant's sessions whose reservation date falls within
    /// `[from, to]`, newest slot first.
    async fn sessions_by_slot_range(
        &self,
        merchant_id: MerchantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GuaranteeSession>>;

    /// Atomically moves a session from `expected` status to the update's
    /// target, writing the update's fields in the same step.
    ///
    /// Fails with `StatusConflict` if the stored status is no longer
    /// `expected`, and `SessionNotFound` if the session does not exist.
    /// Returns the updated session.
    async fn transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        update: SessionUpdate,
    ) -> Result<GuaranteeSession>;

    /// Appends a no-show charge record. Charge rows are never updated.
    async fn insert_charge(&self, charge: NoshowCharge) -> Result<()>;

    /// Returns all charge attempts for a session, oldest first.
    async fn charges_for_session(&self, session_id: SessionId) -> Result<Vec<NoshowCharge>>;
}
