use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{MerchantId, SessionId};
use domain::{GuaranteeConfig, GuaranteeSession, NoshowCharge, ReservationId, SessionStatus};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{GuaranteeStore, SessionUpdate},
};

/// In-memory store implementation.
///
/// Backs tests and single-node deployments without a database; provides
/// the same interface and transition semantics as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    configs: Arc<RwLock<HashMap<MerchantId, GuaranteeConfig>>>,
    sessions: Arc<RwLock<HashMap<SessionId, GuaranteeSession>>>,
    charges: Arc<RwLock<Vec<NoshowCharge>>>,
}

impl InMemorySessionStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the total number of charge rows.
    pub async fn charge_count(&self) -> usize {
        self.charges.read().await.len()
    }

    /// Rewrites a session's creation time. Test helper for expiry paths.
    pub async fn backdate_session(&self, id: SessionId, created_at: DateTime<Utc>) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.created_at = created_at;
        }
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        self.configs.write().await.clear();
        self.sessions.write().await.clear();
        self.charges.write().await.clear();
    }
}

#[async_trait]
impl GuaranteeStore for InMemorySessionStore {
    async fn upsert_config(&self, config: GuaranteeConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert(config.merchant_id, config);
        Ok(())
    }

    async fn config_for_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<GuaranteeConfig>> {
        Ok(self.configs.read().await.get(&merchant_id).cloned())
    }

    async fn config_by_api_key(&self, api_key: &str) -> Result<Option<GuaranteeConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .values()
            .find(|c| c.api_key == api_key)
            .cloned())
    }

    async fn config_by_agent(&self, agent_id: &str) -> Result<Option<GuaranteeConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .values()
            .find(|c| c.agent_id == agent_id)
            .cloned())
    }

    async fn insert_session(&self, session: GuaranteeSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        let duplicate = sessions.values().any(|s| {
            s.merchant_id == session.merchant_id && s.reservation_id == session.reservation_id
        });
        if duplicate {
            return Err(StoreError::DuplicateReservation {
                merchant_id: session.merchant_id,
                reservation_id: session.reservation_id.as_str().to_string(),
            });
        }

        sessions.insert(session.id, session);
        Ok(())
    }

    async fn session(&self, id: SessionId) -> Result<Option<GuaranteeSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn session_by_reservation(
        &self,
        merchant_id: MerchantId,
        reservation_id: &ReservationId,
    ) -> Result<Option<GuaranteeSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.merchant_id == merchant_id && &s.reservation_id == reservation_id)
            .cloned())
    }

    async fn session_by_checkout(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<GuaranteeSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.payment.checkout_session_id.as_deref() == Some(checkout_session_id))
            .cloned())
    }

    async fn sessions_by_slot_range(
        &self,
        merchant_id: MerchantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GuaranteeSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| {
                s.merchant_id == merchant_id && s.slot.date >= from && s.slot.date <= to
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.slot.starts_at()));
        Ok(sessions)
    }

    async fn transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        update: SessionUpdate,
    ) -> Result<GuaranteeSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;

        if session.status != expected {
            return Err(StoreError::StatusConflict {
                session_id: id,
                expected,
                actual: session.status,
            });
        }

        session.status = update.status;
        if let Some(checkout) = update.checkout_session_id {
            session.payment.checkout_session_id = Some(checkout);
        }
        if let Some(setup_intent) = update.setup_intent_id {
            session.payment.setup_intent_id = Some(setup_intent);
        }
        if let Some(method) = update.payment_method_id {
            session.payment.payment_method_id = Some(method);
        }
        if let Some(customer_ref) = update.customer_ref {
            session.payment.customer_ref = Some(customer_ref);
        }
        if let Some(at) = update.validated_at {
            session.validated_at = Some(at);
        }
        if let Some(at) = update.charged_at {
            session.charged_at = Some(at);
        }
        if let Some(at) = update.reminder_sent_at {
            session.reminder_count += 1;
            session.last_reminder_at = Some(at);
        }

        Ok(session.clone())
    }

    async fn insert_charge(&self, charge: NoshowCharge) -> Result<()> {
        self.charges.write().await.push(charge);
        Ok(())
    }

    async fn charges_for_session(&self, session_id: SessionId) -> Result<Vec<NoshowCharge>> {
        let mut charges: Vec<_> = self
            .charges
            .read()
            .await
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.created_at);
        Ok(charges)
    }
}
