use async_trait::async_trait;
use chrono::NaiveDate;
use common::{MerchantId, SessionId};
use domain::{
    ApplyToRule, ChargeStatus, CustomerDetails, GuaranteeConfig, GuaranteeSession, Money,
    NoshowCharge, PaymentLinkage, ReservationId, ReservationSlot, SessionStatus,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{GuaranteeStore, SessionUpdate},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_config(row: PgRow) -> Result<GuaranteeConfig> {
        Ok(GuaranteeConfig {
            merchant_id: MerchantId::from_uuid(row.try_get::<Uuid, _>("merchant_id")?),
            enabled: row.try_get("enabled")?,
            penalty_per_person: Money::from_minor(row.try_get("penalty_per_person")?),
            cancellation_delay_hours: row.try_get::<i32, _>("cancellation_delay_hours")? as u32,
            apply_to: parse_apply_to(row.try_get("apply_to")?)?,
            min_persons: row.try_get::<i32, _>("min_persons")? as u32,
            connected_account_id: row.try_get("connected_account_id")?,
            account_charges_enabled: row.try_get("account_charges_enabled")?,
            currency: row.try_get("currency")?,
            business_name: row.try_get("business_name")?,
            business_email: row.try_get("business_email")?,
            business_phone: row.try_get("business_phone")?,
            agent_id: row.try_get("agent_id")?,
            api_key: row.try_get("api_key")?,
            auto_send_email_on_create: row.try_get("auto_send_email_on_create")?,
            auto_send_sms_on_create: row.try_get("auto_send_sms_on_create")?,
            auto_send_email_on_validation: row.try_get("auto_send_email_on_validation")?,
            auto_send_sms_on_validation: row.try_get("auto_send_sms_on_validation")?,
            sms_enabled: row.try_get("sms_enabled")?,
        })
    }

    fn row_to_session(row: PgRow) -> Result<GuaranteeSession> {
        Ok(GuaranteeSession {
            id: SessionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            merchant_id: MerchantId::from_uuid(row.try_get::<Uuid, _>("merchant_id")?),
            reservation_id: ReservationId::new(row.try_get::<String, _>("reservation_id")?),
            customer: CustomerDetails {
                name: row.try_get("customer_name")?,
                email: row.try_get("customer_email")?,
                phone: row.try_get("customer_phone")?,
            },
            nb_persons: row.try_get::<i32, _>("nb_persons")? as u32,
            slot: ReservationSlot {
                date: row.try_get("slot_date")?,
                time: row.try_get("slot_time")?,
                duration_minutes: row.try_get::<i32, _>("duration_minutes")? as u32,
                timezone: row.try_get("timezone")?,
            },
            status: parse_status(row.try_get("status")?)?,
            payment: PaymentLinkage {
                checkout_session_id: row.try_get("checkout_session_id")?,
                setup_intent_id: row.try_get("setup_intent_id")?,
                payment_method_id: row.try_get("payment_method_id")?,
                customer_ref: row.try_get("customer_ref")?,
            },
            penalty_per_person: Money::from_minor(row.try_get("penalty_per_person")?),
            reminder_count: row.try_get::<i32, _>("reminder_count")? as u32,
            last_reminder_at: row.try_get("last_reminder_at")?,
            created_at: row.try_get("created_at")?,
            validated_at: row.try_get("validated_at")?,
            charged_at: row.try_get("charged_at")?,
        })
    }

    fn row_to_charge(row: PgRow) -> Result<NoshowCharge> {
        Ok(NoshowCharge {
            id: row.try_get("id")?,
            session_id: SessionId::from_uuid(row.try_get::<Uuid, _>("session_id")?),
            merchant_id: MerchantId::from_uuid(row.try_get::<Uuid, _>("merchant_id")?),
            payment_intent_id: row.try_get("payment_intent_id")?,
            amount: Money::from_minor(row.try_get("amount")?),
            currency: row.try_get("currency")?,
            status: parse_charge_status(row.try_get("status")?)?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "pending" => Ok(SessionStatus::Pending),
        "validated" => Ok(SessionStatus::Validated),
        "completed" => Ok(SessionStatus::Completed),
        "cancelled" => Ok(SessionStatus::Cancelled),
        "noshow_charged" => Ok(SessionStatus::NoshowCharged),
        "noshow_failed" => Ok(SessionStatus::NoshowFailed),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown session status '{other}'"
        ))),
    }
}

fn parse_apply_to(s: &str) -> Result<ApplyToRule> {
    match s {
        "all" => Ok(ApplyToRule::All),
        "min_persons" => Ok(ApplyToRule::MinPersons),
        "weekend" => Ok(ApplyToRule::Weekend),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown apply_to rule '{other}'"
        ))),
    }
}

fn parse_charge_status(s: &str) -> Result<ChargeStatus> {
    match s {
        "succeeded" => Ok(ChargeStatus::Succeeded),
        "failed" => Ok(ChargeStatus::Failed),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown charge status '{other}'"
        ))),
    }
}

const SESSION_COLUMNS: &str = "id, merchant_id, reservation_id, customer_name, customer_email, \
     customer_phone, nb_persons, slot_date, slot_time, duration_minutes, timezone, status, \
     checkout_session_id, setup_intent_id, payment_method_id, customer_ref, penalty_per_person, \
     reminder_count, last_reminder_at, created_at, validated_at, charged_at";

#[async_trait]
impl GuaranteeStore for PostgresSessionStore {
    async fn upsert_config(&self, config: GuaranteeConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guarantee_configs (
                merchant_id, enabled, penalty_per_person, cancellation_delay_hours,
                apply_to, min_persons, connected_account_id, account_charges_enabled,
                currency, business_name, business_email, business_phone, agent_id,
                api_key, auto_send_email_on_create, auto_send_sms_on_create,
                auto_send_email_on_validation, auto_send_sms_on_validation, sms_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (merchant_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                penalty_per_person = EXCLUDED.penalty_per_person,
                cancellation_delay_hours = EXCLUDED.cancellation_delay_hours,
                apply_to = EXCLUDED.apply_to,
                min_persons = EXCLUDED.min_persons,
                connected_account_id = EXCLUDED.connected_account_id,
                account_charges_enabled = EXCLUDED.account_charges_enabled,
                currency = EXCLUDED.currency,
                business_name = EXCLUDED.business_name,
                business_email = EXCLUDED.business_email,
                business_phone = EXCLUDED.business_phone,
                agent_id = EXCLUDED.agent_id,
                api_key = EXCLUDED.api_key,
                auto_send_email_on_create = EXCLUDED.auto_send_email_on_create,
                auto_send_sms_on_create = EXCLUDED.auto_send_sms_on_create,
                auto_send_email_on_validation = EXCLUDED.auto_send_email_on_validation,
                auto_send_sms_on_validation = EXCLUDED.auto_send_sms_on_validation,
                sms_enabled = EXCLUDED.sms_enabled
            "#,
        )
        .bind(config.merchant_id.as_uuid())
        .bind(config.enabled)
        .bind(config.penalty_per_person.minor())
        .bind(config.cancellation_delay_hours as i32)
        .bind(config.apply_to.as_str())
        .bind(config.min_persons as i32)
        .bind(&config.connected_account_id)
        .bind(config.account_charges_enabled)
        .bind(&config.currency)
        .bind(&config.business_name)
        .bind(&config.business_email)
        .bind(&config.business_phone)
        .bind(&config.agent_id)
        .bind(&config.api_key)
        .bind(config.auto_send_email_on_create)
        .bind(config.auto_send_sms_on_create)
        .bind(config.auto_send_email_on_validation)
        .bind(config.auto_send_sms_on_validation)
        .bind(config.sms_enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn config_for_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<GuaranteeConfig>> {
        let row = sqlx::query("SELECT * FROM guarantee_configs WHERE merchant_id = $1")
            .bind(merchant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_config).transpose()
    }

    async fn config_by_api_key(&self, api_key: &str) -> Result<Option<GuaranteeConfig>> {
        let row = sqlx::query("SELECT * FROM guarantee_configs WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_config).transpose()
    }

    async fn config_by_agent(&self, agent_id: &str) -> Result<Option<GuaranteeConfig>> {
        let row = sqlx::query("SELECT * FROM guarantee_configs WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_config).transpose()
    }

    async fn insert_session(&self, session: GuaranteeSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guarantee_sessions (
                id, merchant_id, reservation_id, customer_name, customer_email,
                customer_phone, nb_persons, slot_date, slot_time, duration_minutes,
                timezone, status, checkout_session_id, setup_intent_id,
                payment_method_id, customer_ref, penalty_per_person, reminder_count,
                last_reminder_at, created_at, validated_at, charged_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.merchant_id.as_uuid())
        .bind(session.reservation_id.as_str())
        .bind(&session.customer.name)
        .bind(&session.customer.email)
        .bind(&session.customer.phone)
        .bind(session.nb_persons as i32)
        .bind(session.slot.date)
        .bind(session.slot.time)
        .bind(session.slot.duration_minutes as i32)
        .bind(&session.slot.timezone)
        .bind(session.status.as_str())
        .bind(&session.payment.checkout_session_id)
        .bind(&session.payment.setup_intent_id)
        .bind(&session.payment.payment_method_id)
        .bind(&session.payment.customer_ref)
        .bind(session.penalty_per_person.minor())
        .bind(session.reminder_count as i32)
        .bind(session.last_reminder_at)
        .bind(session.created_at)
        .bind(session.validated_at)
        .bind(session.charged_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_merchant_reservation")
            {
                return StoreError::DuplicateReservation {
                    merchant_id: session.merchant_id,
                    reservation_id: session.reservation_id.as_str().to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn session(&self, id: SessionId) -> Result<Option<GuaranteeSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM guarantee_sessions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn session_by_reservation(
        &self,
        merchant_id: MerchantId,
        reservation_id: &ReservationId,
    ) -> Result<Option<GuaranteeSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM guarantee_sessions \
             WHERE merchant_id = $1 AND reservation_id = $2"
        ))
        .bind(merchant_id.as_uuid())
        .bind(reservation_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn session_by_checkout(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<GuaranteeSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM guarantee_sessions WHERE checkout_session_id = $1"
        ))
        .bind(checkout_session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn sessions_by_slot_range(
        &self,
        merchant_id: MerchantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GuaranteeSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM guarantee_sessions \
             WHERE merchant_id = $1 AND slot_date >= $2 AND slot_date <= $3 \
             ORDER BY slot_date DESC, slot_time DESC"
        ))
        .bind(merchant_id.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_session).collect()
    }

    async fn transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        update: SessionUpdate,
    ) -> Result<GuaranteeSession> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE guarantee_sessions SET
                status = $3,
                checkout_session_id = COALESCE($4, checkout_session_id),
                setup_intent_id = COALESCE($5, setup_intent_id),
                payment_method_id = COALESCE($6, payment_method_id),
                customer_ref = COALESCE($7, customer_ref),
                validated_at = COALESCE($8, validated_at),
                charged_at = COALESCE($9, charged_at),
                reminder_count = reminder_count + $10,
                last_reminder_at = COALESCE($11, last_reminder_at)
            WHERE id = $1 AND status = $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(&update.checkout_session_id)
        .bind(&update.setup_intent_id)
        .bind(&update.payment_method_id)
        .bind(&update.customer_ref)
        .bind(update.validated_at)
        .bind(update.charged_at)
        .bind(if update.reminder_sent_at.is_some() { 1i32 } else { 0i32 })
        .bind(update.reminder_sent_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_session(row);
        }

        // No row matched: the session is gone or its status moved on.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM guarantee_sessions WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match current {
            Some(actual) => Err(StoreError::StatusConflict {
                session_id: id,
                expected,
                actual: parse_status(&actual)?,
            }),
            None => Err(StoreError::SessionNotFound(id)),
        }
    }

    async fn insert_charge(&self, charge: NoshowCharge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO noshow_charges (
                id, session_id, merchant_id, payment_intent_id, amount, currency,
                status, failure_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(charge.id)
        .bind(charge.session_id.as_uuid())
        .bind(charge.merchant_id.as_uuid())
        .bind(&charge.payment_intent_id)
        .bind(charge.amount.minor())
        .bind(&charge.currency)
        .bind(charge.status.as_str())
        .bind(&charge.failure_reason)
        .bind(charge.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn charges_for_session(&self, session_id: SessionId) -> Result<Vec<NoshowCharge>> {
        let rows = sqlx::query(
            "SELECT id, session_id, merchant_id, payment_intent_id, amount, currency, \
             status, failure_reason, created_at \
             FROM noshow_charges WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_charge).collect()
    }
}
