//! The guarantee session lifecycle engine.

use chrono::{NaiveDate, Utc};
use common::{MerchantId, SessionId};
use domain::{
    CustomerDetails, Eligibility, GuaranteeConfig, GuaranteeSession, NoshowCharge, ReservationId,
    ReservationSlot, SessionStatus, creation_effects, evaluate, validation_effects,
};
use session_store::{GuaranteeStore, SessionUpdate, StoreError};

use crate::dispatch::{DispatchReport, EffectDispatcher};
use crate::error::{LifecycleError, Result};
use crate::services::booking::BookingHandoff;
use crate::services::notify::Notifier;
use crate::services::payment::{
    OffSessionCharge, PaymentGateway, SetupCheckout, SetupCheckoutRequest,
};

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base URL of the customer-facing app, used to build guarantee links
    /// and checkout redirect URLs.
    pub public_base_url: String,
}

impl EngineSettings {
    /// Creates settings for the given public base URL.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
        }
    }

    /// Customer-facing guarantee page for a session.
    pub fn guarantee_url(&self, session_id: SessionId) -> String {
        format!(
            "{}/guarantee/{}",
            self.public_base_url.trim_end_matches('/'),
            session_id
        )
    }
}

/// Input for session creation.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Merchant-scoped reservation key.
    pub reservation_id: ReservationId,

    /// Customer snapshot.
    pub customer: CustomerDetails,

    /// Party size.
    pub nb_persons: u32,

    /// Reserved time window.
    pub slot: ReservationSlot,
}

/// Outcome of a session-creation request.
#[derive(Debug)]
pub enum CreateSessionOutcome {
    /// The merchant's rule-set does not require a guarantee here.
    NotRequired { eligibility: Eligibility },

    /// A session already exists for this reservation; nothing was created.
    AlreadyExists {
        session: GuaranteeSession,
        guarantee_url: String,
    },

    /// A new pending session with an open card-setup checkout.
    Created {
        session: GuaranteeSession,
        guarantee_url: String,
        notifications: DispatchReport,
    },
}

/// Outcome of a checkout-completion webhook.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// The session was already validated; nothing was re-processed.
    AlreadyValidated { session: GuaranteeSession },

    /// The session moved to validated.
    Validated {
        session: GuaranteeSession,
        notifications: DispatchReport,
    },
}

/// Staff attendance marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attendance {
    /// The customer showed up.
    Attended,

    /// The customer did not show up; charge the penalty.
    Noshow,
}

/// Outcome of an attendance marking.
#[derive(Debug)]
pub enum AttendanceOutcome {
    /// Attended: session closed without a charge.
    Completed { session: GuaranteeSession },

    /// No-show penalty charged.
    Charged {
        session: GuaranteeSession,
        charge: NoshowCharge,
    },

    /// No-show penalty attempted and failed; the attempt is recorded.
    ChargeFailed {
        session: GuaranteeSession,
        charge: NoshowCharge,
    },
}

/// Outcome of a resend-link request.
#[derive(Debug)]
pub struct ResendOutcome {
    pub session: GuaranteeSession,
    pub guarantee_url: String,
    pub notifications: DispatchReport,
}

/// A fresh customer-facing checkout.
#[derive(Debug)]
pub struct PublicCheckout {
    pub session: GuaranteeSession,
    pub checkout_url: String,
}

/// Dashboard period selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Week,
    Month,
}

impl Period {
    /// Parses the query-string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "today" => Some(Period::Today),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            _ => None,
        }
    }

    fn days_ahead(&self) -> i64 {
        match self {
            Period::Today => 0,
            Period::Week => 6,
            Period::Month => 29,
        }
    }
}

/// Merchant dashboard view over a period of upcoming reservations.
#[derive(Debug)]
pub struct DashboardView {
    /// Sessions still waiting on card setup.
    pub pending: Vec<GuaranteeSession>,

    /// Sessions whose card was captured (validated or later).
    pub validated: Vec<GuaranteeSession>,

    /// Sessions whose reservation is today, any status.
    pub today: Vec<GuaranteeSession>,

    /// Share of non-cancelled sessions that reached validation, in percent.
    pub validation_rate: f64,
}

/// Owns the guarantee session state machine.
///
/// All collaborators are injected; the engine holds no global state and
/// reads/writes sessions exclusively through the store.
pub struct GuaranteeEngine<S, P, N, H>
where
    S: GuaranteeStore,
    P: PaymentGateway,
    N: Notifier,
    H: BookingHandoff,
{
    store: S,
    gateway: P,
    dispatcher: EffectDispatcher<N, H>,
    settings: EngineSettings,
}

impl<S, P, N, H> GuaranteeEngine<S, P, N, H>
where
    S: GuaranteeStore,
    P: PaymentGateway,
    N: Notifier,
    H: BookingHandoff,
{
    /// Creates a new engine.
    pub fn new(store: S, gateway: P, notifier: N, handoff: H, settings: EngineSettings) -> Self {
        Self {
            store,
            gateway,
            dispatcher: EffectDispatcher::new(notifier, handoff),
            settings,
        }
    }

    /// Returns the engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Evaluates eligibility for a reservation without side effects.
    ///
    /// Logs a warning when the config claims `enabled` without a
    /// charge-capable account, since that combination silently evaluates
    /// as not required.
    pub fn check_eligibility(
        &self,
        config: &GuaranteeConfig,
        nb_persons: u32,
        date: NaiveDate,
    ) -> Eligibility {
        if config.enabled && !config.charge_ready() {
            tracing::warn!(
                merchant_id = %config.merchant_id,
                "guarantee enabled without a charge-capable account; treating as disabled"
            );
        }
        evaluate(config, nb_persons, date)
    }

    /// Creates a guarantee session for a reservation, idempotently.
    #[tracing::instrument(skip(self, config, request), fields(merchant_id = %config.merchant_id, reservation_id = %request.reservation_id))]
    pub async fn create_session(
        &self,
        config: &GuaranteeConfig,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionOutcome> {
        // Idempotency first: a replayed reservation returns the existing
        // session without touching the processor.
        if let Some(session) = self
            .store
            .session_by_reservation(config.merchant_id, &request.reservation_id)
            .await?
        {
            let guarantee_url = self.settings.guarantee_url(session.id);
            return Ok(CreateSessionOutcome::AlreadyExists {
                session,
                guarantee_url,
            });
        }

        let eligibility = self.check_eligibility(config, request.nb_persons, request.slot.date);
        if !eligibility.required {
            return Ok(CreateSessionOutcome::NotRequired { eligibility });
        }

        let mut session = GuaranteeSession::create(
            config.merchant_id,
            request.reservation_id.clone(),
            request.customer,
            request.nb_persons,
            request.slot,
            config.penalty_per_person,
            Utc::now(),
        )?;

        let checkout = self.open_checkout(config, &session).await?;
        session.payment.checkout_session_id = Some(checkout.checkout_session_id);
        session.payment.setup_intent_id = checkout.setup_intent_id;

        match self.store.insert_session(session.clone()).await {
            Ok(()) => {}
            Err(StoreError::DuplicateReservation { .. }) => {
                // Lost a creation race; hand back the winner.
                let session = self
                    .store
                    .session_by_reservation(config.merchant_id, &request.reservation_id)
                    .await?
                    .ok_or(LifecycleError::SessionNotFound(session.id))?;
                let guarantee_url = self.settings.guarantee_url(session.id);
                return Ok(CreateSessionOutcome::AlreadyExists {
                    session,
                    guarantee_url,
                });
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("guarantee_sessions_created_total").increment(1);

        let guarantee_url = self.settings.guarantee_url(session.id);
        let effects = creation_effects(config, &session);
        let notifications = self
            .dispatcher
            .run(&effects, config, &session, &guarantee_url)
            .await;

        Ok(CreateSessionOutcome::Created {
            session,
            guarantee_url,
            notifications,
        })
    }

    /// Handles a checkout-completion webhook.
    ///
    /// Completion is re-verified against the connected account; the webhook
    /// payload is only a hint. Replays on an already-validated session are
    /// no-op successes.
    #[tracing::instrument(skip(self))]
    pub async fn handle_checkout_completed(
        &self,
        checkout_session_id: &str,
    ) -> Result<ValidationOutcome> {
        let session = self
            .store
            .session_by_checkout(checkout_session_id)
            .await?
            .ok_or_else(|| {
                LifecycleError::UnknownCheckoutSession(checkout_session_id.to_string())
            })?;

        if session.status == SessionStatus::Validated {
            return Ok(ValidationOutcome::AlreadyValidated { session });
        }
        session.ensure(session.status.can_validate(), "validate")?;

        let config = self
            .store
            .config_for_merchant(session.merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;
        let account_id = config
            .connected_account_id
            .clone()
            .ok_or(LifecycleError::NoConnectedAccount)?;

        let state = self
            .gateway
            .retrieve_checkout(&account_id, checkout_session_id)
            .await?;
        if !state.completed {
            return Err(LifecycleError::CheckoutNotComplete);
        }

        let mut update = SessionUpdate::to(SessionStatus::Validated)
            .with_captured_payment(state.payment_method_id, state.customer_ref)
            .validated(Utc::now());
        update.setup_intent_id = state.setup_intent_id;

        let session = match self
            .store
            .transition(session.id, SessionStatus::Pending, update)
            .await
        {
            Ok(session) => session,
            Err(StoreError::StatusConflict {
                actual: SessionStatus::Validated,
                session_id,
                ..
            }) => {
                // A concurrent webhook delivery won; report success.
                let session = self
                    .store
                    .session(session_id)
                    .await?
                    .ok_or(LifecycleError::SessionNotFound(session_id))?;
                return Ok(ValidationOutcome::AlreadyValidated { session });
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("guarantee_sessions_validated_total").increment(1);
        tracing::info!(session_id = %session.id, "guarantee session validated");

        let guarantee_url = self.settings.guarantee_url(session.id);
        let effects = validation_effects(&config, &session);
        let notifications = self
            .dispatcher
            .run(&effects, &config, &session, &guarantee_url)
            .await;

        Ok(ValidationOutcome::Validated {
            session,
            notifications,
        })
    }

    /// Records attendance for a validated session, charging the penalty on
    /// a no-show.
    #[tracing::instrument(skip(self))]
    pub async fn mark_attendance(
        &self,
        merchant_id: MerchantId,
        session_id: SessionId,
        attendance: Attendance,
    ) -> Result<AttendanceOutcome> {
        let session = self.session_for_merchant(merchant_id, session_id).await?;
        session.ensure(session.status.can_mark_attendance(), "record attendance for")?;

        match attendance {
            Attendance::Attended => {
                let session = self
                    .store
                    .transition(
                        session.id,
                        SessionStatus::Validated,
                        SessionUpdate::to(SessionStatus::Completed),
                    )
                    .await?;
                Ok(AttendanceOutcome::Completed { session })
            }
            Attendance::Noshow => self.charge_noshow(session).await,
        }
    }

    /// Executes the no-show charge for a validated session.
    ///
    /// One attempt, no automatic retry; both outcomes append a charge row
    /// before the status transition so the attempt is never lost.
    async fn charge_noshow(&self, session: GuaranteeSession) -> Result<AttendanceOutcome> {
        let config = self
            .store
            .config_for_merchant(session.merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;
        let account_id = config
            .connected_account_id
            .clone()
            .ok_or(LifecycleError::NoConnectedAccount)?;

        let amount = session.penalty_total();
        let now = Utc::now();

        // Resolve the stored card. A session that validated without a
        // payment method reference falls back to the setup intent.
        let stored = match (
            session.payment.payment_method_id.clone(),
            session.payment.setup_intent_id.as_deref(),
        ) {
            (Some(payment_method_id), _) => Ok((
                payment_method_id,
                session.payment.customer_ref.clone(),
            )),
            (None, Some(setup_intent_id)) => self
                .gateway
                .payment_method_for_setup(&account_id, setup_intent_id)
                .await
                .map(|m| (m.payment_method_id, m.customer_ref)),
            (None, None) => {
                return Err(LifecycleError::MissingPaymentMethod(session.id));
            }
        };

        let charge_start = std::time::Instant::now();
        let attempt = match stored {
            Ok((payment_method_id, customer_ref)) => {
                self.gateway
                    .charge_off_session(&OffSessionCharge {
                        account_id,
                        customer_ref,
                        payment_method_id,
                        amount,
                        currency: config.currency.clone(),
                        description: format!(
                            "No-show penalty for reservation {} at {}",
                            session.reservation_id, config.business_name
                        ),
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        metrics::histogram!("noshow_charge_duration_seconds")
            .record(charge_start.elapsed().as_secs_f64());

        match attempt {
            Ok(result) => {
                let charge = NoshowCharge::succeeded(
                    session.id,
                    session.merchant_id,
                    result.payment_intent_id,
                    amount,
                    config.currency.clone(),
                    now,
                );
                self.store.insert_charge(charge.clone()).await?;

                let session = self
                    .store
                    .transition(
                        session.id,
                        SessionStatus::Validated,
                        SessionUpdate::to(SessionStatus::NoshowCharged).charged(now),
                    )
                    .await?;

                metrics::counter!("noshow_charges_succeeded_total").increment(1);
                tracing::info!(session_id = %session.id, amount = amount.minor(),
                    "no-show penalty charged");
                Ok(AttendanceOutcome::Charged { session, charge })
            }
            Err(e) => {
                let charge = NoshowCharge::failed(
                    session.id,
                    session.merchant_id,
                    amount,
                    config.currency.clone(),
                    e.to_string(),
                    now,
                );
                self.store.insert_charge(charge.clone()).await?;

                let session = self
                    .store
                    .transition(
                        session.id,
                        SessionStatus::Validated,
                        SessionUpdate::to(SessionStatus::NoshowFailed),
                    )
                    .await?;

                metrics::counter!("noshow_charges_failed_total").increment(1);
                tracing::warn!(session_id = %session.id, error = %e,
                    "no-show penalty charge failed");
                Ok(AttendanceOutcome::ChargeFailed { session, charge })
            }
        }
    }

    /// Issues a fresh card-setup link for a pending session and re-sends
    /// the request notifications.
    #[tracing::instrument(skip(self))]
    pub async fn resend_link(
        &self,
        merchant_id: MerchantId,
        session_id: SessionId,
    ) -> Result<ResendOutcome> {
        let session = self.session_for_merchant(merchant_id, session_id).await?;
        session.ensure(session.status.can_resend(), "resend a link for")?;

        let config = self
            .store
            .config_for_merchant(merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;

        let checkout = self.open_checkout(&config, &session).await?;
        let session = self
            .store
            .transition(
                session.id,
                SessionStatus::Pending,
                SessionUpdate::to(SessionStatus::Pending)
                    .with_checkout(checkout.checkout_session_id, checkout.setup_intent_id)
                    .reminded(Utc::now()),
            )
            .await?;

        let guarantee_url = self.settings.guarantee_url(session.id);
        let effects = creation_effects(&config, &session);
        let notifications = self
            .dispatcher
            .run(&effects, &config, &session, &guarantee_url)
            .await;

        Ok(ResendOutcome {
            session,
            guarantee_url,
            notifications,
        })
    }

    /// Cancels a pending session.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_session(
        &self,
        merchant_id: MerchantId,
        session_id: SessionId,
    ) -> Result<GuaranteeSession> {
        let session = self.session_for_merchant(merchant_id, session_id).await?;
        session.ensure(session.status.can_cancel(), "cancel")?;

        let session = self
            .store
            .transition(
                session.id,
                SessionStatus::Pending,
                SessionUpdate::to(SessionStatus::Cancelled),
            )
            .await?;
        Ok(session)
    }

    /// Customer-facing session read; pending sessions past the expiry
    /// window are rejected.
    pub async fn public_session(&self, session_id: SessionId) -> Result<GuaranteeSession> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(LifecycleError::SessionNotFound(session_id))?;

        if session.is_expired(Utc::now()) {
            return Err(LifecycleError::SessionExpired(session_id));
        }

        Ok(session)
    }

    /// Opens (or re-opens) the customer-facing checkout for a pending
    /// session.
    #[tracing::instrument(skip(self))]
    pub async fn public_checkout(&self, session_id: SessionId) -> Result<PublicCheckout> {
        let session = self.public_session(session_id).await?;
        session.ensure(session.status.can_validate(), "open a checkout for")?;

        let config = self
            .store
            .config_for_merchant(session.merchant_id)
            .await?
            .ok_or(LifecycleError::ConfigNotFound)?;

        let checkout = self.open_checkout(&config, &session).await?;
        let checkout_url = checkout.url.clone();
        let session = self
            .store
            .transition(
                session.id,
                SessionStatus::Pending,
                SessionUpdate::to(SessionStatus::Pending)
                    .with_checkout(checkout.checkout_session_id, checkout.setup_intent_id),
            )
            .await?;

        Ok(PublicCheckout {
            session,
            checkout_url,
        })
    }

    /// Loads a session for its owning merchant; other merchants get
    /// not-found, never existence.
    pub async fn session_for_merchant(
        &self,
        merchant_id: MerchantId,
        session_id: SessionId,
    ) -> Result<GuaranteeSession> {
        let session = self
            .store
            .session(session_id)
            .await?
            .filter(|s| s.merchant_id == merchant_id)
            .ok_or(LifecycleError::SessionNotFound(session_id))?;
        Ok(session)
    }

    /// Loads a session for the platform workflow (master-key callers).
    pub async fn session_details(&self, session_id: SessionId) -> Result<GuaranteeSession> {
        self.store
            .session(session_id)
            .await?
            .ok_or(LifecycleError::SessionNotFound(session_id))
    }

    /// Builds the merchant dashboard over upcoming reservations.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard(
        &self,
        merchant_id: MerchantId,
        period: Period,
    ) -> Result<DashboardView> {
        let today = Utc::now().date_naive();
        let to = today + chrono::TimeDelta::days(period.days_ahead());
        let sessions = self
            .store
            .sessions_by_slot_range(merchant_id, today, to)
            .await?;

        let mut pending = Vec::new();
        let mut validated = Vec::new();
        let mut today_sessions = Vec::new();

        for session in sessions {
            if session.slot.date == today {
                today_sessions.push(session.clone());
            }
            match session.status {
                SessionStatus::Pending => pending.push(session),
                SessionStatus::Validated
                | SessionStatus::Completed
                | SessionStatus::NoshowCharged
                | SessionStatus::NoshowFailed => validated.push(session),
                SessionStatus::Cancelled => {}
            }
        }

        let counted = pending.len() + validated.len();
        let validation_rate = if counted == 0 {
            0.0
        } else {
            validated.len() as f64 / counted as f64 * 100.0
        };

        Ok(DashboardView {
            pending,
            validated,
            today: today_sessions,
            validation_rate,
        })
    }

    async fn open_checkout(
        &self,
        config: &GuaranteeConfig,
        session: &GuaranteeSession,
    ) -> Result<SetupCheckout> {
        let account_id = config
            .connected_account_id
            .clone()
            .ok_or(LifecycleError::NoConnectedAccount)?;

        let base = self.settings.guarantee_url(session.id);
        let checkout = self
            .gateway
            .create_setup_checkout(&SetupCheckoutRequest {
                account_id,
                session_id: session.id,
                customer_email: session.customer.email.clone(),
                success_url: format!("{base}?outcome=success"),
                cancel_url: format!("{base}?outcome=cancelled"),
            })
            .await?;
        Ok(checkout)
    }
}
