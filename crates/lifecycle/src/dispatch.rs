//! Best-effort execution of planned lifecycle effects.

use domain::{Effect, GuaranteeConfig, GuaranteeSession, NotificationKind};
use serde::Serialize;

use crate::services::booking::{BookingHandoff, BookingRequest};
use crate::services::notify::{EmailMessage, Notifier, SmsMessage};

/// Outcome of one effect-dispatch pass.
///
/// Always returned to the caller; never turned into a request failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub email_sent: bool,
    pub sms_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_error: Option<String>,
    pub handoff_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_error: Option<String>,
}

/// Executes effects planned by the domain layer.
///
/// Runs after the state write commits; every failure is logged and recorded
/// in the report, none are propagated.
pub struct EffectDispatcher<N, H>
where
    N: Notifier,
    H: BookingHandoff,
{
    notifier: N,
    handoff: H,
}

impl<N, H> EffectDispatcher<N, H>
where
    N: Notifier,
    H: BookingHandoff,
{
    /// Creates a new dispatcher.
    pub fn new(notifier: N, handoff: H) -> Self {
        Self { notifier, handoff }
    }

    /// Runs the given effects for a session.
    ///
    /// `guarantee_url` is the customer-facing link included in card-request
    /// messages.
    #[tracing::instrument(skip(self, effects, config, session), fields(session_id = %session.id))]
    pub async fn run(
        &self,
        effects: &[Effect],
        config: &GuaranteeConfig,
        session: &GuaranteeSession,
        guarantee_url: &str,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for effect in effects {
            match effect {
                Effect::SendEmail(kind) => {
                    self.send_email(*kind, config, session, guarantee_url, &mut report)
                        .await;
                }
                Effect::SendSms(kind) => {
                    self.send_sms(*kind, config, session, guarantee_url, &mut report)
                        .await;
                }
                Effect::TriggerBookingHandoff => {
                    let request = BookingRequest::assemble(config, session);
                    match self.handoff.book(&request).await {
                        Ok(()) => report.handoff_triggered = true,
                        Err(e) => {
                            tracing::warn!(session_id = %session.id, error = %e,
                                "booking hand-off failed");
                            report.handoff_error = Some(e.to_string());
                        }
                    }
                }
            }
        }

        report
    }

    async fn send_email(
        &self,
        kind: NotificationKind,
        config: &GuaranteeConfig,
        session: &GuaranteeSession,
        guarantee_url: &str,
        report: &mut DispatchReport,
    ) {
        let Some(to) = session.customer.email.clone() else {
            return;
        };
        if !self.notifier.email_configured() {
            tracing::debug!(session_id = %session.id, "email channel not configured, skipping");
            return;
        }

        let message = match kind {
            NotificationKind::GuaranteeRequest => EmailMessage {
                to,
                subject: format!(
                    "Card guarantee requested for your reservation at {}",
                    config.business_name
                ),
                body: format!(
                    "Hello {},\n\nPlease secure your reservation of {} at {} \
                     for {} guests by registering a card: {}\n\n\
                     No charge is made unless the reservation is not honoured \
                     ({} per guest).",
                    session.customer.name,
                    session.slot.date,
                    session.slot.time,
                    session.nb_persons,
                    guarantee_url,
                    session.penalty_per_person,
                ),
            },
            NotificationKind::GuaranteeConfirmed => EmailMessage {
                to,
                subject: format!("Your reservation at {} is confirmed", config.business_name),
                body: format!(
                    "Hello {},\n\nYour card was registered and your reservation of {} \
                     at {} for {} guests is confirmed. See you soon!",
                    session.customer.name,
                    session.slot.date,
                    session.slot.time,
                    session.nb_persons,
                ),
            },
        };

        match self.notifier.send_email(message).await {
            Ok(()) => report.email_sent = true,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "email send failed");
                report.email_error = Some(e.to_string());
            }
        }
    }

    async fn send_sms(
        &self,
        kind: NotificationKind,
        config: &GuaranteeConfig,
        session: &GuaranteeSession,
        guarantee_url: &str,
        report: &mut DispatchReport,
    ) {
        let Some(to) = session.customer.phone.clone() else {
            return;
        };
        if !self.notifier.sms_configured() {
            tracing::debug!(session_id = %session.id, "SMS channel not configured, skipping");
            return;
        }

        let body = match kind {
            NotificationKind::GuaranteeRequest => format!(
                "{}: secure your reservation of {} ({} guests): {}",
                config.business_name, session.slot.date, session.nb_persons, guarantee_url,
            ),
            NotificationKind::GuaranteeConfirmed => format!(
                "{}: your reservation of {} at {} is confirmed.",
                config.business_name, session.slot.date, session.slot.time,
            ),
        };

        match self.notifier.send_sms(SmsMessage { to, body }).await {
            Ok(()) => report.sms_sent = true,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "SMS send failed");
                report.sms_error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::booking::InMemoryBookingHandoff;
    use crate::services::notify::InMemoryNotifier;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use common::MerchantId;
    use domain::{CustomerDetails, Money, ReservationId, ReservationSlot};

    fn config_and_session() -> (GuaranteeConfig, GuaranteeSession) {
        let merchant_id = MerchantId::new();
        let config = GuaranteeConfig::new(merchant_id, "Chez Test");
        let session = GuaranteeSession::create(
            merchant_id,
            ReservationId::new("R-1"),
            CustomerDetails::new(
                "Ada",
                Some("ada@example.com".to_string()),
                Some("+33600000000".to_string()),
            ),
            2,
            ReservationSlot::new(
                NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(),
                NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                60,
                "Europe/Paris",
            ),
            Money::from_major(30),
            Utc::now(),
        )
        .unwrap();
        (config, session)
    }

    #[tokio::test]
    async fn test_email_effect_includes_guarantee_url() {
        let (config, session) = config_and_session();
        let notifier = InMemoryNotifier::new();
        let dispatcher = EffectDispatcher::new(notifier.clone(), InMemoryBookingHandoff::new());

        let report = dispatcher
            .run(
                &[Effect::SendEmail(NotificationKind::GuaranteeRequest)],
                &config,
                &session,
                "https://app.test/guarantee/abc",
            )
            .await;

        assert!(report.email_sent);
        let emails = notifier.sent_emails();
        assert_eq!(emails.len(), 1);
        assert!(emails[0].body.contains("https://app.test/guarantee/abc"));
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_propagated() {
        let (config, session) = config_and_session();
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_email(true);
        let dispatcher = EffectDispatcher::new(notifier.clone(), InMemoryBookingHandoff::new());

        let report = dispatcher
            .run(
                &[
                    Effect::SendEmail(NotificationKind::GuaranteeConfirmed),
                    Effect::SendSms(NotificationKind::GuaranteeConfirmed),
                ],
                &config,
                &session,
                "https://app.test/guarantee/abc",
            )
            .await;

        assert!(!report.email_sent);
        assert!(report.email_error.is_some());
        assert!(report.sms_sent);
        assert!(report.sms_error.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_skipped_silently() {
        let (config, session) = config_and_session();
        let notifier = InMemoryNotifier::with_channels(true, false);
        let dispatcher = EffectDispatcher::new(notifier.clone(), InMemoryBookingHandoff::new());

        let report = dispatcher
            .run(
                &[Effect::SendSms(NotificationKind::GuaranteeRequest)],
                &config,
                &session,
                "https://app.test/guarantee/abc",
            )
            .await;

        assert!(!report.sms_sent);
        assert!(report.sms_error.is_none());
        assert!(notifier.sent_sms().is_empty());
    }

    #[tokio::test]
    async fn test_handoff_failure_reported() {
        let (config, session) = config_and_session();
        let handoff = InMemoryBookingHandoff::new();
        handoff.set_fail(true);
        let dispatcher = EffectDispatcher::new(InMemoryNotifier::new(), handoff);

        let report = dispatcher
            .run(
                &[Effect::TriggerBookingHandoff],
                &config,
                &session,
                "https://app.test/guarantee/abc",
            )
            .await;

        assert!(!report.handoff_triggered);
        assert!(report.handoff_error.is_some());
    }
}
