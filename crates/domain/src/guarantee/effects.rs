//! Effect planning for lifecycle transitions.
//!
//! Transitions stay pure: they return the side effects they want as values,
//! and the lifecycle dispatcher executes them after the state write commits.

use super::{GuaranteeConfig, GuaranteeSession};

/// Which customer-facing message an effect carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Ask the customer to complete card setup.
    GuaranteeRequest,

    /// Confirm the guarantee is in place.
    GuaranteeConfirmed,
}

/// A side effect requested by a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Send an email to the session's customer.
    SendEmail(NotificationKind),

    /// Send an SMS to the session's customer.
    SendSms(NotificationKind),

    /// POST the booking hand-off to the calendar workflow.
    TriggerBookingHandoff,
}

/// Effects to run after a session is created.
///
/// Gated on the merchant's auto-send toggles and on the customer actually
/// having the contact field for the channel.
pub fn creation_effects(config: &GuaranteeConfig, session: &GuaranteeSession) -> Vec<Effect> {
    let mut effects = Vec::new();

    if config.auto_send_email_on_create && session.customer.email.is_some() {
        effects.push(Effect::SendEmail(NotificationKind::GuaranteeRequest));
    }

    if config.sms_enabled && config.auto_send_sms_on_create && session.customer.phone.is_some() {
        effects.push(Effect::SendSms(NotificationKind::GuaranteeRequest));
    }

    effects
}

/// Effects to run after a session is validated.
///
/// The booking hand-off is always requested; notifications follow the same
/// gating as creation.
pub fn validation_effects(config: &GuaranteeConfig, session: &GuaranteeSession) -> Vec<Effect> {
    let mut effects = Vec::new();

    if config.auto_send_email_on_validation && session.customer.email.is_some() {
        effects.push(Effect::SendEmail(NotificationKind::GuaranteeConfirmed));
    }

    if config.sms_enabled && config.auto_send_sms_on_validation && session.customer.phone.is_some()
    {
        effects.push(Effect::SendSms(NotificationKind::GuaranteeConfirmed));
    }

    effects.push(Effect::TriggerBookingHandoff);

    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guarantee::{CustomerDetails, Money, ReservationId, ReservationSlot};
    use chrono::{NaiveDate, NaiveTime, Utc};
    use common::MerchantId;

    fn config_and_session(
        email: Option<&str>,
        phone: Option<&str>,
    ) -> (GuaranteeConfig, GuaranteeSession) {
        let merchant_id = MerchantId::new();
        let mut config = GuaranteeConfig::new(merchant_id, "Chez Test");
        config.enabled = true;
        config.sms_enabled = true;
        config.auto_send_sms_on_create = true;
        config.auto_send_sms_on_validation = true;

        let session = GuaranteeSession::create(
            merchant_id,
            ReservationId::new("R-1"),
            CustomerDetails::new(
                "Ada",
                email.map(String::from),
                phone.map(String::from),
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

    #[test]
    fn test_creation_effects_with_both_channels() {
        let (config, session) = config_and_session(Some("a@b.c"), Some("+33600000000"));
        let effects = creation_effects(&config, &session);
        assert_eq!(
            effects,
            vec![
                Effect::SendEmail(NotificationKind::GuaranteeRequest),
                Effect::SendSms(NotificationKind::GuaranteeRequest),
            ]
        );
    }

    #[test]
    fn test_creation_effects_skip_missing_contact_fields() {
        let (config, session) = config_and_session(None, None);
        assert!(creation_effects(&config, &session).is_empty());
    }

    #[test]
    fn test_creation_effects_respect_toggles() {
        let (mut config, session) = config_and_session(Some("a@b.c"), Some("+33600000000"));
        config.auto_send_email_on_create = false;
        config.auto_send_sms_on_create = false;
        assert!(creation_effects(&config, &session).is_empty());
    }

    #[test]
    fn test_sms_channel_switch_overrides_toggle() {
        let (mut config, session) = config_and_session(None, Some("+33600000000"));
        config.sms_enabled = false;
        assert!(creation_effects(&config, &session).is_empty());
    }

    #[test]
    fn test_validation_always_requests_handoff() {
        let (mut config, session) = config_and_session(None, None);
        config.auto_send_email_on_validation = false;
        config.auto_send_sms_on_validation = false;

        let effects = validation_effects(&config, &session);
        assert_eq!(effects, vec![Effect::TriggerBookingHandoff]);
    }

    #[test]
    fn test_validation_effects_with_email_only() {
        let (config, session) = config_and_session(Some("a@b.c"), None);
        let effects = validation_effects(&config, &session);
        assert_eq!(
            effects,
            vec![
                Effect::SendEmail(NotificationKind::GuaranteeConfirmed),
                Effect::TriggerBookingHandoff,
            ]
        );
    }
}
