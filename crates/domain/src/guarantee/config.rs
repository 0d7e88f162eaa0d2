//! Per-merchant guarantee configuration.

use common::MerchantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;

/// Which reservations a merchant requires a guarantee for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplyToRule {
    /// Every reservation requires a guarantee.
    #[default]
    All,

    /// Only parties at or above `min_persons`.
    MinPersons,

    /// Only Friday, Saturday, and Sunday reservations.
    Weekend,
}

impl ApplyToRule {
    /// Returns the rule name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyToRule::All => "all",
            ApplyToRule::MinPersons => "min_persons",
            ApplyToRule::Weekend => "weekend",
        }
    }
}

impl std::fmt::Display for ApplyToRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Guarantee configuration for a single merchant.
///
/// `enabled = true` only has effect with a charge-capable connected account;
/// the eligibility evaluator treats anything else as not required, and
/// disconnecting the account force-persists `enabled = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeConfig {
    /// Owning merchant.
    pub merchant_id: MerchantId,

    /// Master switch for the guarantee feature.
    pub enabled: bool,

    /// Penalty charged per guest on a no-show, in minor units.
    pub penalty_per_person: Money,

    /// Free-cancellation window granted to the customer, in hours.
    pub cancellation_delay_hours: u32,

    /// Which reservations require a guarantee.
    pub apply_to: ApplyToRule,

    /// Party-size threshold for the `min_persons` rule.
    pub min_persons: u32,

    /// Connected payment account on the processor, once onboarded.
    pub connected_account_id: Option<String>,

    /// Capability snapshot refreshed by account probes.
    pub account_charges_enabled: bool,

    /// ISO currency code for penalties (lowercase).
    pub currency: String,

    /// Merchant display name used in customer-facing messages.
    pub business_name: String,

    /// Merchant contact email.
    pub business_email: Option<String>,

    /// Merchant contact phone.
    pub business_phone: Option<String>,

    /// Public handle for the agent-facing status endpoint.
    pub agent_id: String,

    /// Merchant-scoped API key for automation endpoints.
    pub api_key: String,

    /// Send the card-request email when a session is created.
    pub auto_send_email_on_create: bool,

    /// Send the card-request SMS when a session is created.
    pub auto_send_sms_on_create: bool,

    /// Send the confirmation email when a session is validated.
    pub auto_send_email_on_validation: bool,

    /// Send the confirmation SMS when a session is validated.
    pub auto_send_sms_on_validation: bool,

    /// Merchant-level SMS channel switch.
    pub sms_enabled: bool,
}

impl GuaranteeConfig {
    /// Creates a disabled configuration with fresh server-assigned keys.
    pub fn new(merchant_id: MerchantId, business_name: impl Into<String>) -> Self {
        Self {
            merchant_id,
            enabled: false,
            penalty_per_person: Money::zero(),
            cancellation_delay_hours: 24,
            apply_to: ApplyToRule::All,
            min_persons: 0,
            connected_account_id: None,
            account_charges_enabled: false,
            currency: "eur".to_string(),
            business_name: business_name.into(),
            business_email: None,
            business_phone: None,
            agent_id: Uuid::new_v4().simple().to_string(),
            api_key: format!("gk_{}", Uuid::new_v4().simple()),
            auto_send_email_on_create: true,
            auto_send_sms_on_create: false,
            auto_send_email_on_validation: true,
            auto_send_sms_on_validation: false,
            sms_enabled: false,
        }
    }

    /// Returns true when a connected account exists and can take charges.
    pub fn charge_ready(&self) -> bool {
        self.connected_account_id.is_some() && self.account_charges_enabled
    }
}
