//! Eligibility evaluation: does this reservation require a guarantee?

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::{ApplyToRule, GuaranteeConfig};

/// Machine-readable outcome of an eligibility evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    /// The merchant has the feature switched off.
    Disabled,

    /// Party size is below the configured minimum.
    MinPersonsNotMet,

    /// The reservation falls outside Friday-Sunday.
    NotWeekend,

    /// No connected payment account has been onboarded.
    NoConnectedAccount,

    /// The connected account cannot take charges yet.
    AccountNotChargeable,

    /// A guarantee is required.
    Required,
}

impl EligibilityReason {
    /// Returns the reason as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilityReason::Disabled => "disabled",
            EligibilityReason::MinPersonsNotMet => "min_persons_not_met",
            EligibilityReason::NotWeekend => "not_weekend",
            EligibilityReason::NoConnectedAccount => "no_connected_account",
            EligibilityReason::AccountNotChargeable => "account_not_chargeable",
            EligibilityReason::Required => "required",
        }
    }
}

impl std::fmt::Display for EligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of evaluating a reservation against a merchant's rule-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether a guarantee must be collected.
    pub required: bool,

    /// Why (or why not).
    pub reason: EligibilityReason,
}

impl Eligibility {
    fn not_required(reason: EligibilityReason) -> Self {
        Self {
            required: false,
            reason,
        }
    }

    fn required() -> Self {
        Self {
            required: true,
            reason: EligibilityReason::Required,
        }
    }
}

/// The weekend rule covers Friday through Sunday, not just Saturday/Sunday.
fn is_weekend(date: NaiveDate) -> bool {
    matches!(
        date.weekday(),
        Weekday::Fri | Weekday::Sat | Weekday::Sun
    )
}

/// Evaluates whether a reservation requires a guarantee.
///
/// Pure and deterministic; rules are checked in a fixed order so the first
/// failing rule names the reason. Safe to call repeatedly.
pub fn evaluate(config: &GuaranteeConfig, nb_persons: u32, date: NaiveDate) -> Eligibility {
    if !config.enabled {
        return Eligibility::not_required(EligibilityReason::Disabled);
    }

    if config.apply_to == ApplyToRule::MinPersons && nb_persons < config.min_persons {
        return Eligibility::not_required(EligibilityReason::MinPersonsNotMet);
    }

    if config.apply_to == ApplyToRule::Weekend && !is_weekend(date) {
        return Eligibility::not_required(EligibilityReason::NotWeekend);
    }

    if config.connected_account_id.is_none() {
        return Eligibility::not_required(EligibilityReason::NoConnectedAccount);
    }

    if !config.account_charges_enabled {
        return Eligibility::not_required(EligibilityReason::AccountNotChargeable);
    }

    Eligibility::required()
}
