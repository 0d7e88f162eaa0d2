//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SessionId;
use domain::Money;
use thiserror::Error;

/// Errors surfaced by the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The referenced connected account is invalid or revoked.
    #[error("Account invalid: {0}")]
    AccountInvalid(String),

    /// The processor declined the charge.
    #[error("Charge declined: {0}")]
    Declined(String),

    /// The referenced processor object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Transport or processor-side failure.
    #[error("Payment processor error: {0}")]
    Provider(String),
}

/// Capability flags of a connected account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountCapabilities {
    /// The merchant finished the onboarding form.
    pub details_submitted: bool,

    /// The account can take charges.
    pub charges_enabled: bool,

    /// The account can receive payouts.
    pub payouts_enabled: bool,
}

impl AccountCapabilities {
    /// Returns true once the account is fully usable for guarantees.
    pub fn is_complete(&self) -> bool {
        self.details_submitted && self.charges_enabled
    }
}

/// Request to open a hosted card-setup checkout on a connected account.
#[derive(Debug, Clone)]
pub struct SetupCheckoutRequest {
    /// Connected account to collect the card on.
    pub account_id: String,

    /// Guarantee session this checkout belongs to (client reference).
    pub session_id: SessionId,

    /// Customer email to prefill, if known.
    pub customer_email: Option<String>,

    /// Where the processor redirects after completion.
    pub success_url: String,

    /// Where the processor redirects on abandon.
    pub cancel_url: String,
}

/// A hosted card-setup checkout session.
#[derive(Debug, Clone)]
pub struct SetupCheckout {
    /// Processor id of the checkout session.
    pub checkout_session_id: String,

    /// Customer-facing URL of the hosted page.
    pub url: String,

    /// Setup intent created alongside, when the processor exposes it upfront.
    pub setup_intent_id: Option<String>,
}

/// Verified state of a checkout session, read back from the processor.
#[derive(Debug, Clone, Default)]
pub struct CheckoutState {
    /// Whether the customer finished card setup.
    pub completed: bool,

    /// Setup intent holding the stored card.
    pub setup_intent_id: Option<String>,

    /// Stored payment method, once completed.
    pub payment_method_id: Option<String>,

    /// Processor-side customer record, once completed.
    pub customer_ref: Option<String>,
}

/// Payment method resolved from a setup intent.
#[derive(Debug, Clone)]
pub struct StoredPaymentMethod {
    /// Stored payment method id.
    pub payment_method_id: String,

    /// Customer record the method is attached to, if any.
    pub customer_ref: Option<String>,
}

/// Request for an off-session charge against a stored card.
#[derive(Debug, Clone)]
pub struct OffSessionCharge {
    /// Connected account receiving the charge.
    pub account_id: String,

    /// Processor customer record, when one exists.
    pub customer_ref: Option<String>,

    /// Stored payment method to charge.
    pub payment_method_id: String,

    /// Amount in minor units.
    pub amount: Money,

    /// ISO currency code (lowercase).
    pub currency: String,

    /// Statement/dashboard description.
    pub description: String,
}

/// Result of a successful off-session charge.
#[derive(Debug, Clone)]
pub struct ChargeResult {
    /// The payment intent created by the processor.
    pub payment_intent_id: String,
}

/// Trait for payment processor operations.
///
/// Everything runs against a merchant's connected account; implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a new connected account for a merchant.
    async fn create_account(&self, email: Option<&str>) -> Result<String, GatewayError>;

    /// Issues a one-time onboarding link for a connected account.
    async fn onboarding_link(&self, account_id: &str) -> Result<String, GatewayError>;

    /// Probes a connected account's capabilities.
    async fn account_status(&self, account_id: &str)
    -> Result<AccountCapabilities, GatewayError>;

    /// Opens a hosted card-setup checkout session.
    async fn create_setup_checkout(
        &self,
        request: &SetupCheckoutRequest,
    ) -> Result<SetupCheckout, GatewayError>;

    /// Reads a checkout session's state back from the processor.
    /// Used to verify completion instead of trusting webhook payloads.
    async fn retrieve_checkout(
        &self,
        account_id: &str,
        checkout_session_id: &str,
    ) -> Result<CheckoutState, GatewayError>;

    /// Resolves the stored payment method behind a setup intent.
    async fn payment_method_for_setup(
        &self,
        account_id: &str,
        setup_intent_id: &str,
    ) -> Result<StoredPaymentMethod, GatewayError>;

    /// Charges a stored card off-session.
    async fn charge_off_session(
        &self,
        request: &OffSessionCharge,
    ) -> Result<ChargeResult, GatewayError>;
}

#[derive(Debug, Clone)]
struct CheckoutRecord {
    account_id: String,
    state: CheckoutState,
}

#[derive(Debug, Clone)]
struct RecordedCharge {
    account_id: String,
    payment_method_id: String,
    amount: Money,
    currency: String,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    accounts: HashMap<String, AccountCapabilities>,
    revoked_accounts: Vec<String>,
    checkouts: HashMap<String, CheckoutRecord>,
    charges: Vec<RecordedCharge>,
    next_id: u32,
    fail_charge_with: Option<String>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that is already fully onboarded.
    pub fn seed_ready_account(&self, account_id: &str) {
        self.state.write().unwrap().accounts.insert(
            account_id.to_string(),
            AccountCapabilities {
                details_submitted: true,
                charges_enabled: true,
                payouts_enabled: true,
            },
        );
    }

    /// Marks an account as revoked so probes fail.
    pub fn revoke_account(&self, account_id: &str) {
        let mut state = self.state.write().unwrap();
        state.accounts.remove(account_id);
        state.revoked_accounts.push(account_id.to_string());
    }

    /// Flips an account's capability flags.
    pub fn set_capabilities(&self, account_id: &str, capabilities: AccountCapabilities) {
        self.state
            .write()
            .unwrap()
            .accounts
            .insert(account_id.to_string(), capabilities);
    }

    /// Simulates the customer completing card setup on the hosted page.
    pub fn complete_checkout(&self, checkout_session_id: &str) {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let suffix = state.next_id;
        if let Some(record) = state.checkouts.get_mut(checkout_session_id) {
            record.state.completed = true;
            record.state.payment_method_id = Some(format!("pm_{suffix:04}"));
            record.state.customer_ref = Some(format!("cus_{suffix:04}"));
        }
    }

    /// Configures the next charge calls to be declined with `reason`.
    pub fn set_fail_charge_with(&self, reason: Option<&str>) {
        self.state.write().unwrap().fail_charge_with = reason.map(String::from);
    }

    /// Returns the number of checkout sessions opened.
    pub fn checkout_count(&self) -> usize {
        self.state.read().unwrap().checkouts.len()
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Returns the amount of the most recent charge, if any.
    pub fn last_charge_amount(&self) -> Option<Money> {
        self.state.read().unwrap().charges.last().map(|c| c.amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_account(&self, _email: Option<&str>) -> Result<String, GatewayError> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let account_id = format!("acct_{:04}", state.next_id);
        state
            .accounts
            .insert(account_id.clone(), AccountCapabilities::default());
        Ok(account_id)
    }

    async fn onboarding_link(&self, account_id: &str) -> Result<String, GatewayError> {
        let state = self.state.read().unwrap();
        if !state.accounts.contains_key(account_id) {
            return Err(GatewayError::AccountInvalid(account_id.to_string()));
        }
        Ok(format!("https://onboarding.test/{account_id}"))
    }

    async fn account_status(
        &self,
        account_id: &str,
    ) -> Result<AccountCapabilities, GatewayError> {
        let state = self.state.read().unwrap();
        state
            .accounts
            .get(account_id)
            .copied()
            .ok_or_else(|| GatewayError::AccountInvalid(account_id.to_string()))
    }

    async fn create_setup_checkout(
        &self,
        request: &SetupCheckoutRequest,
    ) -> Result<SetupCheckout, GatewayError> {
        let mut state = self.state.write().unwrap();
        if !state.accounts.contains_key(&request.account_id) {
            return Err(GatewayError::AccountInvalid(request.account_id.clone()));
        }

        state.next_id += 1;
        let checkout_session_id = format!("cs_{:04}", state.next_id);
        let setup_intent_id = format!("seti_{:04}", state.next_id);
        state.checkouts.insert(
            checkout_session_id.clone(),
            CheckoutRecord {
                account_id: request.account_id.clone(),
                state: CheckoutState {
                    completed: false,
                    setup_intent_id: Some(setup_intent_id.clone()),
                    payment_method_id: None,
                    customer_ref: None,
                },
            },
        );

        Ok(SetupCheckout {
            url: format!("https://checkout.test/{checkout_session_id}"),
            checkout_session_id,
            setup_intent_id: Some(setup_intent_id),
        })
    }

    async fn retrieve_checkout(
        &self,
        account_id: &str,
        checkout_session_id: &str,
    ) -> Result<CheckoutState, GatewayError> {
        let state = self.state.read().unwrap();
        let record = state
            .checkouts
            .get(checkout_session_id)
            .ok_or_else(|| GatewayError::NotFound(checkout_session_id.to_string()))?;
        if record.account_id != account_id {
            return Err(GatewayError::NotFound(checkout_session_id.to_string()));
        }
        Ok(record.state.clone())
    }

    async fn payment_method_for_setup(
        &self,
        _account_id: &str,
        setup_intent_id: &str,
    ) -> Result<StoredPaymentMethod, GatewayError> {
        let state = self.state.read().unwrap();
        let record = state
            .checkouts
            .values()
            .find(|r| r.state.setup_intent_id.as_deref() == Some(setup_intent_id))
            .ok_or_else(|| GatewayError::NotFound(setup_intent_id.to_string()))?;

        match &record.state.payment_method_id {
            Some(payment_method_id) => Ok(StoredPaymentMethod {
                payment_method_id: payment_method_id.clone(),
                customer_ref: record.state.customer_ref.clone(),
            }),
            None => Err(GatewayError::NotFound(format!(
                "no payment method stored for {setup_intent_id}"
            ))),
        }
    }

    async fn charge_off_session(
        &self,
        request: &OffSessionCharge,
    ) -> Result<ChargeResult, GatewayError> {
        let mut state = self.state.write().unwrap();

        if let Some(reason) = &state.fail_charge_with {
            return Err(GatewayError::Declined(reason.clone()));
        }

        state.next_id += 1;
        let payment_intent_id = format!("pi_{:04}", state.next_id);
        state.charges.push(RecordedCharge {
            account_id: request.account_id.clone(),
            payment_method_id: request.payment_method_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
        });

        Ok(ChargeResult { payment_intent_id })
    }
}
