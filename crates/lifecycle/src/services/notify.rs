//! Notification channel trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by notification sends.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The email provider rejected or failed the send.
    #[error("Email send failed: {0}")]
    Email(String),

    /// The SMS provider rejected or failed the send.
    #[error("SMS send failed: {0}")]
    Sms(String),
}

/// An outbound email. Template rendering happens upstream; this is the
/// send contract only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,

    /// Subject line.
    pub subject: String,

    /// Plain-text body.
    pub body: String,
}

/// An outbound SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Recipient phone number.
    pub to: String,

    /// Message body.
    pub body: String,
}

/// Trait for best-effort notification channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when an email provider is configured.
    fn email_configured(&self) -> bool;

    /// Returns true when an SMS provider is configured.
    fn sms_configured(&self) -> bool;

    /// Sends an email.
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError>;

    /// Sends an SMS.
    async fn send_sms(&self, message: SmsMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    emails: Vec<EmailMessage>,
    sms: Vec<SmsMessage>,
    fail_email: bool,
    fail_sms: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone)]
pub struct InMemoryNotifier {
    email_configured: bool,
    sms_configured: bool,
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotifier {
    /// Creates a notifier with both channels configured.
    pub fn new() -> Self {
        Self {
            email_configured: true,
            sms_configured: true,
            state: Arc::default(),
        }
    }

    /// Creates a notifier with selected channels configured.
    pub fn with_channels(email: bool, sms: bool) -> Self {
        Self {
            email_configured: email,
            sms_configured: sms,
            state: Arc::default(),
        }
    }

    /// Configures the next email sends to fail.
    pub fn set_fail_email(&self, fail: bool) {
        self.state.write().unwrap().fail_email = fail;
    }

    /// Configures the next SMS sends to fail.
    pub fn set_fail_sms(&self, fail: bool) {
        self.state.write().unwrap().fail_sms = fail;
    }

    /// Returns all sent emails.
    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.state.read().unwrap().emails.clone()
    }

    /// Returns all sent SMS messages.
    pub fn sent_sms(&self) -> Vec<SmsMessage> {
        self.state.read().unwrap().sms.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    fn email_configured(&self) -> bool {
        self.email_configured
    }

    fn sms_configured(&self) -> bool {
        self.sms_configured
    }

    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_email {
            return Err(NotifyError::Email("provider unavailable".to_string()));
        }
        state.emails.push(message);
        Ok(())
    }

    async fn send_sms(&self, message: SmsMessage) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_sms {
            return Err(NotifyError::Sms("provider unavailable".to_string()));
        }
        state.sms.push(message);
        Ok(())
    }
}
