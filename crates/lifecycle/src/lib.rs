//! Guarantee session lifecycle orchestration.
//!
//! This crate owns the moving parts around the pure domain layer:
//! - [`GuaranteeEngine`] drives session creation, validation, attendance,
//!   resend, cancel, and the public customer-facing reads.
//! - [`AccountManager`] onboards and heals merchant connected accounts.
//! - [`EffectDispatcher`] executes planned effects (email/SMS/hand-off)
//!   best-effort after the state write commits.
//! - [`services`] defines the external seams (payment gateway, notifier,
//!   booking hand-off) with in-memory implementations for tests.

pub mod accounts;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod services;

pub use accounts::{AccountManager, AccountState, ConnectOutcome};
pub use dispatch::{DispatchReport, EffectDispatcher};
pub use engine::{
    Attendance, AttendanceOutcome, CreateSessionOutcome, CreateSessionRequest, DashboardView,
    EngineSettings, GuaranteeEngine, Period, PublicCheckout, ResendOutcome, ValidationOutcome,
};
pub use error::{LifecycleError, Result};
pub use services::booking::{
    BookingHandoff, BookingRequest, HandoffError, HttpBookingHandoff, InMemoryBookingHandoff,
};
pub use services::notify::{
    EmailMessage, InMemoryNotifier, Notifier, NotifyError, SmsMessage,
};
pub use services::payment::{
    AccountCapabilities, ChargeResult, CheckoutState, GatewayError, InMemoryPaymentGateway,
    OffSessionCharge, PaymentGateway, SetupCheckout, SetupCheckoutRequest, StoredPaymentMethod,
};
