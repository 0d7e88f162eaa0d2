//! HTTP API server for the card-guarantee service.
//!
//! Exposes merchant configuration and onboarding, automation endpoints for
//! reservation systems, customer-facing public endpoints, and the inbound
//! webhooks, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use lifecycle::{
    AccountManager, BookingHandoff, EngineSettings, GuaranteeEngine, InMemoryBookingHandoff,
    InMemoryNotifier, InMemoryPaymentGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use session_store::GuaranteeStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, H>(state: Arc<AppState<S, H>>, metrics_handle: PrometheusHandle) -> Router
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Public
        .route(
            "/guarantee/status/{agent_id}",
            get(routes::public::agent_status::<S, H>),
        )
        .route(
            "/guarantee/public/session/{id}",
            get(routes::public::public_session::<S, H>),
        )
        .route(
            "/guarantee/public/checkout/{id}",
            post(routes::public::public_checkout::<S, H>),
        )
        // Merchant config & account
        .route(
            "/guarantee/config",
            get(routes::merchant::get_config::<S, H>).put(routes::merchant::put_config::<S, H>),
        )
        .route(
            "/guarantee/connect-stripe",
            post(routes::merchant::connect_stripe::<S, H>),
        )
        .route(
            "/guarantee/stripe-status",
            get(routes::merchant::stripe_status::<S, H>),
        )
        .route(
            "/guarantee/disconnect-stripe",
            post(routes::merchant::disconnect_stripe::<S, H>),
        )
        // Automation & dashboard
        .route(
            "/guarantee/check-status",
            get(routes::merchant::check_status::<S, H>),
        )
        .route(
            "/guarantee/create-session",
            post(routes::merchant::create_session::<S, H>),
        )
        .route(
            "/guarantee/reservations",
            get(routes::merchant::reservations::<S, H>),
        )
        .route(
            "/guarantee/reservations/{id}/status",
            post(routes::merchant::set_reservation_status::<S, H>),
        )
        .route("/guarantee/resend/{id}", post(routes::merchant::resend::<S, H>))
        .route("/guarantee/cancel/{id}", post(routes::merchant::cancel::<S, H>))
        // Webhooks & workflow
        .route(
            "/guarantee/webhook/checkout-complete",
            post(routes::workflow::checkout_complete::<S, H>),
        )
        .route(
            "/guarantee/session-details/{id}",
            get(routes::workflow::session_details::<S, H>),
        )
        .route(
            "/guarantee/confirm-booking",
            post(routes::workflow::confirm_booking::<S, H>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state around the given store and hand-off.
pub fn create_state<S, H>(store: S, handoff: H, config: &Config) -> Arc<AppState<S, H>>
where
    S: GuaranteeStore + Clone + 'static,
    H: BookingHandoff + 'static,
{
    let gateway = InMemoryPaymentGateway::new();
    let notifier = InMemoryNotifier::new();

    let engine = GuaranteeEngine::new(
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        handoff,
        EngineSettings::new(config.public_base_url.as_str()),
    );
    let accounts = AccountManager::new(store.clone(), gateway.clone());

    Arc::new(AppState {
        store,
        engine,
        accounts,
        gateway,
        notifier,
        master_key: config.master_key.clone(),
        webhook_secret: config.webhook_secret.clone(),
    })
}

/// Creates state with an in-memory booking hand-off (tests, demos).
pub fn create_default_state<S>(
    store: S,
    config: &Config,
) -> Arc<AppState<S, InMemoryBookingHandoff>>
where
    S: GuaranteeStore + Clone + 'static,
{
    create_state(store, InMemoryBookingHandoff::new(), config)
}
