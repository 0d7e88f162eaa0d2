//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p session-store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use common::{MerchantId, SessionId};
use domain::{
    CustomerDetails, GuaranteeConfig, GuaranteeSession, Money, NoshowCharge, ReservationId,
    ReservationSlot, SessionStatus,
};
use serial_test::serial;
use session_store::{GuaranteeStore, PostgresSessionStore, SessionUpdate, StoreError};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_guarantee_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresSessionStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE noshow_charges, guarantee_sessions, guarantee_configs")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSessionStore::new(pool)
}

fn sample_session(merchant_id: MerchantId, reservation: &str) -> GuaranteeSession {
    GuaranteeSession::create(
        merchant_id,
        ReservationId::new(reservation),
        CustomerDetails::new("Ada", Some("ada@example.com".to_string()), None),
        6,
        ReservationSlot::new(
            NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            90,
            "Europe/Paris",
        ),
        Money::from_major(30),
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn test_config_roundtrip_and_lookups() {
    let store = get_test_store().await;
    let merchant_id = MerchantId::new();
    let mut config = GuaranteeConfig::new(merchant_id, "Chez Test");
    config.enabled = true;
    config.penalty_per_person = Money::from_major(30);
    config.connected_account_id = Some("acct_123".to_string());
    config.account_charges_enabled = true;

    store.upsert_config(config.clone()).await.unwrap();

    let loaded = store
        .config_for_merchant(merchant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, config);

    let by_key = store
        .config_by_api_key(&config.api_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_key.merchant_id, merchant_id);

    let by_agent = store
        .config_by_agent(&config.agent_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_agent.merchant_id, merchant_id);

    // Upsert overwrites in place
    config.enabled = false;
    store.upsert_config(config.clone()).await.unwrap();
    let reloaded = store
        .config_for_merchant(merchant_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!reloaded.enabled);
}

#[tokio::test]
#[serial]
async fn test_session_roundtrip() {
    let store = get_test_store().await;
    let merchant_id = MerchantId::new();
    let session = sample_session(merchant_id, "R-100");
    let id = session.id;

    store.insert_session(session.clone()).await.unwrap();

    let loaded = store.session(id).await.unwrap().unwrap();
    assert_eq!(loaded.reservation_id.as_str(), "R-100");
    assert_eq!(loaded.status, SessionStatus::Pending);
    assert_eq!(loaded.penalty_per_person.minor(), 3000);
    assert_eq!(loaded.nb_persons, 6);
    assert_eq!(loaded.slot.duration_minutes, 90);

    let by_reservation = store
        .session_by_reservation(merchant_id, &ReservationId::new("R-100"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_reservation.id, id);
}

#[tokio::test]
#[serial]
async fn test_duplicate_reservation_maps_constraint() {
    let store = get_test_store().await;
    let merchant_id = MerchantId::new();

    store
        .insert_session(sample_session(merchant_id, "R-100"))
        .await
        .unwrap();
    let result = store
        .insert_session(sample_session(merchant_id, "R-100"))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::DuplicateReservation { .. })
    ));
}

#[tokio::test]
#[serial]
async fn test_transition_optimistic_check() {
    let store = get_test_store().await;
    let session = sample_session(MerchantId::new(), "R-1");
    let id = session.id;
    store.insert_session(session).await.unwrap();

    let now = Utc::now();
    let validated = store
        .transition(
            id,
            SessionStatus::Pending,
            SessionUpdate::to(SessionStatus::Validated)
                .with_captured_payment(Some("pm_1".to_string()), Some("cus_1".to_string()))
                .validated(now),
        )
        .await
        .unwrap();
    assert_eq!(validated.status, SessionStatus::Validated);
    assert_eq!(validated.payment.payment_method_id.as_deref(), Some("pm_1"));

    // Second transition from Pending must fail: status already advanced.
    let stale = store
        .transition(
            id,
            SessionStatus::Pending,
            SessionUpdate::to(SessionStatus::Cancelled),
        )
        .await;
    assert!(matches!(
        stale,
        Err(StoreError::StatusConflict {
            actual: SessionStatus::Validated,
            ..
        })
    ));
}

#[tokio::test]
#[serial]
async fn test_transition_unknown_session() {
    let store = get_test_store().await;
    let result = store
        .transition(
            SessionId::new(),
            SessionStatus::Pending,
            SessionUpdate::to(SessionStatus::Cancelled),
        )
        .await;
    assert!(matches!(result, Err(StoreError::SessionNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_reminder_bump_increments() {
    let store = get_test_store().await;
    let session = sample_session(MerchantId::new(), "R-1");
    let id = session.id;
    store.insert_session(session).await.unwrap();

    for expected in 1..=2 {
        let updated = store
            .transition(
                id,
                SessionStatus::Pending,
                SessionUpdate::to(SessionStatus::Pending)
                    .with_checkout(format!("cs_{expected}"), Some(format!("seti_{expected}")))
                    .reminded(Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(updated.reminder_count, expected);
    }
}

#[tokio::test]
#[serial]
async fn test_lookup_by_checkout_session() {
    let store = get_test_store().await;
    let session = sample_session(MerchantId::new(), "R-1");
    let id = session.id;
    store.insert_session(session).await.unwrap();

    store
        .transition(
            id,
            SessionStatus::Pending,
            SessionUpdate::to(SessionStatus::Pending)
                .with_checkout("cs_lookup", Some("seti_1".to_string())),
        )
        .await
        .unwrap();

    let found = store
        .session_by_checkout("cs_lookup")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);

    assert!(store.session_by_checkout("cs_other").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_charges_append_and_order() {
    let store = get_test_store().await;
    let merchant_id = MerchantId::new();
    let session = sample_session(merchant_id, "R-1");
    let session_id = session.id;
    store.insert_session(session).await.unwrap();

    store
        .insert_charge(NoshowCharge::failed(
            session_id,
            merchant_id,
            Money::from_minor(18000),
            "eur",
            "card_declined",
            Utc::now(),
        ))
        .await
        .unwrap();
    store
        .insert_charge(NoshowCharge::succeeded(
            session_id,
            merchant_id,
            "pi_1",
            Money::from_minor(18000),
            "eur",
            Utc::now(),
        ))
        .await
        .unwrap();

    let charges = store.charges_for_session(session_id).await.unwrap();
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0].failure_reason.as_deref(), Some("card_declined"));
    assert_eq!(charges[1].payment_intent_id.as_deref(), Some("pi_1"));
    assert!(charges.iter().all(|c| c.amount.minor() == 18000));
}

#[tokio::test]
#[serial]
async fn test_slot_range_query() {
    let store = get_test_store().await;
    let merchant_id = MerchantId::new();

    let mut in_range = sample_session(merchant_id, "R-1");
    in_range.slot.date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
    let mut out_of_range = sample_session(merchant_id, "R-2");
    out_of_range.slot.date = NaiveDate::from_ymd_opt(2025, 7, 10).unwrap();

    store.insert_session(in_range).await.unwrap();
    store.insert_session(out_of_range).await.unwrap();

    let sessions = store
        .sessions_by_slot_range(
            merchant_id,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].reservation_id.as_str(), "R-1");
}
