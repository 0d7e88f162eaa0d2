//! Durable storage for the guarantee service.
//!
//! The store is the single source of truth for configs, sessions, and
//! no-show charges. Status transitions go through [`GuaranteeStore::transition`],
//! which enforces an optimistic expected-status check so concurrent handlers
//! cannot double-advance a session.

mod error;
mod memory;
mod postgres;
mod store;

pub use error::{Result, StoreError};
pub use memory::InMemorySessionStore;
pub use postgres::PostgresSessionStore;
pub use store::{GuaranteeStore, SessionUpdate};
