//! PostgreSQL persistence layer for the lodgex reservation sync engine.
//!
//! Reservation documents, their append-only history, FX quotes and the
//! linking watermark, the payment ledger, the lease lock, and the
//! bounded write session all live here. Queries are runtime `sqlx`
//! queries; the schema is applied through embedded migrations.

pub mod error;
pub mod lock;
pub mod migrations;
pub mod models;
pub mod session;

pub use error::DbError;
pub use lock::{LeaseLock, LockToken};
pub use migrations::run_migrations;
pub use session::{WriteSession, WriteSessionConfig};

/// Connection pool alias used across lodgex.
pub type DbPool = sqlx::PgPool;
