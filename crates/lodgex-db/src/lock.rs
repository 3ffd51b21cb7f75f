//! Lease-based mutual exclusion.
//!
//! A single well-known row per lock name, acquired with an atomic
//! upsert that only steals the row when the previous lease has expired.
//! The lease auto-releases by TTL even if the holder never frees it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::DbPool;

/// Proof of lock ownership; required to refresh or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken(pub Uuid);

/// Outcome of an acquire attempt.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// The lock was acquired.
    Acquired(LockToken),
    /// Another holder's lease is still live.
    Conflict {
        /// When the live lease started.
        held_since: DateTime<Utc>,
    },
}

/// Lease lock backed by the `sync_locks` table.
#[derive(Debug, Clone)]
pub struct LeaseLock {
    pool: DbPool,
    name: String,
}

impl LeaseLock {
    /// Create a handle for a named lock.
    #[must_use]
    pub fn new(pool: DbPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    /// The lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try to acquire the lock for `ttl`.
    ///
    /// Succeeds when no row exists or the existing lease has expired;
    /// otherwise reports the live holder's start time.
    pub async fn acquire(&self, ttl: Duration) -> Result<AcquireOutcome, DbError> {
        let token = Uuid::new_v4();
        let row: Option<(Uuid,)> = sqlx::query_as(
            r"
            INSERT INTO sync_locks (name, holder, started_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE SET
                holder = EXCLUDED.holder,
                started_at = EXCLUDED.started_at,
                expires_at = EXCLUDED.expires_at
            WHERE sync_locks.expires_at < now()
            RETURNING holder
            ",
        )
        .bind(&self.name)
        .bind(token)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            debug!(lock = %self.name, %token, "Lock acquired");
            return Ok(AcquireOutcome::Acquired(LockToken(token)));
        }

        let held: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT started_at FROM sync_locks WHERE name = $1")
                .bind(&self.name)
                .fetch_optional(&self.pool)
                .await?;
        let held_since = held.map(|(t,)| t).unwrap_or_else(Utc::now);
        debug!(lock = %self.name, %held_since, "Lock held by another run");
        Ok(AcquireOutcome::Conflict { held_since })
    }

    /// Extend the lease; returns false when the token no longer owns
    /// the lock (lease expired and was stolen).
    pub async fn refresh(&self, token: LockToken, ttl: Duration) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            UPDATE sync_locks
            SET expires_at = now() + make_interval(secs => $3)
            WHERE name = $1 AND holder = $2
            ",
        )
        .bind(&self.name)
        .bind(token.0)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        let refreshed = result.rows_affected() > 0;
        if !refreshed {
            warn!(lock = %self.name, token = %token.0, "Lease refresh found no owned lock");
        }
        Ok(refreshed)
    }

    /// Release the lock; a no-op when the token no longer owns it.
    pub async fn release(&self, token: LockToken) -> Result<(), DbError> {
        sqlx::query("DELETE FROM sync_locks WHERE name = $1 AND holder = $2")
            .bind(&self.name)
            .bind(token.0)
            .execute(&self.pool)
            .await?;
        debug!(lock = %self.name, token = %token.0, "Lock released");
        Ok(())
    }
}
