//! Bounded write session.
//!
//! Wraps a transaction that auto-commits and reopens once the pending
//! operation count reaches a threshold, so large imports never exceed
//! the store's per-transaction operation ceiling. The threshold lives
//! behind this abstraction and can be tuned per backing store.
//!
//! A crash between flushes can leave a batch partially applied; the
//! engines recover by re-running, relying on hash-skip idempotence
//! rather than replaying partial batches.

use sqlx::{PgConnection, Postgres, Transaction};
use tracing::debug;

use crate::error::DbError;
use crate::DbPool;

/// Tuning for a write session.
#[derive(Debug, Clone, Copy)]
pub struct WriteSessionConfig {
    /// Operations per transaction before an automatic flush.
    pub max_ops: usize,
}

impl Default for WriteSessionConfig {
    fn default() -> Self {
        Self { max_ops: 450 }
    }
}

/// A transactional batch with an operation ceiling.
pub struct WriteSession {
    pool: DbPool,
    config: WriteSessionConfig,
    tx: Option<Transaction<'static, Postgres>>,
    pending_ops: usize,
    flushes: usize,
}

impl WriteSession {
    /// Start a session; the first transaction opens lazily.
    #[must_use]
    pub fn new(pool: DbPool, config: WriteSessionConfig) -> Self {
        Self {
            pool,
            config,
            tx: None,
            pending_ops: 0,
            flushes: 0,
        }
    }

    /// Operations queued in the current transaction.
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.pending_ops
    }

    /// Number of committed batches so far.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// The connection to run batch operations on.
    pub async fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await.map_err(DbError::ConnectionFailed)?);
        }
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => unreachable!("transaction opened above"),
        }
    }

    /// Count `n` operations against the ceiling, flushing when reached.
    pub async fn note_writes(&mut self, n: usize) -> Result<(), DbError> {
        self.pending_ops += n;
        if self.pending_ops >= self.config.max_ops {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commit the in-flight transaction, if any.
    pub async fn flush(&mut self) -> Result<(), DbError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.flushes += 1;
            debug!(ops = self.pending_ops, batch = self.flushes, "Write batch committed");
        }
        self.pending_ops = 0;
        Ok(())
    }

    /// Commit whatever remains and consume the session.
    pub async fn commit(mut self) -> Result<(), DbError> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        let config = WriteSessionConfig::default();
        assert_eq!(config.max_ops, 450);
    }
}
