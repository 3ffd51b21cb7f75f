//! Reservation history model.
//!
//! Immutable audit records, one per successful reservation write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::reservation::ReservationKey;

/// Whether a write created the document or updated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// First write of the document.
    Created,
    /// Subsequent write.
    Updated,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Created => write!(f, "created"),
            ChangeType::Updated => write!(f, "updated"),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Record id.
    pub id: Uuid,
    /// Parent reservation property id.
    pub property_id: String,
    /// Parent reservation external id.
    pub external_reservation_id: String,
    /// Parent reservation room id.
    pub room_id: String,
    /// When the write happened.
    pub recorded_at: DateTime<Utc>,
    /// Which engine or actor performed the write.
    pub source: String,
    /// Operation context label (import, enrichment, action name...).
    pub context: String,
    /// Created or updated.
    pub change_type: ChangeType,
    /// Top-level keys that changed.
    pub changed_keys: Json<Vec<String>>,
    /// Per-key from/to values.
    pub diff: Json<Value>,
    /// Content hash before the write.
    pub hash_from: Option<String>,
    /// Content hash after the write.
    pub hash_to: Option<String>,
    /// Full document snapshot after the write.
    pub snapshot: Json<Value>,
    /// Action-specific payload snapshot (mutations only).
    pub action_payload: Option<Json<Value>>,
}

impl HistoryEntry {
    /// Build a record for a write that is about to be committed.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        key: &ReservationKey,
        source: impl Into<String>,
        context: impl Into<String>,
        change_type: ChangeType,
        diff: Value,
        hash_from: Option<String>,
        hash_to: Option<String>,
        snapshot: Value,
    ) -> Self {
        let changed_keys = diff
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            property_id: key.property_id.clone(),
            external_reservation_id: key.external_reservation_id.clone(),
            room_id: key.room_id.clone(),
            recorded_at: Utc::now(),
            source: source.into(),
            context: context.into(),
            change_type,
            changed_keys: Json(changed_keys),
            diff: Json(diff),
            hash_from,
            hash_to,
            snapshot: Json(snapshot),
            action_payload: None,
        }
    }

    /// Attach an action-specific payload snapshot.
    #[must_use]
    pub fn with_action_payload(mut self, payload: Value) -> Self {
        self.action_payload = Some(Json(payload));
        self
    }

    /// Append the record.
    pub async fn insert<'e, E: PgExecutor<'e>>(&self, executor: E) -> Result<(), DbError> {
        sqlx::query(
            r"
            INSERT INTO reservation_history (
                id, property_id, external_reservation_id, room_id,
                recorded_at, source, context, change_type,
                changed_keys, diff, hash_from, hash_to, snapshot, action_payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(self.id)
        .bind(&self.property_id)
        .bind(&self.external_reservation_id)
        .bind(&self.room_id)
        .bind(self.recorded_at)
        .bind(&self.source)
        .bind(&self.context)
        .bind(self.change_type)
        .bind(&self.changed_keys)
        .bind(&self.diff)
        .bind(&self.hash_from)
        .bind(&self.hash_to)
        .bind(&self.snapshot)
        .bind(&self.action_payload)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// History for one reservation, oldest first.
    pub async fn list_for<'e, E: PgExecutor<'e>>(
        executor: E,
        key: &ReservationKey,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservation_history
            WHERE property_id = $1 AND external_reservation_id = $2 AND room_id = $3
            ORDER BY recorded_at
            ",
        )
        .bind(&key.property_id)
        .bind(&key.external_reservation_id)
        .bind(&key.room_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}
