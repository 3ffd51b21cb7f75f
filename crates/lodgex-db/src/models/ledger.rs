//! Payment ledger model.
//!
//! One row per externally-discovered payment, materialized during
//! enrichment for downstream ledger/reporting use. The primary key is a
//! content hash, so re-running enrichment never duplicates rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgExecutor};

use lodgex_core::content_hash;

use crate::error::DbError;
use crate::models::reservation::{ReservationKey, UnifiedPayment};

/// One materialized payment row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentLedgerEntry {
    /// Deterministic content-hash id.
    pub id: String,
    /// Parent reservation property id.
    pub property_id: String,
    /// Parent reservation external id.
    pub external_reservation_id: String,
    /// Parent reservation room id.
    pub room_id: String,
    /// Paid amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Payment method label, when known.
    pub method: Option<String>,
    /// Channel-manager payment id, when present.
    pub external_id: Option<String>,
    /// When the payment was made.
    pub paid_at: Option<DateTime<Utc>>,
    /// When the row was materialized.
    pub created_at: DateTime<Utc>,
}

impl PaymentLedgerEntry {
    /// Build an entry for a payment discovered during enrichment.
    ///
    /// The id hashes the reservation key together with the payment's
    /// external id (or its timestamp and amount when no external id
    /// exists), so the same payment always maps to the same row.
    #[must_use]
    pub fn from_payment(key: &ReservationKey, payment: &UnifiedPayment) -> Self {
        let identity = payment.external_id.clone().unwrap_or_else(|| {
            format!(
                "{}:{}:{}",
                payment.timestamp.epoch_seconds(),
                payment.amount,
                payment.currency
            )
        });
        let id = content_hash(&json!({
            "property_id": key.property_id,
            "external_reservation_id": key.external_reservation_id,
            "room_id": key.room_id,
            "payment": identity,
        }));
        Self {
            id,
            property_id: key.property_id.clone(),
            external_reservation_id: key.external_reservation_id.clone(),
            room_id: key.room_id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            method: payment.method.clone(),
            external_id: payment.external_id.clone(),
            paid_at: Some(payment.timestamp.0),
            created_at: Utc::now(),
        }
    }

    /// Insert the row; silently a no-op when it already exists.
    pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            INSERT INTO payment_ledger (
                id, property_id, external_reservation_id, room_id,
                amount, currency, method, external_id, paid_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(&self.id)
        .bind(&self.property_id)
        .bind(&self.external_reservation_id)
        .bind(&self.room_id)
        .bind(self.amount)
        .bind(&self.currency)
        .bind(&self.method)
        .bind(&self.external_id)
        .bind(self.paid_at)
        .bind(self.created_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
