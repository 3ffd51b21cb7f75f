//! Reservation document model.
//!
//! One row per booked room per stay, keyed by
//! `(property_id, external_reservation_id, room_id)`. The unified
//! note/payment/extra arrays and the pricing breakdown are stored as
//! JSONB; everything else is a typed column.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor};

use lodgex_core::Instant;

use crate::error::DbError;

/// Composite identity of a reservation document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationKey {
    /// Local property identifier.
    pub property_id: String,
    /// Reservation code in the external channel manager.
    pub external_reservation_id: String,
    /// External room identifier within the reservation.
    pub room_id: String,
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.property_id, self.external_reservation_id, self.room_id
        )
    }
}

/// Payment status derived from the unified payments list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// No payment recorded.
    Unpaid,
    /// Payments recorded but below the payable total.
    Partial,
    /// Payments cover the payable total.
    Paid,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Partial => write!(f, "partial"),
            PaymentStatus::Paid => write!(f, "paid"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            _ => Err(format!("Unknown payment status: {s}")),
        }
    }
}

/// Whether supplementary data has been fetched for this reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentState {
    /// Not yet enriched.
    Pending,
    /// Enrichment has completed at least once.
    Completed,
}

impl std::fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrichmentState::Pending => write!(f, "pending"),
            EnrichmentState::Completed => write!(f, "completed"),
        }
    }
}

/// Origin of a unified list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Imported from the channel manager.
    External,
    /// Entered by a host.
    Host,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySource::External => write!(f, "external"),
            EntrySource::Host => write!(f, "host"),
        }
    }
}

/// A note in the unified notes list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedNote {
    /// When the note was written.
    pub timestamp: Instant,
    /// Who wrote it.
    pub actor: String,
    /// Where it came from.
    pub source: EntrySource,
    /// Channel-manager note id, when imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Note body.
    pub text: String,
}

/// A payment in the unified payments list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedPayment {
    /// When the payment was made.
    pub timestamp: Instant,
    /// Who recorded it.
    pub actor: String,
    /// Where it came from.
    pub source: EntrySource,
    /// Channel-manager payment id, when imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Paid amount.
    pub amount: Decimal,
    /// Currency code of the amount.
    pub currency: String,
    /// Payment method label, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// An extra charge in the unified extras list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedExtra {
    /// When the charge was added.
    pub timestamp: Instant,
    /// Who added it.
    pub actor: String,
    /// Where it came from.
    pub source: EntrySource,
    /// Channel-manager charge id, when imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// What the charge is for.
    pub description: String,
    /// Charged amount.
    pub amount: Decimal,
    /// Currency code, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Pricing breakdown; each field independently nullable.
///
/// Once a field is non-null it is carried forward by import and
/// enrichment; only an explicit host mutation may change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToPayBreakdown {
    /// Base room price in the settlement currency.
    pub base_amount: Option<Decimal>,
    /// VAT percentage applied to the base.
    pub vat_percent: Option<Decimal>,
    /// VAT amount, verbatim when set.
    pub vat_amount: Option<Decimal>,
    /// Extra charges total in the settlement currency.
    pub extras_amount: Option<Decimal>,
    /// FX rate override for payment-status conversion.
    pub fx_rate: Option<Decimal>,
}

/// Reservation document.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    /// Local property identifier.
    pub property_id: String,
    /// Reservation code in the external channel manager.
    pub external_reservation_id: String,
    /// External room identifier within the reservation.
    pub room_id: String,
    /// Guest/customer id in the external channel manager.
    pub guest_external_id: Option<String>,
    /// Guest display name.
    pub guest_name: Option<String>,
    /// Guest email.
    pub guest_email: Option<String>,
    /// Guest phone.
    pub guest_phone: Option<String>,
    /// Arrival in the upstream display format.
    pub arrival_display: Option<String>,
    /// Departure in the upstream display format.
    pub departure_display: Option<String>,
    /// Arrival as a calendar date.
    pub arrival_date: Option<NaiveDate>,
    /// Departure as a calendar date.
    pub departure_date: Option<NaiveDate>,
    /// Adult occupancy.
    pub adults: i32,
    /// Child occupancy.
    pub children: i32,
    /// Normalized lifecycle status (lowercase snake case).
    pub status: String,
    /// Booking channel or source label.
    pub channel: Option<String>,
    /// Local room code resolved through the property room map.
    pub room_code: Option<String>,
    /// Local room display name.
    pub room_name: Option<String>,
    /// Unified notes, chronological.
    pub notes: Json<Vec<UnifiedNote>>,
    /// Unified payments, chronological.
    pub payments: Json<Vec<UnifiedPayment>>,
    /// Unified extra charges, chronological.
    pub extras: Json<Vec<UnifiedExtra>>,
    /// Derived payable total in the settlement currency.
    pub to_pay: Option<Decimal>,
    /// Pricing breakdown.
    pub to_pay_breakdown: Json<ToPayBreakdown>,
    /// Derived payment status.
    pub payment_status: PaymentStatus,
    /// Content hash of the last written material state.
    pub content_hash: Option<String>,
    /// Enrichment bookkeeping flag.
    pub enrichment_state: EnrichmentState,
    /// When enrichment last completed.
    pub enriched_at: Option<DateTime<Utc>>,
    /// FX quote snapshot attached by the linking engine.
    pub fx_on_checkin: Option<Json<super::fx::FxSnapshot>>,
    /// Host-recorded check-in time.
    pub checkin_at: Option<DateTime<Utc>>,
    /// Host-recorded check-out time.
    pub checkout_at: Option<DateTime<Utc>>,
    /// Host-recorded guest-contact time.
    pub contacted_at: Option<DateTime<Utc>>,
    /// When the document was first written.
    pub created_at: DateTime<Utc>,
    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create an empty document for a key.
    #[must_use]
    pub fn new(key: &ReservationKey) -> Self {
        let now = Utc::now();
        Self {
            property_id: key.property_id.clone(),
            external_reservation_id: key.external_reservation_id.clone(),
            room_id: key.room_id.clone(),
            guest_external_id: None,
            guest_name: None,
            guest_email: None,
            guest_phone: None,
            arrival_display: None,
            departure_display: None,
            arrival_date: None,
            departure_date: None,
            adults: 0,
            children: 0,
            status: "unknown".to_string(),
            channel: None,
            room_code: None,
            room_name: None,
            notes: Json(Vec::new()),
            payments: Json(Vec::new()),
            extras: Json(Vec::new()),
            to_pay: None,
            to_pay_breakdown: Json(ToPayBreakdown::default()),
            payment_status: PaymentStatus::Unpaid,
            content_hash: None,
            enrichment_state: EnrichmentState::Pending,
            enriched_at: None,
            fx_on_checkin: None,
            checkin_at: None,
            checkout_at: None,
            contacted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// This document's composite key.
    #[must_use]
    pub fn key(&self) -> ReservationKey {
        ReservationKey {
            property_id: self.property_id.clone(),
            external_reservation_id: self.external_reservation_id.clone(),
            room_id: self.room_id.clone(),
        }
    }

    /// JSON projection of the document, used for hashing, diffing and
    /// history snapshots.
    #[must_use]
    pub fn document_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Whether the normalized status marks this reservation cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status.contains("cancel")
    }

    /// Load one document by key.
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        key: &ReservationKey,
    ) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservations
            WHERE property_id = $1 AND external_reservation_id = $2 AND room_id = $3
            ",
        )
        .bind(&key.property_id)
        .bind(&key.external_reservation_id)
        .bind(&key.room_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Reservations whose enrichment has not yet completed.
    pub async fn find_pending_enrichment<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservations
            WHERE enrichment_state = 'pending'
              AND status NOT LIKE '%cancel%'
            ORDER BY updated_at
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Reservations still active: departure today or later.
    pub async fn find_active<'e, E: PgExecutor<'e>>(
        executor: E,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservations
            WHERE departure_date >= $1
              AND status NOT LIKE '%cancel%'
            ORDER BY departure_date
            LIMIT $2
            ",
        )
        .bind(today)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Any reservations, newest first; used by the `force` selection.
    pub async fn find_any<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservations
            ORDER BY updated_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Page through reservations arriving on a given date.
    pub async fn find_by_arrival<'e, E: PgExecutor<'e>>(
        executor: E,
        arrival: NaiveDate,
        property_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM reservations
            WHERE arrival_date = $1
              AND ($2::text IS NULL OR property_id = $2)
            ORDER BY property_id, external_reservation_id, room_id
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(arrival)
        .bind(property_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Write the document with merge semantics (insert or full update).
    pub async fn upsert<'e, E: PgExecutor<'e>>(&self, executor: E) -> Result<(), DbError> {
        sqlx::query(
            r"
            INSERT INTO reservations (
                property_id, external_reservation_id, room_id,
                guest_external_id, guest_name, guest_email, guest_phone,
                arrival_display, departure_display, arrival_date, departure_date,
                adults, children, status, channel, room_code, room_name,
                notes, payments, extras,
                to_pay, to_pay_breakdown, payment_status,
                content_hash, enrichment_state, enriched_at, fx_on_checkin,
                checkin_at, checkout_at, contacted_at,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19,
                $20, $21, $22, $23, $24, $25, $26, $27, $28, $29,
                $30, $31, now()
            )
            ON CONFLICT (property_id, external_reservation_id, room_id) DO UPDATE SET
                guest_external_id = EXCLUDED.guest_external_id,
                guest_name = EXCLUDED.guest_name,
                guest_email = EXCLUDED.guest_email,
                guest_phone = EXCLUDED.guest_phone,
                arrival_display = EXCLUDED.arrival_display,
                departure_display = EXCLUDED.departure_display,
                arrival_date = EXCLUDED.arrival_date,
                departure_date = EXCLUDED.departure_date,
                adults = EXCLUDED.adults,
                children = EXCLUDED.children,
                status = EXCLUDED.status,
                channel = EXCLUDED.channel,
                room_code = EXCLUDED.room_code,
                room_name = EXCLUDED.room_name,
                notes = EXCLUDED.notes,
                payments = EXCLUDED.payments,
                extras = EXCLUDED.extras,
                to_pay = EXCLUDED.to_pay,
                to_pay_breakdown = EXCLUDED.to_pay_breakdown,
                payment_status = EXCLUDED.payment_status,
                content_hash = EXCLUDED.content_hash,
                enrichment_state = EXCLUDED.enrichment_state,
                enriched_at = EXCLUDED.enriched_at,
                fx_on_checkin = EXCLUDED.fx_on_checkin,
                checkin_at = EXCLUDED.checkin_at,
                checkout_at = EXCLUDED.checkout_at,
                contacted_at = EXCLUDED.contacted_at,
                updated_at = now()
            ",
        )
        .bind(&self.property_id)
        .bind(&self.external_reservation_id)
        .bind(&self.room_id)
        .bind(&self.guest_external_id)
        .bind(&self.guest_name)
        .bind(&self.guest_email)
        .bind(&self.guest_phone)
        .bind(&self.arrival_display)
        .bind(&self.departure_display)
        .bind(self.arrival_date)
        .bind(self.departure_date)
        .bind(self.adults)
        .bind(self.children)
        .bind(&self.status)
        .bind(&self.channel)
        .bind(&self.room_code)
        .bind(&self.room_name)
        .bind(&self.notes)
        .bind(&self.payments)
        .bind(&self.extras)
        .bind(self.to_pay)
        .bind(&self.to_pay_breakdown)
        .bind(self.payment_status)
        .bind(&self.content_hash)
        .bind(self.enrichment_state)
        .bind(self.enriched_at)
        .bind(&self.fx_on_checkin)
        .bind(self.checkin_at)
        .bind(self.checkout_at)
        .bind(self.contacted_at)
        .bind(self.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}
