//! Reservation upsert engine.
//!
//! Turns raw channel-manager reservations into per-room documents.
//! Cancelled records are filtered, rooms resolve through the property
//! room map, pricing flows through the financial calculator under the
//! preservation rule, and the content hash decides whether anything is
//! written at all. Writes run through a bounded write session with one
//! history entry per document write.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lodgex_channel::{ChannelSource, Property, PropertyDirectory, RawReservation, RawRoomStay, RoomMapping};
use lodgex_core::{content_hash, diff_documents, round2};
use lodgex_db::models::{ChangeType, HistoryEntry, Reservation, ReservationKey, ToPayBreakdown};
use lodgex_db::{DbPool, WriteSession};
use rust_decimal::Decimal;

use crate::calculator::{payment_status, preserve, recompute};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Options for an upsert run.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOptions {
    /// Count and plan, but write nothing.
    pub dry_run: bool,
}

/// Counters for one property's upsert run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Documents written (created or updated).
    pub upserts: usize,
    /// Room lines skipped (unmapped room or missing dates).
    pub skipped: usize,
    /// Cancelled reservation records filtered out.
    pub skipped_cancelled: usize,
    /// Documents whose content hash did not change.
    pub unchanged: usize,
}

/// Imports raw reservations for one property.
#[derive(Debug, Clone)]
pub struct UpsertEngine {
    pool: DbPool,
    config: SyncConfig,
}

impl UpsertEngine {
    /// Create an engine over a pool.
    #[must_use]
    pub fn new(pool: DbPool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Upsert a batch of raw reservations for a property.
    ///
    /// Idempotent: re-running with identical input writes nothing and
    /// counts every processed room line as `unchanged`.
    #[instrument(skip(self, raws, property), fields(property = %property.id, records = raws.len()))]
    pub async fn upsert(
        &self,
        raws: &[RawReservation],
        property: &Property,
        options: &UpsertOptions,
    ) -> SyncResult<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        let mut session = WriteSession::new(self.pool.clone(), self.config.session);

        for raw in raws {
            if raw.cancelled {
                summary.skipped_cancelled += 1;
                debug!(reservation = %raw.external_id, "Skipping cancelled reservation");
                continue;
            }

            for room in &raw.rooms {
                let Some(mapping) = property.resolve_room(&room.external_room_id) else {
                    summary.skipped += 1;
                    warn!(
                        reservation = %raw.external_id,
                        room = %room.external_room_id,
                        "Room not in property map, skipping"
                    );
                    continue;
                };
                if raw.arrival.is_none() || raw.departure.is_none() {
                    summary.skipped += 1;
                    warn!(reservation = %raw.external_id, "Missing stay dates, skipping");
                    continue;
                }

                let key = ReservationKey {
                    property_id: property.id.clone(),
                    external_reservation_id: raw.external_id.clone(),
                    room_id: room.external_room_id.clone(),
                };
                let existing = Reservation::find(&self.pool, &key).await?;
                let doc = build_room_document(
                    existing.as_ref(),
                    raw,
                    room,
                    mapping,
                    &key,
                    &self.config.settlement_currency,
                );

                if let Some(prev) = &existing {
                    let prev_hash = prev
                        .content_hash
                        .clone()
                        .unwrap_or_else(|| content_hash(&prev.document_value()));
                    if Some(&prev_hash) == doc.content_hash.as_ref() {
                        summary.unchanged += 1;
                        continue;
                    }
                }

                summary.upserts += 1;
                if options.dry_run {
                    continue;
                }

                let before = existing
                    .as_ref()
                    .map(Reservation::document_value)
                    .unwrap_or(serde_json::Value::Null);
                let after = doc.document_value();
                let entry = HistoryEntry::record(
                    &key,
                    "import",
                    "upsert",
                    if existing.is_some() {
                        ChangeType::Updated
                    } else {
                        ChangeType::Created
                    },
                    serde_json::to_value(diff_documents(&before, &after))
                        .map_err(lodgex_db::DbError::from)?,
                    existing.as_ref().and_then(|p| p.content_hash.clone()),
                    doc.content_hash.clone(),
                    after,
                );

                let conn = session.conn().await?;
                doc.upsert(&mut *conn).await?;
                entry.insert(&mut *conn).await?;
                session.note_writes(2).await?;
            }
        }

        session.commit().await?;
        info!(
            upserts = summary.upserts,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            skipped_cancelled = summary.skipped_cancelled,
            "Upsert run finished"
        );
        Ok(summary)
    }
}

/// Build the new per-room document from a raw reservation line.
///
/// Starts from the stored document when one exists, so fields the
/// import does not carry are kept. Pricing is only touched when the
/// room price is in the settlement currency, and then only through the
/// preservation rule.
fn build_room_document(
    existing: Option<&Reservation>,
    raw: &RawReservation,
    room: &RawRoomStay,
    mapping: &RoomMapping,
    key: &ReservationKey,
    settlement_currency: &str,
) -> Reservation {
    let mut doc = existing
        .cloned()
        .unwrap_or_else(|| Reservation::new(key));

    if raw.customer_id.is_some() {
        doc.guest_external_id = raw.customer_id.clone();
    }
    if raw.guest_name.is_some() {
        doc.guest_name = raw.guest_name.clone();
    }
    if raw.guest_email.is_some() {
        doc.guest_email = raw.guest_email.clone();
    }
    if raw.guest_phone.is_some() {
        doc.guest_phone = raw.guest_phone.clone();
    }
    if raw.channel.is_some() {
        doc.channel = raw.channel.clone();
    }
    doc.status = raw.status.clone();
    doc.arrival_display = raw.arrival_display.clone();
    doc.departure_display = raw.departure_display.clone();
    doc.arrival_date = raw.arrival;
    doc.departure_date = raw.departure;
    doc.adults = room.adults;
    doc.children = room.children;
    doc.room_code = Some(mapping.room_code.clone());
    doc.room_name = Some(mapping.room_name.clone());

    // Rooms without their own currency fall back to the reservation-level one.
    let in_settlement = room
        .currency
        .as_deref()
        .or(raw.currency.as_deref())
        .is_some_and(|c| c.eq_ignore_ascii_case(settlement_currency));
    if in_settlement {
        let room_count = Decimal::from(raw.rooms.len().max(1));
        let prorated_extras = raw.total_extras.map(|total| round2(total / room_count));
        let incoming = ToPayBreakdown {
            base_amount: room.price,
            extras_amount: prorated_extras,
            ..Default::default()
        };
        let preserved = preserve(&doc.to_pay_breakdown.0, &incoming);
        let totals = recompute(&preserved, None);
        doc.to_pay = Some(totals.total);
        doc.payment_status = payment_status(
            doc.to_pay,
            &doc.payments.0,
            settlement_currency,
            preserved.fx_rate,
        );
        doc.to_pay_breakdown.0 = preserved;
    }

    doc.content_hash = Some(content_hash(&doc.document_value()));
    doc
}

/// Outcome of one property inside a multi-property import.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyImportOutcome {
    /// Property id.
    pub property_id: String,
    /// Per-property counters when the property succeeded.
    pub summary: Option<UpsertSummary>,
    /// Error text when the property failed.
    pub error: Option<String>,
}

/// Aggregate result of an import over all active properties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// One outcome per processed property.
    pub properties: Vec<PropertyImportOutcome>,
}

impl ImportReport {
    /// Whether every property imported without error.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.properties.iter().all(|p| p.error.is_none())
    }
}

/// Which listing an import run fetches.
#[derive(Debug, Clone, Copy)]
enum ImportWindow {
    /// Reservations arriving inside a date range.
    Range(chrono::NaiveDate, chrono::NaiveDate),
    /// Reservations active today.
    Today,
}

/// Multi-property import job: fetch from the channel manager, upsert.
///
/// A network failure for one property is captured into its outcome and
/// never aborts the remaining properties.
pub struct ImportJob {
    engine: UpsertEngine,
    source: std::sync::Arc<dyn ChannelSource>,
    directory: std::sync::Arc<dyn PropertyDirectory>,
}

impl ImportJob {
    /// Create a job over an engine and its collaborators.
    #[must_use]
    pub fn new(
        engine: UpsertEngine,
        source: std::sync::Arc<dyn ChannelSource>,
        directory: std::sync::Arc<dyn PropertyDirectory>,
    ) -> Self {
        Self {
            engine,
            source,
            directory,
        }
    }

    /// Import reservations arriving inside a date range.
    #[instrument(skip(self, options))]
    pub async fn import_by_arrival(
        &self,
        since: chrono::NaiveDate,
        until: chrono::NaiveDate,
        options: &UpsertOptions,
    ) -> SyncResult<ImportReport> {
        self.run(ImportWindow::Range(since, until), options).await
    }

    /// Import reservations active today.
    #[instrument(skip(self, options))]
    pub async fn sync_today(&self, options: &UpsertOptions) -> SyncResult<ImportReport> {
        self.run(ImportWindow::Today, options).await
    }

    async fn run(&self, window: ImportWindow, options: &UpsertOptions) -> SyncResult<ImportReport> {
        let properties = self
            .directory
            .active_properties()
            .await
            .map_err(SyncError::from)?;
        let mut report = ImportReport::default();

        for property in properties {
            let property_id = property.id.clone();
            let fetched = match window {
                ImportWindow::Range(since, until) => {
                    self.source
                        .reservations_by_range(&property, since, until)
                        .await
                }
                ImportWindow::Today => self.source.reservations_today(&property).await,
            };
            let outcome = match fetched {
                Ok(raws) => match self.engine.upsert(&raws, &property, options).await {
                    Ok(summary) => PropertyImportOutcome {
                        property_id,
                        summary: Some(summary),
                        error: None,
                    },
                    Err(err) => PropertyImportOutcome {
                        property_id,
                        summary: None,
                        error: Some(err.to_string()),
                    },
                },
                Err(err) => {
                    warn!(property = %property.id, error = %err, "Channel fetch failed");
                    PropertyImportOutcome {
                        property_id,
                        summary: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            report.properties.push(outcome);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lodgex_db::models::PaymentStatus;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;

    fn mapping() -> RoomMapping {
        RoomMapping {
            room_code: "A2".to_string(),
            room_name: "Seaview Double".to_string(),
        }
    }

    fn key() -> ReservationKey {
        ReservationKey {
            property_id: "villa-aurora".to_string(),
            external_reservation_id: "BK-1001".to_string(),
            room_id: "ext-201".to_string(),
        }
    }

    fn raw(price: Option<Decimal>, currency: Option<&str>) -> (RawReservation, RawRoomStay) {
        let room = RawRoomStay {
            external_room_id: "ext-201".to_string(),
            adults: 2,
            children: 1,
            price,
            currency: currency.map(String::from),
        };
        let reservation = RawReservation {
            external_id: "BK-1001".to_string(),
            status: "confirmed".to_string(),
            cancelled: false,
            customer_id: Some("C-9".to_string()),
            guest_name: Some("Ada Lovelace".to_string()),
            guest_email: None,
            guest_phone: None,
            channel: Some("booking".to_string()),
            arrival_display: Some("01/06/2024".to_string()),
            departure_display: Some("05/06/2024".to_string()),
            arrival: NaiveDate::from_ymd_opt(2024, 6, 1),
            departure: NaiveDate::from_ymd_opt(2024, 6, 5),
            rooms: vec![room.clone()],
            total_extras: None,
            currency: currency.map(String::from),
        };
        (reservation, room)
    }

    #[test]
    fn test_build_document_from_scratch() {
        let (reservation, room) = raw(Some(dec!(400)), Some("USD"));
        let doc = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");

        assert_eq!(doc.guest_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(doc.room_code.as_deref(), Some("A2"));
        assert_eq!(doc.arrival_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(doc.to_pay, Some(dec!(400.00)));
        assert_eq!(doc.to_pay_breakdown.0.base_amount, Some(dec!(400)));
        assert_eq!(doc.payment_status, PaymentStatus::Unpaid);
        assert!(doc.content_hash.is_some());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (reservation, room) = raw(Some(dec!(400)), Some("USD"));
        let first = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");
        let second =
            build_room_document(Some(&first), &reservation, &room, &mapping(), &key(), "USD");
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_host_set_base_is_preserved() {
        let (reservation, room) = raw(Some(dec!(400)), Some("USD"));
        let mut stored = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");
        // Host pinned the base price.
        stored.to_pay_breakdown = Json(ToPayBreakdown {
            base_amount: Some(dec!(100)),
            ..Default::default()
        });

        let (reimport, room) = raw(Some(dec!(999)), Some("USD"));
        let doc = build_room_document(Some(&stored), &reimport, &room, &mapping(), &key(), "USD");
        assert_eq!(doc.to_pay_breakdown.0.base_amount, Some(dec!(100)));
        assert_eq!(doc.to_pay, Some(dec!(100.00)));
    }

    #[test]
    fn test_room_without_currency_uses_reservation_currency() {
        let (mut reservation, mut room) = raw(Some(dec!(400)), None);
        reservation.currency = Some("USD".to_string());
        room.currency = None;
        reservation.rooms = vec![room.clone()];

        let doc = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");
        assert_eq!(doc.to_pay, Some(dec!(400.00)));
        assert_eq!(doc.to_pay_breakdown.0.base_amount, Some(dec!(400)));
    }

    #[test]
    fn test_foreign_currency_rooms_leave_pricing_untouched() {
        let (reservation, room) = raw(Some(dec!(9000)), Some("UYU"));
        let doc = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");
        assert_eq!(doc.to_pay, None);
        assert!(doc.to_pay_breakdown.0.base_amount.is_none());
    }

    #[test]
    fn test_extras_prorated_across_rooms() {
        let (mut reservation, room) = raw(Some(dec!(400)), Some("USD"));
        reservation.total_extras = Some(dec!(90));
        let second_room = RawRoomStay {
            external_room_id: "ext-202".to_string(),
            ..room.clone()
        };
        reservation.rooms = vec![room.clone(), second_room, room.clone()];

        let doc = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");
        assert_eq!(doc.to_pay_breakdown.0.extras_amount, Some(dec!(30.00)));
        assert_eq!(doc.to_pay, Some(dec!(430.00)));
    }

    #[test]
    fn test_missing_incoming_guest_keeps_stored_value() {
        let (reservation, room) = raw(Some(dec!(400)), Some("USD"));
        let stored = build_room_document(None, &reservation, &room, &mapping(), &key(), "USD");

        let (mut reimport, room) = raw(Some(dec!(400)), Some("USD"));
        reimport.guest_name = None;
        let doc = build_room_document(Some(&stored), &reimport, &room, &mapping(), &key(), "USD");
        assert_eq!(doc.guest_name.as_deref(), Some("Ada Lovelace"));
    }
}
