//! Enrichment merger.
//!
//! Fetches per-reservation supplementary data (customer identity,
//! payments, notes, extras) from the channel manager and merges it
//! into the stored document through the merge/dedupe engine, without
//! disturbing pricing fields already finalized by import or host
//! mutation. Newly discovered external payments are additionally
//! materialized into the payment ledger with deterministic ids.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lodgex_channel::{ChannelSource, Property, PropertyDirectory, RawExtra, RawNote, RawPayment};
use lodgex_core::{content_hash, diff_documents, Instant};
use lodgex_db::models::{
    ChangeType, EnrichmentState, EntrySource, HistoryEntry, PaymentLedgerEntry, Reservation,
    ReservationKey, ToPayBreakdown, UnifiedExtra, UnifiedNote, UnifiedPayment,
};
use lodgex_db::{DbPool, WriteSession};
use rust_decimal::Decimal;

use crate::calculator::{payment_status, preserve, recompute};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::merge::{reconcile, UnifiedEntry};

/// Which reservations an enrichment run selects.
#[derive(Debug, Clone)]
pub enum EnrichSelection {
    /// A single reservation by key.
    One(ReservationKey),
    /// Enrichment not yet completed (the default).
    Pending,
    /// Checkout today or later; re-syncs completed reservations.
    Active,
    /// Whatever the query returns, up to the limit.
    Force,
}

impl EnrichSelection {
    fn label(&self) -> &'static str {
        match self {
            Self::One(_) => "one",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Force => "force",
        }
    }
}

/// Options for an enrichment run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOptions {
    /// Maximum reservations to process; engine default when absent.
    pub limit: Option<i64>,
    /// Plan but write nothing.
    pub dry_run: bool,
    /// Rewrite even when the content hash is unchanged.
    pub force_update: bool,
}

/// Counters for one enrichment run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichSummary {
    /// Reservations matched by the selection.
    pub total_found: usize,
    /// Reservations actually processed.
    pub processed: usize,
    /// Reservations whose material content did not change.
    pub unchanged: usize,
    /// Reservations skipped for missing property configuration.
    pub skipped_no_config: usize,
    /// Ledger rows materialized for newly discovered payments.
    pub ledger_created: usize,
    /// Per-item errors captured without aborting the batch.
    pub errors: Vec<String>,
}

/// Supplementary data fetched for one reservation.
struct Supplement {
    customer: Option<lodgex_channel::RawCustomer>,
    payments: Vec<RawPayment>,
    notes: Vec<RawNote>,
    extras: Vec<RawExtra>,
}

/// Merges supplementary channel data into stored reservations.
pub struct EnrichmentMerger {
    pool: DbPool,
    config: SyncConfig,
    source: Arc<dyn ChannelSource>,
    directory: Arc<dyn PropertyDirectory>,
}

impl EnrichmentMerger {
    /// Create a merger over a pool and its collaborators.
    #[must_use]
    pub fn new(
        pool: DbPool,
        config: SyncConfig,
        source: Arc<dyn ChannelSource>,
        directory: Arc<dyn PropertyDirectory>,
    ) -> Self {
        Self {
            pool,
            config,
            source,
            directory,
        }
    }

    /// Enrich the selected reservations.
    #[instrument(skip(self, options), fields(selection = selection.label()))]
    pub async fn enrich(
        &self,
        selection: EnrichSelection,
        options: &EnrichOptions,
    ) -> SyncResult<EnrichSummary> {
        let limit = options.limit.unwrap_or(self.config.enrich_limit);
        let selected = self.select(&selection, limit).await?;

        let mut summary = EnrichSummary {
            total_found: selected.len(),
            ..Default::default()
        };
        let mut session = WriteSession::new(self.pool.clone(), self.config.session);

        for reservation in selected {
            let key = reservation.key();
            match self
                .enrich_one(reservation, &selection, options, &mut session, &mut summary)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    warn!(reservation = %key, error = %err, "Enrichment failed for reservation");
                    summary.errors.push(format!("{key}: {err}"));
                }
            }
        }

        session.commit().await?;
        info!(
            total_found = summary.total_found,
            processed = summary.processed,
            unchanged = summary.unchanged,
            skipped_no_config = summary.skipped_no_config,
            ledger_created = summary.ledger_created,
            "Enrichment run finished"
        );
        Ok(summary)
    }

    async fn select(
        &self,
        selection: &EnrichSelection,
        limit: i64,
    ) -> SyncResult<Vec<Reservation>> {
        match selection {
            EnrichSelection::One(key) => {
                let doc = Reservation::find(&self.pool, key)
                    .await?
                    .ok_or_else(|| SyncError::not_found("Reservation", key.to_string()))?;
                Ok(vec![doc])
            }
            EnrichSelection::Pending => {
                Ok(Reservation::find_pending_enrichment(&self.pool, limit).await?)
            }
            EnrichSelection::Active => {
                Ok(Reservation::find_active(&self.pool, Utc::now().date_naive(), limit).await?)
            }
            EnrichSelection::Force => Ok(Reservation::find_any(&self.pool, limit).await?),
        }
    }

    async fn enrich_one(
        &self,
        stored: Reservation,
        selection: &EnrichSelection,
        options: &EnrichOptions,
        session: &mut WriteSession,
        summary: &mut EnrichSummary,
    ) -> SyncResult<()> {
        let key = stored.key();

        let Some(property) = self.directory.property(&stored.property_id).await? else {
            summary.skipped_no_config += 1;
            debug!(reservation = %key, "Property not configured, skipping");
            return Ok(());
        };
        if property.credential().is_err() {
            summary.skipped_no_config += 1;
            debug!(reservation = %key, "Property has no credential, skipping");
            return Ok(());
        }

        let supplement = self.fetch_supplement(&property, &stored).await;
        summary.processed += 1;

        let before_value = stored.document_value();
        let prev_hash = stored
            .content_hash
            .clone()
            .unwrap_or_else(|| content_hash(&before_value));
        let was_pending = stored.enrichment_state == EnrichmentState::Pending;

        let previous_payment_ids: HashSet<String> =
            stored.payments.0.iter().map(UnifiedEntry::identity).collect();

        let mut doc = stored;
        apply_supplement(&mut doc, &supplement, &self.config.settlement_currency);
        doc.enrichment_state = EnrichmentState::Completed;
        doc.enriched_at = Some(Utc::now());

        let new_payments: Vec<UnifiedPayment> = doc
            .payments
            .0
            .iter()
            .filter(|p| p.source == EntrySource::External)
            .filter(|p| !previous_payment_ids.contains(&p.identity()))
            .cloned()
            .collect();

        let after_value = doc.document_value();
        let new_hash = content_hash(&after_value);
        doc.content_hash = Some(new_hash.clone());

        if new_hash == prev_hash && !options.force_update {
            summary.unchanged += 1;
            // Nothing material changed: no history entry. Still settle
            // the enrichment flag so pending selection converges.
            if was_pending && !options.dry_run {
                let conn = session.conn().await?;
                doc.upsert(&mut *conn).await?;
                session.note_writes(1).await?;
            }
            return Ok(());
        }

        if options.dry_run {
            return Ok(());
        }

        let entry = HistoryEntry::record(
            &key,
            "enrichment",
            selection.label(),
            ChangeType::Updated,
            serde_json::to_value(diff_documents(&before_value, &after_value))
                .map_err(lodgex_db::DbError::from)?,
            Some(prev_hash),
            Some(new_hash),
            after_value,
        );

        let conn = session.conn().await?;
        doc.upsert(&mut *conn).await?;
        entry.insert(&mut *conn).await?;
        let mut writes = 2;
        for payment in &new_payments {
            let ledger = PaymentLedgerEntry::from_payment(&key, payment);
            if ledger.insert_if_absent(&mut *conn).await? {
                summary.ledger_created += 1;
            }
            writes += 1;
        }
        session.note_writes(writes).await?;
        Ok(())
    }

    /// Fetch the four sub-resources concurrently; each failure degrades
    /// to an empty result rather than aborting the reservation.
    async fn fetch_supplement(&self, property: &Property, stored: &Reservation) -> Supplement {
        let code = &stored.external_reservation_id;
        let customer_fut = async {
            match &stored.guest_external_id {
                Some(customer_id) => match self.source.customer(property, customer_id).await {
                    Ok(found) => found,
                    Err(err) => {
                        warn!(customer_id = customer_id.as_str(), error = %err, "Customer fetch failed");
                        None
                    }
                },
                None => None,
            }
        };
        let payments_fut = async {
            self.source.payments(property, code).await.unwrap_or_else(|err| {
                warn!(reservation = code.as_str(), error = %err, "Payments fetch failed");
                Vec::new()
            })
        };
        let notes_fut = async {
            self.source.notes(property, code).await.unwrap_or_else(|err| {
                warn!(reservation = code.as_str(), error = %err, "Notes fetch failed");
                Vec::new()
            })
        };
        let extras_fut = async {
            self.source.extras(property, code).await.unwrap_or_else(|err| {
                warn!(reservation = code.as_str(), error = %err, "Extras fetch failed");
                Vec::new()
            })
        };

        let (customer, payments, notes, extras) =
            tokio::join!(customer_fut, payments_fut, notes_fut, extras_fut);
        Supplement {
            customer,
            payments,
            notes,
            extras,
        }
    }
}

/// Fallback timestamp for external entries that carry none; fixed so
/// fingerprints stay deterministic across runs.
fn entry_instant(explicit: Option<Instant>) -> Instant {
    explicit.unwrap_or_else(|| Instant::from_epoch_seconds(0))
}

/// Merge fetched supplementary data into the document in place.
fn apply_supplement(doc: &mut Reservation, supplement: &Supplement, settlement_currency: &str) {
    if let Some(customer) = &supplement.customer {
        if customer.name.is_some() {
            doc.guest_name = customer.name.clone();
        }
        if customer.email.is_some() {
            doc.guest_email = customer.email.clone();
        }
        if customer.phone.is_some() {
            doc.guest_phone = customer.phone.clone();
        }
    }

    let incoming_notes: Vec<UnifiedNote> = supplement
        .notes
        .iter()
        .map(|n| UnifiedNote {
            timestamp: entry_instant(n.created_at),
            actor: "channel".to_string(),
            source: EntrySource::External,
            external_id: n.external_id.clone(),
            text: n.text.clone(),
        })
        .collect();
    let incoming_payments: Vec<UnifiedPayment> = supplement
        .payments
        .iter()
        .map(|p| UnifiedPayment {
            timestamp: entry_instant(p.paid_at),
            actor: "channel".to_string(),
            source: EntrySource::External,
            external_id: p.external_id.clone(),
            amount: p.amount,
            currency: p.currency.clone(),
            method: p.method.clone(),
        })
        .collect();
    let incoming_extras: Vec<UnifiedExtra> = supplement
        .extras
        .iter()
        .map(|x| UnifiedExtra {
            timestamp: entry_instant(x.created_at),
            actor: "channel".to_string(),
            source: EntrySource::External,
            external_id: x.external_id.clone(),
            description: x.description.clone(),
            amount: x.amount,
            currency: x.currency.clone(),
        })
        .collect();

    doc.notes.0 = reconcile(&doc.notes.0, &incoming_notes);
    doc.payments.0 = reconcile(&doc.payments.0, &incoming_payments);
    doc.extras.0 = reconcile(&doc.extras.0, &incoming_extras);

    // Extras in the settlement currency may fill a never-set extras
    // amount; a host-set value is carried forward untouched.
    let extras_sum: Decimal = doc
        .extras
        .0
        .iter()
        .filter(|x| {
            x.currency
                .as_deref()
                .map_or(true, |c| c.eq_ignore_ascii_case(settlement_currency))
        })
        .map(|x| x.amount)
        .sum();
    let incoming_breakdown = ToPayBreakdown {
        extras_amount: (extras_sum > Decimal::ZERO).then_some(extras_sum),
        ..Default::default()
    };
    let preserved = preserve(&doc.to_pay_breakdown.0, &incoming_breakdown);

    let has_pricing = preserved.base_amount.is_some()
        || preserved.vat_amount.is_some()
        || preserved.extras_amount.is_some();
    if has_pricing {
        let totals = recompute(&preserved, None);
        doc.to_pay = Some(totals.total);
    }
    doc.payment_status = payment_status(
        doc.to_pay,
        &doc.payments.0,
        settlement_currency,
        preserved.fx_rate,
    );
    doc.to_pay_breakdown.0 = preserved;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodgex_db::models::PaymentStatus;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;

    fn stored() -> Reservation {
        let key = ReservationKey {
            property_id: "villa-aurora".to_string(),
            external_reservation_id: "BK-1001".to_string(),
            room_id: "ext-201".to_string(),
        };
        let mut doc = Reservation::new(&key);
        doc.to_pay_breakdown = Json(ToPayBreakdown {
            base_amount: Some(dec!(100)),
            ..Default::default()
        });
        doc.to_pay = Some(dec!(100.00));
        doc
    }

    fn supplement(payments: Vec<RawPayment>, extras: Vec<RawExtra>) -> Supplement {
        Supplement {
            customer: None,
            payments,
            notes: Vec::new(),
            extras,
        }
    }

    fn raw_payment(id: &str, amount: Decimal) -> RawPayment {
        RawPayment {
            external_id: Some(id.to_string()),
            amount,
            currency: "USD".to_string(),
            method: None,
            paid_at: Some(Instant::from_epoch_seconds(1_700_000_000)),
        }
    }

    #[test]
    fn test_supplement_merges_payments_and_updates_status() {
        let mut doc = stored();
        apply_supplement(
            &mut doc,
            &supplement(vec![raw_payment("p1", dec!(60))], Vec::new()),
            "USD",
        );
        assert_eq!(doc.payments.0.len(), 1);
        assert_eq!(doc.payment_status, PaymentStatus::Partial);

        apply_supplement(
            &mut doc,
            &supplement(
                vec![raw_payment("p1", dec!(60)), raw_payment("p2", dec!(40))],
                Vec::new(),
            ),
            "USD",
        );
        assert_eq!(doc.payments.0.len(), 2);
        assert_eq!(doc.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_supplement_is_idempotent_on_content_hash() {
        let mut doc = stored();
        let sup = supplement(vec![raw_payment("p1", dec!(60))], Vec::new());
        apply_supplement(&mut doc, &sup, "USD");
        let first = content_hash(&doc.document_value());
        apply_supplement(&mut doc, &sup, "USD");
        assert_eq!(first, content_hash(&doc.document_value()));
    }

    #[test]
    fn test_host_set_extras_amount_survives_external_extras() {
        let mut doc = stored();
        doc.to_pay_breakdown.0.extras_amount = Some(dec!(10));
        let extras = vec![RawExtra {
            external_id: Some("x1".to_string()),
            description: "Airport pickup".to_string(),
            amount: dec!(999),
            currency: Some("USD".to_string()),
            created_at: Some(Instant::from_epoch_seconds(1_700_000_100)),
        }];
        apply_supplement(&mut doc, &supplement(Vec::new(), extras), "USD");
        assert_eq!(doc.to_pay_breakdown.0.extras_amount, Some(dec!(10)));
        assert_eq!(doc.to_pay, Some(dec!(110.00)));
        // The extra itself still lands in the unified list.
        assert_eq!(doc.extras.0.len(), 1);
    }

    #[test]
    fn test_external_extras_fill_never_set_amount() {
        let mut doc = stored();
        let extras = vec![RawExtra {
            external_id: Some("x1".to_string()),
            description: "Late checkout".to_string(),
            amount: dec!(25),
            currency: None,
            created_at: None,
        }];
        apply_supplement(&mut doc, &supplement(Vec::new(), extras), "USD");
        assert_eq!(doc.to_pay_breakdown.0.extras_amount, Some(dec!(25)));
        assert_eq!(doc.to_pay, Some(dec!(125.00)));
    }

    #[test]
    fn test_customer_identity_fills_guest_fields() {
        let mut doc = stored();
        let sup = Supplement {
            customer: Some(lodgex_channel::RawCustomer {
                name: Some("Ada Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
                phone: None,
            }),
            payments: Vec::new(),
            notes: Vec::new(),
            extras: Vec::new(),
        };
        apply_supplement(&mut doc, &sup, "USD");
        assert_eq!(doc.guest_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(doc.guest_email.as_deref(), Some("ada@example.com"));
        assert!(doc.guest_phone.is_none());
    }

    #[test]
    fn test_no_pricing_reservation_keeps_to_pay_unset() {
        let key = ReservationKey {
            property_id: "p".to_string(),
            external_reservation_id: "r".to_string(),
            room_id: "rm".to_string(),
        };
        let mut doc = Reservation::new(&key);
        apply_supplement(&mut doc, &supplement(Vec::new(), Vec::new()), "USD");
        assert_eq!(doc.to_pay, None);
        assert_eq!(doc.payment_status, PaymentStatus::Unpaid);
    }
}
