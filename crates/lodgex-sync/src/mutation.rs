//! Host mutation handler.
//!
//! Applies a named host action to one reservation document: timestamp
//! markers (check-in, check-out, guest contact), unified-list appends
//! (notes, payments) and pricing-breakdown edits. Each successful
//! mutation writes the document and its history entry in a single
//! transaction; the history entry carries the raw action payload for
//! audit.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use lodgex_core::{content_hash, diff_documents, money::parse_amount, round2, FieldPatch, Instant};
use lodgex_db::models::{
    ChangeType, EntrySource, FxQuote, HistoryEntry, PaymentStatus, Reservation, ReservationKey,
    UnifiedNote, UnifiedPayment,
};
use lodgex_db::{DbError, DbPool};

use crate::calculator::{payment_status, recompute};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::merge::reconcile;

/// Who is performing a host action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Actor {
    /// Stable user id, when authenticated.
    pub uid: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Email.
    pub email: Option<String>,
}

impl Actor {
    /// Best available label for unified-list attribution.
    #[must_use]
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.email.clone())
            .or_else(|| self.uid.clone())
            .unwrap_or_else(|| "host".to_string())
    }
}

/// The supported host actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    /// Record the guest's arrival.
    CheckIn,
    /// Record the guest's departure.
    CheckOut,
    /// Record that the guest was contacted.
    Contact,
    /// Append a note.
    AddNote,
    /// Append a payment.
    AddPayment,
    /// Edit the pricing breakdown.
    SetToPay,
}

impl HostAction {
    /// Parse an action name; unknown names are an invalid request.
    pub fn parse(name: &str) -> SyncResult<Self> {
        match name {
            "checkin" | "check_in" => Ok(Self::CheckIn),
            "checkout" | "check_out" => Ok(Self::CheckOut),
            "contact" => Ok(Self::Contact),
            "add_note" | "addNote" => Ok(Self::AddNote),
            "add_payment" | "addPayment" => Ok(Self::AddPayment),
            "set_to_pay" | "setToPay" => Ok(Self::SetToPay),
            other => Err(SyncError::InvalidRequest {
                message: format!("unsupported action '{other}'"),
            }),
        }
    }

    /// Canonical name, used as the history context.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckIn => "checkin",
            Self::CheckOut => "checkout",
            Self::Contact => "contact",
            Self::AddNote => "add_note",
            Self::AddPayment => "add_payment",
            Self::SetToPay => "set_to_pay",
        }
    }
}

/// What a mutation changed.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    /// Top-level document keys that changed.
    pub updated_fields: Vec<String>,
    /// Payment status after the mutation.
    pub payment_status: PaymentStatus,
    /// Payable total after the mutation.
    pub to_pay: Option<Decimal>,
}

/// Payload field lookup accepting both snake_case and camelCase keys.
fn field<'a>(payload: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    payload.get(snake).or_else(|| payload.get(camel))
}

/// Applies host actions to reservation documents.
pub struct MutationHandler {
    pool: DbPool,
    config: SyncConfig,
}

impl MutationHandler {
    /// Create a handler over a pool.
    #[must_use]
    pub fn new(pool: DbPool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Apply one named action to one reservation.
    #[instrument(skip(self, payload, actor), fields(reservation = %key, action = action_name))]
    pub async fn apply(
        &self,
        key: &ReservationKey,
        action_name: &str,
        payload: &Value,
        actor: &Actor,
    ) -> SyncResult<MutationOutcome> {
        let action = HostAction::parse(action_name)?;
        let stored = Reservation::find(&self.pool, key)
            .await?
            .ok_or_else(|| SyncError::not_found("Reservation", key.to_string()))?;

        let before_value = stored.document_value();
        let prev_hash = stored
            .content_hash
            .clone()
            .unwrap_or_else(|| content_hash(&before_value));

        let mut doc = stored;
        let now = Instant::now();
        match action {
            HostAction::CheckIn => doc.checkin_at = Some(parse_when(payload, now).0),
            HostAction::CheckOut => doc.checkout_at = Some(parse_when(payload, now).0),
            HostAction::Contact => doc.contacted_at = Some(parse_when(payload, now).0),
            HostAction::AddNote => apply_note(&mut doc, payload, actor, now)?,
            HostAction::AddPayment => {
                let rate = self.resolve_rate(&doc, payload).await?;
                apply_payment(
                    &mut doc,
                    payload,
                    actor,
                    &self.config.settlement_currency,
                    rate,
                    now,
                )?;
            }
            HostAction::SetToPay => {
                let rate = self.resolve_rate(&doc, payload).await?;
                apply_set_to_pay(&mut doc, payload, &self.config.settlement_currency, rate)?;
            }
        }

        let after_value = doc.document_value();
        let diff = diff_documents(&before_value, &after_value);
        if diff.is_empty() {
            return Ok(MutationOutcome {
                updated_fields: Vec::new(),
                payment_status: doc.payment_status,
                to_pay: doc.to_pay,
            });
        }
        let updated_fields: Vec<String> = diff.keys().cloned().collect();

        let new_hash = content_hash(&after_value);
        doc.content_hash = Some(new_hash.clone());
        let entry = HistoryEntry::record(
            key,
            "mutation",
            action.name(),
            ChangeType::Updated,
            serde_json::to_value(&diff).map_err(DbError::from)?,
            Some(prev_hash),
            Some(new_hash),
            after_value,
        )
        .with_action_payload(payload.clone());

        let mut tx = self.pool.begin().await.map_err(DbError::ConnectionFailed)?;
        doc.upsert(&mut *tx).await?;
        entry.insert(&mut *tx).await?;
        tx.commit().await.map_err(DbError::QueryFailed)?;

        info!(
            actor = actor.label(),
            updated = updated_fields.len(),
            "Host action applied"
        );
        Ok(MutationOutcome {
            updated_fields,
            payment_status: doc.payment_status,
            to_pay: doc.to_pay,
        })
    }

    /// Effective FX rate for payment-status conversion.
    ///
    /// The arrival-date quote for the settlement currency wins; when no
    /// quote exists the caller-supplied payload rate is used, then the
    /// stored breakdown rate. The lookup is skipped entirely while
    /// every payment is in the settlement currency.
    async fn resolve_rate(
        &self,
        doc: &Reservation,
        payload: &Value,
    ) -> SyncResult<Option<Decimal>> {
        let settlement = &self.config.settlement_currency;
        let incoming_currency = payload.get("currency").and_then(Value::as_str);
        let any_foreign = doc
            .payments
            .0
            .iter()
            .map(|p| p.currency.as_str())
            .chain(incoming_currency)
            .any(|c| !c.eq_ignore_ascii_case(settlement));
        if !any_foreign {
            return Ok(None);
        }

        if let Some(arrival) = doc.arrival_date {
            if let Some(quote) = FxQuote::find(&self.pool, settlement, arrival).await? {
                return Ok(Some(quote.sell_rate));
            }
        }
        if let Some(value) = field(payload, "fx_rate", "fxRate") {
            if let Some(rate) = parse_amount(value).map_err(SyncError::from)? {
                return Ok(Some(rate));
            }
        }
        Ok(doc.to_pay_breakdown.0.fx_rate)
    }
}

/// Timestamp for the check-in/out/contact markers: `payload.when` in
/// any accepted shape, falling back to now.
fn parse_when(payload: &Value, now: Instant) -> Instant {
    payload
        .get("when")
        .and_then(Instant::from_json)
        .unwrap_or(now)
}

fn apply_note(
    doc: &mut Reservation,
    payload: &Value,
    actor: &Actor,
    now: Instant,
) -> SyncResult<()> {
    let text = field(payload, "text", "note")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(SyncError::validation("note text is required"));
    }
    let note = UnifiedNote {
        timestamp: now,
        actor: actor.label(),
        source: EntrySource::Host,
        external_id: None,
        text: text.to_string(),
    };
    doc.notes.0 = reconcile(&doc.notes.0, &[note]);
    Ok(())
}

fn apply_payment(
    doc: &mut Reservation,
    payload: &Value,
    actor: &Actor,
    settlement_currency: &str,
    fx_rate: Option<Decimal>,
    now: Instant,
) -> SyncResult<()> {
    let amount = payload
        .get("amount")
        .map(parse_amount)
        .transpose()?
        .flatten()
        .ok_or_else(|| SyncError::validation("payment amount is required"))?;
    if amount <= Decimal::ZERO {
        return Err(SyncError::validation("payment amount must be positive"));
    }
    let currency = payload
        .get("currency")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(settlement_currency)
        .to_uppercase();
    let method = payload.get("method").and_then(Value::as_str).map(String::from);

    let payment = UnifiedPayment {
        timestamp: now,
        actor: actor.label(),
        source: EntrySource::Host,
        external_id: None,
        amount: round2(amount),
        currency,
        method,
    };
    doc.payments.0 = reconcile(&doc.payments.0, &[payment]);
    doc.payment_status = payment_status(doc.to_pay, &doc.payments.0, settlement_currency, fx_rate);
    Ok(())
}

fn apply_set_to_pay(
    doc: &mut Reservation,
    payload: &Value,
    settlement_currency: &str,
    fx_rate: Option<Decimal>,
) -> SyncResult<()> {
    let base = FieldPatch::from_json(field(payload, "base_amount", "baseAmount"))?;
    let vat_percent = FieldPatch::from_json(field(payload, "vat_percent", "vatPercent"))?;
    let vat_amount = FieldPatch::from_json(field(payload, "vat_amount", "vatAmount"))?;
    // cleaning_fee is a legacy alias for the extras amount, accepted on
    // input only; stored documents never carry it.
    let extras_value = field(payload, "extras_amount", "extrasAmount")
        .or_else(|| field(payload, "cleaning_fee", "cleaningFee"));
    let extras = FieldPatch::from_json(extras_value)?;
    let rate = FieldPatch::from_json(field(payload, "fx_rate", "fxRate"))?;

    let mut breakdown = doc.to_pay_breakdown.0.clone();
    breakdown.base_amount = base.apply(breakdown.base_amount);
    breakdown.vat_percent = vat_percent.apply(breakdown.vat_percent);
    breakdown.vat_amount = vat_amount.apply(breakdown.vat_amount);
    breakdown.extras_amount = extras.apply(breakdown.extras_amount);
    breakdown.fx_rate = rate.apply(breakdown.fx_rate);

    let has_pricing = breakdown.base_amount.is_some()
        || breakdown.vat_amount.is_some()
        || breakdown.extras_amount.is_some();
    doc.to_pay = has_pricing.then(|| recompute(&breakdown, None).total);
    doc.payment_status = payment_status(
        doc.to_pay,
        &doc.payments.0,
        settlement_currency,
        breakdown.fx_rate.or(fx_rate),
    );
    doc.to_pay_breakdown.0 = breakdown;
    Ok(())
}
