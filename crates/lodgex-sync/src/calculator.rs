//! Financial breakdown calculator.
//!
//! Pure functions: computing the payable total from base/VAT/extras,
//! carrying host-set breakdown fields forward, and deriving the
//! payment status from the unified payments list. No function here
//! mutates its inputs or touches storage.

use rust_decimal::Decimal;

use lodgex_core::round2;
use lodgex_db::models::{PaymentStatus, ToPayBreakdown, UnifiedPayment};

/// Result of recomputing a breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownTotals {
    /// Payable total: base + VAT + extras, two decimals.
    pub total: Decimal,
    /// Base used (0 when absent).
    pub base_amount: Decimal,
    /// VAT amount used.
    pub vat_amount: Decimal,
    /// Extras amount used.
    pub extras_amount: Decimal,
}

/// Compute the payable total from a breakdown.
///
/// The VAT amount is taken verbatim when present; otherwise it is
/// derived from `vat_percent * base / 100` when a percent is set and
/// the base is positive. Extras use `extras_override` when given, else
/// the breakdown's own field, else 0.
#[must_use]
pub fn recompute(breakdown: &ToPayBreakdown, extras_override: Option<Decimal>) -> BreakdownTotals {
    let base = breakdown.base_amount.unwrap_or_default();
    let vat = match (breakdown.vat_amount, breakdown.vat_percent) {
        (Some(amount), _) => amount,
        (None, Some(percent)) if base > Decimal::ZERO => {
            round2(percent * base / Decimal::ONE_HUNDRED)
        }
        _ => Decimal::ZERO,
    };
    let extras = extras_override
        .or(breakdown.extras_amount)
        .unwrap_or_default();
    BreakdownTotals {
        total: round2(base + vat + extras),
        base_amount: base,
        vat_amount: vat,
        extras_amount: extras,
    }
}

/// Carry stored breakdown fields forward over imported values.
///
/// For every field, a non-null stored value wins; imported values only
/// fill fields that were never set. Only an explicit host mutation may
/// replace a stored value.
#[must_use]
pub fn preserve(stored: &ToPayBreakdown, incoming: &ToPayBreakdown) -> ToPayBreakdown {
    ToPayBreakdown {
        base_amount: stored.base_amount.or(incoming.base_amount),
        vat_percent: stored.vat_percent.or(incoming.vat_percent),
        vat_amount: stored.vat_amount.or(incoming.vat_amount),
        extras_amount: stored.extras_amount.or(incoming.extras_amount),
        fx_rate: stored.fx_rate.or(incoming.fx_rate),
    }
}

/// Derive the payment status from the unified payments list.
///
/// Payments in the settlement currency count at face value. Payments
/// in another currency are converted by dividing by `fx_rate` (units
/// of the payment currency per settlement unit); when no rate is
/// available those payments are ignored rather than failing.
#[must_use]
pub fn payment_status(
    to_pay: Option<Decimal>,
    payments: &[UnifiedPayment],
    settlement_currency: &str,
    fx_rate: Option<Decimal>,
) -> PaymentStatus {
    let mut paid = Decimal::ZERO;
    for payment in payments {
        if payment.currency.eq_ignore_ascii_case(settlement_currency) {
            paid += payment.amount;
        } else if let Some(rate) = fx_rate.filter(|r| *r > Decimal::ZERO) {
            paid += payment.amount / rate;
        }
    }

    if paid <= Decimal::ZERO {
        return PaymentStatus::Unpaid;
    }
    match to_pay {
        Some(total) if total > Decimal::ZERO => {
            if round2(paid) >= round2(total) {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Partial
            }
        }
        // A positive payment against an unknown total is partial.
        _ => PaymentStatus::Partial,
    }
}
