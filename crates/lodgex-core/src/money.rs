//! Money rounding and three-state field patches.
//!
//! Pricing fields in a mutation payload carry three distinct states:
//! omitted (keep the stored value), present but empty/null (clear the
//! stored value), or present as a number (normalize and store). The
//! [`FieldPatch`] type makes that distinction explicit so every writer
//! honors the preservation rule the same way.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::error::CoreError;

/// Round an amount to two decimal places, midpoint away from zero.
#[must_use]
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a JSON value into a decimal amount.
///
/// Accepts JSON numbers and numeric strings; returns `None` for null
/// and empty/whitespace strings, `Err` for anything unparseable.
pub fn parse_amount(value: &Value) -> Result<Option<Decimal>, CoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| CoreError::validation(format!("amount out of range: {n}"))),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<Decimal>()
                .map(Some)
                .map_err(|_| CoreError::validation(format!("not a numeric amount: '{s}'")))
        }
        other => Err(CoreError::validation(format!(
            "expected a numeric amount, got {other}"
        ))),
    }
}

/// Three-state patch for a nullable pricing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPatch {
    /// Field omitted from the payload: keep the stored value.
    Keep,
    /// Field present but empty/null: clear the stored value.
    Clear,
    /// Field present as a number: store this normalized value.
    Set(Decimal),
}

impl FieldPatch {
    /// Interpret an optional payload field.
    ///
    /// `None` means the key was absent; a null or empty-string value
    /// clears; a numeric value sets (normalized to two decimals).
    pub fn from_json(value: Option<&Value>) -> Result<Self, CoreError> {
        match value {
            None => Ok(Self::Keep),
            Some(v) => match parse_amount(v)? {
                None => Ok(Self::Clear),
                Some(amount) => Ok(Self::Set(round2(amount))),
            },
        }
    }

    /// Apply this patch to a stored value.
    #[must_use]
    pub fn apply(self, stored: Option<Decimal>) -> Option<Decimal> {
        match self {
            Self::Keep => stored,
            Self::Clear => None,
            Self::Set(amount) => Some(amount),
        }
    }

    /// Whether this patch changes anything relative to `Keep`.
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Keep)
    }
}
