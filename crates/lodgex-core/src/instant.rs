//! Canonical instant type for upstream timestamp shapes.
//!
//! The channel manager and stored documents carry timestamps in several
//! shapes: a Unix-seconds integer, an object with a `seconds` (or
//! `_seconds`) field, or an ISO-8601 string. Every comparison in the
//! engines happens on one canonical form; this module is the only place
//! those shapes are interpreted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A canonical point in time with seconds resolution semantics.
///
/// Wraps a `DateTime<Utc>`; equality and ordering in merge logic use
/// [`Instant::epoch_seconds`] so sub-second noise from mixed sources
/// never affects identity or sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(pub DateTime<Utc>);

impl Instant {
    /// The current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Build from Unix seconds.
    #[must_use]
    pub fn from_epoch_seconds(secs: i64) -> Self {
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Unix seconds for this instant.
    #[must_use]
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// The calendar date (UTC) of this instant.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Interpret any of the known upstream timestamp shapes.
    ///
    /// Accepts a Unix-seconds number, an object carrying `seconds` or
    /// `_seconds`, or a string parseable as RFC 3339, as a naive
    /// `YYYY-MM-DD HH:MM:SS` datetime, or as a bare `YYYY-MM-DD` date.
    /// Returns `None` for anything else.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
                Some(Self::from_epoch_seconds(secs))
            }
            Value::Object(map) => {
                let secs = map.get("seconds").or_else(|| map.get("_seconds"))?;
                secs.as_i64().map(Self::from_epoch_seconds)
            }
            Value::String(s) => Self::parse_str(s),
            _ => None,
        }
    }

    /// Parse a string timestamp in any of the accepted text formats.
    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self(dt.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(Self(Utc.from_utc_datetime(&naive)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Self(Utc.from_utc_datetime(&naive)));
        }
        None
    }
}

impl From<DateTime<Utc>> for Instant {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl std::fmt::Display for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
