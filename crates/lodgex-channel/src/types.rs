//! Canonical records produced by the normalization boundary.
//!
//! Everything downstream of [`crate::normalize`] works with these
//! shapes; the provider's alternate field names never escape that
//! module.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lodgex_core::Instant;

/// A reservation as returned by the provider, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReservation {
    /// Reservation code in the provider.
    pub external_id: String,
    /// Normalized lowercase snake-case status.
    pub status: String,
    /// Whether any of the cancellation signals was set.
    pub cancelled: bool,
    /// Customer id in the provider, when present.
    pub customer_id: Option<String>,
    /// Guest display name.
    pub guest_name: Option<String>,
    /// Guest email.
    pub guest_email: Option<String>,
    /// Guest phone.
    pub guest_phone: Option<String>,
    /// Booking channel label.
    pub channel: Option<String>,
    /// Arrival in the provider's display format.
    pub arrival_display: Option<String>,
    /// Departure in the provider's display format.
    pub departure_display: Option<String>,
    /// Arrival as a calendar date.
    pub arrival: Option<NaiveDate>,
    /// Departure as a calendar date.
    pub departure: Option<NaiveDate>,
    /// Room lines inside the reservation.
    pub rooms: Vec<RawRoomStay>,
    /// Extras total for the whole reservation, in `currency`.
    pub total_extras: Option<Decimal>,
    /// Currency of the reservation's price fields.
    pub currency: Option<String>,
}

/// One room line inside a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRoomStay {
    /// Room id in the provider.
    pub external_room_id: String,
    /// Adult occupancy.
    pub adults: i32,
    /// Child occupancy.
    pub children: i32,
    /// Room price for the stay.
    pub price: Option<Decimal>,
    /// Currency of the room price.
    pub currency: Option<String>,
}

/// A payment attached to a reservation in the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayment {
    /// Payment id in the provider, when present.
    pub external_id: Option<String>,
    /// Paid amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Payment method label.
    pub method: Option<String>,
    /// When the payment was made.
    pub paid_at: Option<Instant>,
}

/// A note attached to a reservation in the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    /// Note id in the provider, when present.
    pub external_id: Option<String>,
    /// Note body.
    pub text: String,
    /// When the note was written.
    pub created_at: Option<Instant>,
}

/// An extra charge attached to a reservation in the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtra {
    /// Charge id in the provider, when present.
    pub external_id: Option<String>,
    /// What the charge is for.
    pub description: String,
    /// Charged amount.
    pub amount: Decimal,
    /// Currency code, when known.
    pub currency: Option<String>,
    /// When the charge was added.
    pub created_at: Option<Instant>,
}

/// Customer identity from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCustomer {
    /// Display name.
    pub name: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Phone.
    pub phone: Option<String>,
}
