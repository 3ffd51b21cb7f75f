//! Normalization boundary for the provider's loosely-shaped payloads.
//!
//! The channel manager spells the same concept under several field
//! names (status under `status`/`state`/`reservation_status`, arrival
//! under `arrival`/`checkin_date`/`check_in`, and so on). Every known
//! alternate shape is mapped here, once, into the canonical records of
//! [`crate::types`]; nothing downstream ever touches the raw JSON.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use lodgex_core::money::parse_amount;
use lodgex_core::Instant;

use crate::types::{RawCustomer, RawExtra, RawNote, RawPayment, RawReservation, RawRoomStay};

/// Currency assumed when a payment carries none.
pub const DEFAULT_CURRENCY: &str = "USD";

const STATUS_KEYS: &[&str] = &["status", "state", "reservation_status", "booking_status"];
const CANCELLED_KEYS: &[&str] = &["cancelled", "is_cancelled", "canceled"];
const RESERVATION_ID_KEYS: &[&str] = &["id", "reservation_id", "code", "booking_code"];
const ARRIVAL_KEYS: &[&str] = &["arrival", "checkin_date", "check_in", "arrival_date"];
const DEPARTURE_KEYS: &[&str] = &["departure", "checkout_date", "check_out", "departure_date"];
const CHANNEL_KEYS: &[&str] = &["channel", "source", "ota"];
const ROOMS_KEYS: &[&str] = &["rooms", "room_stays", "units"];
const ROOM_ID_KEYS: &[&str] = &["room_id", "external_room_id", "id"];
const PRICE_KEYS: &[&str] = &["price", "amount", "total"];
const CURRENCY_KEYS: &[&str] = &["currency", "currency_code"];
const EXTRAS_TOTAL_KEYS: &[&str] = &["total_extras", "extras_total", "extras_amount"];
const TIMESTAMP_KEYS: &[&str] = &["created_at", "date", "timestamp", "paid_at"];

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first(map, keys).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_amount(map: &Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    first(map, keys).and_then(|v| parse_amount(v).ok().flatten())
}

fn first_i32(map: &Map<String, Value>, keys: &[&str]) -> Option<i32> {
    first(map, keys).and_then(|v| match v {
        Value::Number(n) => n.as_i64().map(|i| i as i32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Lowercase a status label and collapse separators to underscores.
#[must_use]
pub fn normalize_status(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_sep = false;
    for c in raw.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_sep = false;
        } else if !last_sep && !out.is_empty() {
            out.push('_');
            last_sep = true;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

/// Parse a provider date: ISO `YYYY-MM-DD`, display `DD/MM/YYYY`, or
/// any timestamp shape [`Instant`] understands.
#[must_use]
pub fn parse_date(raw: &Value) -> Option<NaiveDate> {
    if let Value::String(s) = raw {
        let s = s.trim();
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(d);
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
            return Some(d);
        }
    }
    Instant::from_json(raw).map(|i| i.date())
}

/// Normalize one raw reservation payload.
///
/// Returns `None` when no reservation code can be found under any of
/// the known field names; such records cannot be keyed and are useless.
#[must_use]
pub fn normalize_reservation(raw: &Value) -> Option<RawReservation> {
    let map = raw.as_object()?;
    let external_id = first_string(map, RESERVATION_ID_KEYS)?;

    let status_raw = first_string(map, STATUS_KEYS).unwrap_or_default();
    let status = normalize_status(&status_raw);
    let cancelled_flag = CANCELLED_KEYS
        .iter()
        .any(|k| map.get(*k).and_then(Value::as_bool).unwrap_or(false));
    let cancelled = cancelled_flag || status.contains("cancel");

    let guest = map
        .get("customer")
        .or_else(|| map.get("guest"))
        .and_then(Value::as_object);
    let guest_name = guest.and_then(|g| {
        first_string(g, &["name"]).or_else(|| {
            let from_first = first_string(g, &["first_name"]);
            let from_last = first_string(g, &["last_name"]);
            match (from_first, from_last) {
                (Some(f), Some(l)) => Some(format!("{f} {l}")),
                (Some(f), None) => Some(f),
                (None, Some(l)) => Some(l),
                (None, None) => None,
            }
        })
    });
    let customer_id = first_string(map, &["customer_id", "guest_id"])
        .or_else(|| guest.and_then(|g| first_string(g, &["id", "customer_id"])));

    let arrival_display = first_string(map, ARRIVAL_KEYS);
    let departure_display = first_string(map, DEPARTURE_KEYS);
    let arrival = first(map, ARRIVAL_KEYS).and_then(parse_date);
    let departure = first(map, DEPARTURE_KEYS).and_then(parse_date);

    let currency = first_string(map, CURRENCY_KEYS);
    let mut rooms: Vec<RawRoomStay> = first(map, ROOMS_KEYS)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_room).collect())
        .unwrap_or_default();
    // Some payloads state the currency once at the reservation level;
    // rooms without their own inherit it.
    if let Some(cur) = currency.as_deref() {
        for room in &mut rooms {
            if room.currency.is_none() {
                room.currency = Some(cur.to_string());
            }
        }
    }

    Some(RawReservation {
        external_id,
        status,
        cancelled,
        customer_id,
        guest_name,
        guest_email: guest.and_then(|g| first_string(g, &["email"])),
        guest_phone: guest.and_then(|g| first_string(g, &["phone", "telephone"])),
        channel: first_string(map, CHANNEL_KEYS),
        arrival_display,
        departure_display,
        arrival,
        departure,
        rooms,
        total_extras: first_amount(map, EXTRAS_TOTAL_KEYS),
        currency,
    })
}

fn normalize_room(raw: &Value) -> Option<RawRoomStay> {
    let map = raw.as_object()?;
    let external_room_id = first_string(map, ROOM_ID_KEYS)?;
    Some(RawRoomStay {
        external_room_id,
        adults: first_i32(map, &["adults", "pax", "guests"]).unwrap_or(0),
        children: first_i32(map, &["children", "kids"]).unwrap_or(0),
        price: first_amount(map, PRICE_KEYS),
        currency: first_string(map, CURRENCY_KEYS),
    })
}

/// Normalize one payment payload; `None` when no amount is present.
#[must_use]
pub fn normalize_payment(raw: &Value) -> Option<RawPayment> {
    let map = raw.as_object()?;
    let amount = first_amount(map, &["amount", "value", "total"])?;
    Some(RawPayment {
        external_id: first_string(map, &["id", "payment_id"]),
        amount,
        currency: first_string(map, CURRENCY_KEYS)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        method: first_string(map, &["method", "payment_method", "type"]),
        paid_at: first(map, TIMESTAMP_KEYS).and_then(Instant::from_json),
    })
}

/// Normalize one note payload; `None` when the text is empty.
#[must_use]
pub fn normalize_note(raw: &Value) -> Option<RawNote> {
    let map = raw.as_object()?;
    let text = first_string(map, &["text", "note", "body", "message"])?;
    Some(RawNote {
        external_id: first_string(map, &["id", "note_id"]),
        text,
        created_at: first(map, TIMESTAMP_KEYS).and_then(Instant::from_json),
    })
}

/// Normalize one extra-charge payload; `None` when no amount is present.
#[must_use]
pub fn normalize_extra(raw: &Value) -> Option<RawExtra> {
    let map = raw.as_object()?;
    let amount = first_amount(map, &["amount", "price", "total"])?;
    Some(RawExtra {
        external_id: first_string(map, &["id", "extra_id", "charge_id"]),
        description: first_string(map, &["description", "name", "concept"]).unwrap_or_default(),
        amount,
        currency: first_string(map, CURRENCY_KEYS),
        created_at: first(map, TIMESTAMP_KEYS).and_then(Instant::from_json),
    })
}

/// Normalize a customer identity payload.
#[must_use]
pub fn normalize_customer(raw: &Value) -> Option<RawCustomer> {
    let map = raw.as_object()?;
    let name = first_string(map, &["name"]).or_else(|| {
        let f = first_string(map, &["first_name"]);
        let l = first_string(map, &["last_name"]);
        match (f, l) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        }
    });
    Some(RawCustomer {
        name,
        email: first_string(map, &["email"]),
        phone: first_string(map, &["phone", "telephone"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_normalize_status_shapes() {
        assert_eq!(normalize_status("Confirmed"), "confirmed");
        assert_eq!(normalize_status("Checked In"), "checked_in");
        assert_eq!(normalize_status("CANCELLED-BY-GUEST"), "cancelled_by_guest");
        assert_eq!(normalize_status("  no show  "), "no_show");
        assert_eq!(normalize_status(""), "unknown");
    }

    #[test]
    fn test_status_under_alternate_keys() {
        for key in ["status", "state", "reservation_status", "booking_status"] {
            let raw = json!({"id": "BK-1", key: "Confirmed"});
            let r = normalize_reservation(&raw).unwrap();
            assert_eq!(r.status, "confirmed", "key {key}");
        }
    }

    #[test]
    fn test_cancellation_via_boolean_keys() {
        for key in ["cancelled", "is_cancelled", "canceled"] {
            let raw = json!({"id": "BK-1", "status": "Confirmed", key: true});
            let r = normalize_reservation(&raw).unwrap();
            assert!(r.cancelled, "key {key}");
        }
    }

    #[test]
    fn test_cancellation_via_status_text() {
        let raw = json!({"id": "BK-1", "state": "Cancelled by guest"});
        let r = normalize_reservation(&raw).unwrap();
        assert!(r.cancelled);
        assert_eq!(r.status, "cancelled_by_guest");
    }

    #[test]
    fn test_reservation_id_under_alternate_keys() {
        for key in ["id", "reservation_id", "code", "booking_code"] {
            let raw = json!({key: "BK-7"});
            assert_eq!(normalize_reservation(&raw).unwrap().external_id, "BK-7");
        }
        let numeric = json!({"id": 42});
        assert_eq!(normalize_reservation(&numeric).unwrap().external_id, "42");
    }

    #[test]
    fn test_reservation_without_id_is_dropped() {
        assert!(normalize_reservation(&json!({"status": "Confirmed"})).is_none());
        assert!(normalize_reservation(&json!("not an object")).is_none());
    }

    #[test]
    fn test_dates_under_alternate_keys_and_formats() {
        for key in ["arrival", "checkin_date", "check_in", "arrival_date"] {
            let raw = json!({"id": "BK-1", key: "2024-06-01"});
            let r = normalize_reservation(&raw).unwrap();
            assert_eq!(
                r.arrival,
                Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
                "key {key}"
            );
        }
        let display = json!({"id": "BK-1", "arrival": "01/06/2024", "departure": "05/06/2024"});
        let r = normalize_reservation(&display).unwrap();
        assert_eq!(r.arrival, Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
        assert_eq!(r.departure, Some(NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()));
        assert_eq!(r.arrival_display.as_deref(), Some("01/06/2024"));
    }

    #[test]
    fn test_guest_identity_nested_shapes() {
        let nested = json!({
            "id": "BK-1",
            "customer": {"first_name": "Ada", "last_name": "Lovelace", "email": "ada@example.com"},
        });
        let r = normalize_reservation(&nested).unwrap();
        assert_eq!(r.guest_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(r.guest_email.as_deref(), Some("ada@example.com"));

        let guest_key = json!({"id": "BK-1", "guest": {"name": "Grace Hopper", "phone": "+1 555"}});
        let r = normalize_reservation(&guest_key).unwrap();
        assert_eq!(r.guest_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(r.guest_phone.as_deref(), Some("+1 555"));
    }

    #[test]
    fn test_customer_id_top_level_or_nested() {
        let top = json!({"id": "BK-1", "customer_id": "C-9"});
        assert_eq!(
            normalize_reservation(&top).unwrap().customer_id.as_deref(),
            Some("C-9")
        );
        let nested = json!({"id": "BK-1", "customer": {"id": 77}});
        assert_eq!(
            normalize_reservation(&nested).unwrap().customer_id.as_deref(),
            Some("77")
        );
    }

    #[test]
    fn test_rooms_under_alternate_keys() {
        for key in ["rooms", "room_stays", "units"] {
            let raw = json!({
                "id": "BK-1",
                key: [
                    {"room_id": "ext-201", "adults": 2, "price": "150.00", "currency": "USD"},
                    {"id": "ext-202", "pax": 3, "kids": 1, "amount": 90},
                ],
            });
            let r = normalize_reservation(&raw).unwrap();
            assert_eq!(r.rooms.len(), 2, "key {key}");
            assert_eq!(r.rooms[0].external_room_id, "ext-201");
            assert_eq!(r.rooms[0].price, Some(dec!(150.00)));
            assert_eq!(r.rooms[1].adults, 3);
            assert_eq!(r.rooms[1].children, 1);
            assert_eq!(r.rooms[1].price, Some(dec!(90)));
        }
    }

    #[test]
    fn test_rooms_inherit_reservation_level_currency() {
        let raw = json!({
            "id": "BK-1",
            "currency": "USD",
            "rooms": [
                {"room_id": "ext-201", "price": "150.00"},
                {"room_id": "ext-202", "price": 90, "currency": "EUR"},
            ],
        });
        let r = normalize_reservation(&raw).unwrap();
        assert_eq!(r.currency.as_deref(), Some("USD"));
        assert_eq!(r.rooms[0].currency.as_deref(), Some("USD"));
        // A room's own currency is never overridden.
        assert_eq!(r.rooms[1].currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_extras_total_under_alternate_keys() {
        for key in ["total_extras", "extras_total", "extras_amount"] {
            let raw = json!({"id": "BK-1", key: "35.50"});
            let r = normalize_reservation(&raw).unwrap();
            assert_eq!(r.total_extras, Some(dec!(35.50)), "key {key}");
        }
    }

    #[test]
    fn test_normalize_payment() {
        let raw = json!({
            "payment_id": "pay-9",
            "amount": "60.00",
            "currency": "EUR",
            "method": "card",
            "created_at": {"seconds": 1_700_000_000},
        });
        let p = normalize_payment(&raw).unwrap();
        assert_eq!(p.external_id.as_deref(), Some("pay-9"));
        assert_eq!(p.amount, dec!(60.00));
        assert_eq!(p.currency, "EUR");
        assert_eq!(p.paid_at.unwrap().epoch_seconds(), 1_700_000_000);

        let no_currency = json!({"amount": 10});
        assert_eq!(normalize_payment(&no_currency).unwrap().currency, "USD");

        assert!(normalize_payment(&json!({"method": "card"})).is_none());
    }

    #[test]
    fn test_normalize_note() {
        for key in ["text", "note", "body", "message"] {
            let raw = json!({key: "late arrival", "id": "w1"});
            let n = normalize_note(&raw).unwrap();
            assert_eq!(n.text, "late arrival", "key {key}");
        }
        assert!(normalize_note(&json!({"text": "   "})).is_none());
        assert!(normalize_note(&json!({"id": "w1"})).is_none());
    }

    #[test]
    fn test_normalize_extra() {
        let raw = json!({"charge_id": "x1", "name": "Airport pickup", "price": 25});
        let e = normalize_extra(&raw).unwrap();
        assert_eq!(e.description, "Airport pickup");
        assert_eq!(e.amount, dec!(25));
        assert!(normalize_extra(&json!({"name": "no amount"})).is_none());
    }

    #[test]
    fn test_normalize_customer_name_assembly() {
        let c = normalize_customer(&json!({"first_name": "Ada", "last_name": "Lovelace"})).unwrap();
        assert_eq!(c.name.as_deref(), Some("Ada Lovelace"));
        let c = normalize_customer(&json!({"name": "Grace", "telephone": "+1"})).unwrap();
        assert_eq!(c.phone.as_deref(), Some("+1"));
    }
}
