//! Integration tests for the channel-manager client using wiremock.
//!
//! These tests verify pagination, API-key auth, sub-resource fetches,
//! normalization at the boundary, and error mapping.

use std::collections::HashMap;

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lodgex_channel::{
    ChannelConfig, ChannelError, ChannelSource, HttpChannelSource, Property, RoomMapping,
};

fn test_property() -> Property {
    let mut room_map = HashMap::new();
    room_map.insert(
        "ext-201".to_string(),
        RoomMapping {
            room_code: "A2".to_string(),
            room_name: "Seaview Double".to_string(),
        },
    );
    Property {
        id: "villa-aurora".to_string(),
        display_name: "Villa Aurora".to_string(),
        api_key: Some("secret-key".to_string()),
        room_map,
    }
}

fn test_source(server: &MockServer) -> HttpChannelSource {
    let config = ChannelConfig {
        base_url: server.uri(),
        page_size: 2,
        ..ChannelConfig::default()
    };
    HttpChannelSource::new(config).unwrap()
}

#[tokio::test]
async fn test_reservations_paginate_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reservations"))
        .and(header("X-Api-Key", "secret-key"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "BK-1", "status": "Confirmed"},
                {"id": "BK-2", "state": "Checked In"},
            ],
            "has_more": true,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/reservations"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"code": "BK-3"}],
            "has_more": false,
        })))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let reservations = source
        .reservations_by_range(
            &test_property(),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(reservations.len(), 3);
    assert_eq!(reservations[0].external_id, "BK-1");
    assert_eq!(reservations[1].status, "checked_in");
    assert_eq!(reservations[2].external_id, "BK-3");
}

#[tokio::test]
async fn test_payments_are_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reservations/BK-1/payments"))
        .and(header("X-Api-Key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"payment_id": "pay-1", "amount": "60.00", "currency": "USD", "method": "card"},
                {"amount": 40, "created_at": {"seconds": 1_700_000_000}},
                {"method": "card-without-amount"},
            ],
        })))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let payments = source.payments(&test_property(), "BK-1").await.unwrap();

    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0].external_id.as_deref(), Some("pay-1"));
    assert_eq!(payments[0].amount, dec!(60.00));
    assert_eq!(payments[1].currency, "USD");
    assert_eq!(payments[1].paid_at.unwrap().epoch_seconds(), 1_700_000_000);
}

#[tokio::test]
async fn test_customer_not_found_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customers/C-404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let customer = source.customer(&test_property(), "C-404").await.unwrap();
    assert!(customer.is_none());
}

#[tokio::test]
async fn test_server_error_maps_to_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reservations/BK-1/notes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let err = source.notes(&test_property(), "BK-1").await.unwrap_err();
    match err {
        ChannelError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_request() {
    let server = MockServer::start().await;
    let source = test_source(&server);

    let mut property = test_property();
    property.api_key = None;

    let err = source.extras(&property, "BK-1").await.unwrap_err();
    assert!(matches!(err, ChannelError::MissingCredential { .. }));
}
