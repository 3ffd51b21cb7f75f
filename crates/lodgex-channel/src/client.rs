//! Channel-manager source trait and its HTTP implementation.
//!
//! All calls are read-only. The per-property API key travels in the
//! `X-Api-Key` header; pagination is driven by `page`/`page_size`
//! query parameters with a `has_more` flag in the body.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::{ChannelConfig, Property};
use crate::error::{ChannelError, ChannelResult};
use crate::normalize::{
    normalize_customer, normalize_extra, normalize_note, normalize_payment, normalize_reservation,
};
use crate::types::{RawCustomer, RawExtra, RawNote, RawPayment, RawReservation};

/// Read-only view of the channel manager consumed by the engines.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Reservations touching the given arrival-date range.
    async fn reservations_by_range(
        &self,
        property: &Property,
        since: NaiveDate,
        until: NaiveDate,
    ) -> ChannelResult<Vec<RawReservation>>;

    /// Reservations active today.
    async fn reservations_today(&self, property: &Property) -> ChannelResult<Vec<RawReservation>>;

    /// Customer identity by provider customer id.
    async fn customer(
        &self,
        property: &Property,
        customer_id: &str,
    ) -> ChannelResult<Option<RawCustomer>>;

    /// Payments attached to a reservation.
    async fn payments(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawPayment>>;

    /// Notes attached to a reservation.
    async fn notes(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawNote>>;

    /// Extra charges attached to a reservation.
    async fn extras(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawExtra>>;
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    has_more: bool,
}

/// reqwest-backed [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct HttpChannelSource {
    config: ChannelConfig,
    client: Client,
}

impl HttpChannelSource {
    /// Build the client with the configured timeouts.
    pub fn new(config: ChannelConfig) -> ChannelResult<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(config.read_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    async fn check(response: Response) -> ChannelResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ChannelError::Api {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        })
    }

    /// Page through a reservation listing endpoint.
    async fn fetch_reservation_pages(
        &self,
        property: &Property,
        path: &str,
        extra_query: &[(&str, String)],
    ) -> ChannelResult<Vec<RawReservation>> {
        let api_key = property.credential()?;
        let url = format!("{}{path}", self.config.base_url);
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let mut request = self
                .client
                .get(&url)
                .header("X-Api-Key", api_key)
                .query(&[
                    ("page", page.to_string()),
                    ("page_size", self.config.page_size.to_string()),
                ]);
            for (k, v) in extra_query {
                request = request.query(&[(*k, v.as_str())]);
            }
            let response = Self::check(request.send().await?).await?;
            let body: Page = response.json().await?;
            let fetched = body.items.len();
            out.extend(body.items.iter().filter_map(normalize_reservation));
            debug!(path, page, fetched, "Fetched reservation page");
            if !body.has_more || fetched == 0 {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    /// Fetch one sub-resource listing for a reservation.
    async fn fetch_items(
        &self,
        property: &Property,
        reservation_code: &str,
        sub_resource: &str,
    ) -> ChannelResult<Vec<Value>> {
        let api_key = property.credential()?;
        let url = format!(
            "{}/reservations/{reservation_code}/{sub_resource}",
            self.config.base_url
        );
        let response = self.client.get(&url).header("X-Api-Key", api_key).send().await?;
        let response = Self::check(response).await?;
        let body: Page = response.json().await?;
        Ok(body.items)
    }
}

#[async_trait]
impl ChannelSource for HttpChannelSource {
    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn reservations_by_range(
        &self,
        property: &Property,
        since: NaiveDate,
        until: NaiveDate,
    ) -> ChannelResult<Vec<RawReservation>> {
        self.fetch_reservation_pages(
            property,
            "/reservations",
            &[("from", since.to_string()), ("to", until.to_string())],
        )
        .await
    }

    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn reservations_today(&self, property: &Property) -> ChannelResult<Vec<RawReservation>> {
        self.fetch_reservation_pages(property, "/reservations/today", &[])
            .await
    }

    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn customer(
        &self,
        property: &Property,
        customer_id: &str,
    ) -> ChannelResult<Option<RawCustomer>> {
        let api_key = property.credential()?;
        let url = format!("{}/customers/{customer_id}", self.config.base_url);
        let response = self.client.get(&url).header("X-Api-Key", api_key).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(customer_id, "Customer not found upstream");
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let body: Value = response.json().await?;
        Ok(normalize_customer(&body))
    }

    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn payments(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawPayment>> {
        let items = self.fetch_items(property, reservation_code, "payments").await?;
        Ok(items.iter().filter_map(normalize_payment).collect())
    }

    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn notes(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawNote>> {
        let items = self.fetch_items(property, reservation_code, "notes").await?;
        Ok(items.iter().filter_map(normalize_note).collect())
    }

    #[instrument(skip(self, property), fields(property = %property.id))]
    async fn extras(
        &self,
        property: &Property,
        reservation_code: &str,
    ) -> ChannelResult<Vec<RawExtra>> {
        let items = self.fetch_items(property, reservation_code, "extras").await?;
        Ok(items.iter().filter_map(normalize_extra).collect())
    }
}
