//! FX quote and linking-watermark models.
//!
//! Quotes are written by a separate rate-ingestion job; this crate only
//! reads them. The watermark tracks how far the linking engine has
//! progressed per currency.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

use crate::error::DbError;

/// One day's FX quote for a currency.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FxQuote {
    /// Currency code.
    pub currency: String,
    /// Quote date.
    pub quote_date: NaiveDate,
    /// Exchange-house label.
    pub house: String,
    /// Buy rate.
    pub buy_rate: Decimal,
    /// Sell rate.
    pub sell_rate: Decimal,
    /// Where the quote came from.
    pub source: String,
    /// When the ingestion job last wrote it.
    pub upserted_at: DateTime<Utc>,
}

impl FxQuote {
    /// Load the quote for a currency and date.
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>(
            "SELECT * FROM fx_quotes WHERE currency = $1 AND quote_date = $2",
        )
        .bind(currency)
        .bind(date)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// The latest quote date available for a currency.
    ///
    /// The aggregate always produces one row; with no quotes stored its
    /// value is NULL, so the column must decode as an option.
    pub async fn latest_date<'e, E: PgExecutor<'e>>(
        executor: E,
        currency: &str,
    ) -> Result<Option<NaiveDate>, DbError> {
        let (date,): (Option<NaiveDate>,) =
            sqlx::query_as("SELECT max(quote_date) FROM fx_quotes WHERE currency = $1")
                .bind(currency)
                .fetch_one(executor)
                .await?;
        Ok(date)
    }
}

/// Snapshot of a quote attached to a reservation at check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxSnapshot {
    /// Exchange-house label.
    pub house: String,
    /// Quote date (the arrival date).
    pub date: NaiveDate,
    /// Buy rate on that date.
    pub buy: Decimal,
    /// Sell rate on that date.
    pub sell: Decimal,
    /// Quote source.
    pub source: String,
}

impl From<&FxQuote> for FxSnapshot {
    fn from(quote: &FxQuote) -> Self {
        Self {
            house: quote.house.clone(),
            date: quote.quote_date,
            buy: quote.buy_rate,
            sell: quote.sell_rate,
            source: quote.source.clone(),
        }
    }
}

/// Linking watermark, one row per currency.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FxLinkMeta {
    /// Currency code.
    pub currency: String,
    /// Latest quote date seen by the linking engine.
    pub last_quote_date: Option<NaiveDate>,
    /// Last arrival date fully linked.
    pub last_linked_date: Option<NaiveDate>,
}

impl FxLinkMeta {
    /// Load the watermark for a currency.
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        currency: &str,
    ) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM fx_link_meta WHERE currency = $1")
            .bind(currency)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Advance the watermark.
    pub async fn advance<'e, E: PgExecutor<'e>>(
        executor: E,
        currency: &str,
        last_quote_date: Option<NaiveDate>,
        last_linked_date: NaiveDate,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"
            INSERT INTO fx_link_meta (currency, last_quote_date, last_linked_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (currency) DO UPDATE SET
                last_quote_date = COALESCE(EXCLUDED.last_quote_date, fx_link_meta.last_quote_date),
                last_linked_date = EXCLUDED.last_linked_date
            ",
        )
        .bind(currency)
        .bind(last_quote_date)
        .bind(last_linked_date)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_from_quote() {
        let quote = FxQuote {
            currency: "USD".to_string(),
            quote_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            house: "central".to_string(),
            buy_rate: dec!(36.50),
            sell_rate: dec!(37.10),
            source: "daily-feed".to_string(),
            upserted_at: Utc::now(),
        };
        let snapshot = FxSnapshot::from(&quote);
        assert_eq!(snapshot.date, quote.quote_date);
        assert_eq!(snapshot.buy, dec!(36.50));
        assert_eq!(snapshot.sell, dec!(37.10));
        assert_eq!(snapshot.house, "central");
    }
}
