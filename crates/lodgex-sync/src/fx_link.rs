//! FX linking engine.
//!
//! Walks a date range, loads the settlement-currency quote for each
//! date and attaches a quote snapshot to every reservation arriving
//! that day. A per-currency watermark makes successive runs resume
//! where the last one stopped; dates without a quote are reported as
//! gaps rather than failing the run.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Json;
use tracing::{info, instrument, warn};

use lodgex_core::{content_hash, diff_documents};
use lodgex_db::models::{ChangeType, FxLinkMeta, FxQuote, FxSnapshot, HistoryEntry, Reservation};
use lodgex_db::{DbError, DbPool, WriteSession};

use crate::config::SyncConfig;
use crate::error::SyncResult;

/// Options for a linking run.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Explicit date range; overrides the watermark.
    pub range: Option<(NaiveDate, NaiveDate)>,
    /// Replace snapshots already attached.
    pub force: bool,
    /// Plan but write nothing (the watermark does not advance).
    pub dry_run: bool,
    /// Restrict matching to one property.
    pub property_filter: Option<String>,
    /// Page size for per-date reservation matching.
    pub page_size: Option<i64>,
}

/// Outcome for one date in the range.
#[derive(Debug, Clone, Serialize)]
pub struct DateResult {
    /// The arrival date processed.
    pub date: NaiveDate,
    /// Whether a quote existed for this date.
    pub quote_found: bool,
    /// Reservations arriving on this date.
    pub matched: usize,
    /// Snapshots written.
    pub linked: usize,
    /// Reservations left untouched (already linked, no force).
    pub skipped: usize,
}

/// Counters for one linking run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkSummary {
    /// Currency the quotes were looked up for.
    pub currency: String,
    /// First date processed, when the range was non-empty.
    pub from: Option<NaiveDate>,
    /// Last date processed, when the range was non-empty.
    pub to: Option<NaiveDate>,
    /// Snapshots written across all dates.
    pub linked: usize,
    /// Reservations left untouched across all dates.
    pub skipped: usize,
    /// Dates in the range with no quote available.
    pub no_quote_dates: Vec<NaiveDate>,
    /// Per-date breakdown.
    pub dates: Vec<DateResult>,
}

/// Resolve the date range a run should cover.
///
/// An explicit range always wins. Otherwise the range starts the day
/// after the watermark (or `lookback_days` before the end when no
/// watermark exists) and ends at the latest quote date, capped at
/// today. Returns `None` when there is nothing left to link.
#[must_use]
pub fn resolve_range(
    explicit: Option<(NaiveDate, NaiveDate)>,
    watermark: Option<NaiveDate>,
    latest_quote: Option<NaiveDate>,
    today: NaiveDate,
    lookback_days: u64,
) -> Option<(NaiveDate, NaiveDate)> {
    if let Some((from, to)) = explicit {
        return (from <= to).then_some((from, to));
    }
    let end = latest_quote.unwrap_or(today).min(today);
    let start = match watermark {
        Some(linked) => linked.checked_add_days(Days::new(1))?,
        None => end.checked_sub_days(Days::new(lookback_days))?,
    };
    (start <= end).then_some((start, end))
}

/// Read side of a linking run, split from the engine so the date walk
/// and its counters can be driven from prepared data.
#[async_trait]
trait LinkStore: Send + Sync {
    async fn watermark(&self, currency: &str) -> SyncResult<Option<NaiveDate>>;
    async fn latest_quote_date(&self, currency: &str) -> SyncResult<Option<NaiveDate>>;
    async fn quote(&self, currency: &str, date: NaiveDate) -> SyncResult<Option<FxQuote>>;
    async fn arrivals(
        &self,
        date: NaiveDate,
        property_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<Reservation>>;
}

struct PgLinkStore<'a> {
    pool: &'a DbPool,
}

#[async_trait]
impl LinkStore for PgLinkStore<'_> {
    async fn watermark(&self, currency: &str) -> SyncResult<Option<NaiveDate>> {
        Ok(FxLinkMeta::find(self.pool, currency)
            .await?
            .and_then(|m| m.last_linked_date))
    }

    async fn latest_quote_date(&self, currency: &str) -> SyncResult<Option<NaiveDate>> {
        Ok(FxQuote::latest_date(self.pool, currency).await?)
    }

    async fn quote(&self, currency: &str, date: NaiveDate) -> SyncResult<Option<FxQuote>> {
        Ok(FxQuote::find(self.pool, currency, date).await?)
    }

    async fn arrivals(
        &self,
        date: NaiveDate,
        property_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<Reservation>> {
        Ok(Reservation::find_by_arrival(self.pool, date, property_filter, limit, offset).await?)
    }
}

/// Attaches arrival-date FX snapshots to reservations.
pub struct FxLinkEngine {
    pool: DbPool,
    config: SyncConfig,
}

impl FxLinkEngine {
    /// Create an engine over a pool.
    #[must_use]
    pub fn new(pool: DbPool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Run one linking pass.
    #[instrument(skip(self, options), fields(force = options.force, dry_run = options.dry_run))]
    pub async fn link(&self, options: &LinkOptions) -> SyncResult<LinkSummary> {
        self.link_with(&PgLinkStore { pool: &self.pool }, options)
            .await
    }

    async fn link_with(
        &self,
        store: &dyn LinkStore,
        options: &LinkOptions,
    ) -> SyncResult<LinkSummary> {
        let currency = self.config.settlement_currency.clone();
        let watermark = store.watermark(&currency).await?;
        let latest_quote = store.latest_quote_date(&currency).await?;
        let today = Utc::now().date_naive();

        let mut summary = LinkSummary {
            currency: currency.clone(),
            ..Default::default()
        };
        let Some((from, to)) = resolve_range(
            options.range,
            watermark,
            latest_quote,
            today,
            self.config.fx_lookback_days as u64,
        ) else {
            info!(currency, "FX linking already up to date");
            return Ok(summary);
        };
        summary.from = Some(from);
        summary.to = Some(to);

        let page_size = options.page_size.unwrap_or(self.config.fx_page_size);
        let mut session = WriteSession::new(self.pool.clone(), self.config.session);

        let mut date = from;
        while date <= to {
            let result = self
                .link_date(store, date, page_size, options, &mut session)
                .await?;
            summary.linked += result.linked;
            summary.skipped += result.skipped;
            if !result.quote_found {
                summary.no_quote_dates.push(date);
            }
            summary.dates.push(result);
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }
        session.commit().await?;

        if !options.dry_run {
            FxLinkMeta::advance(&self.pool, &currency, latest_quote, to).await?;
        }
        info!(
            currency,
            %from,
            %to,
            linked = summary.linked,
            skipped = summary.skipped,
            gaps = summary.no_quote_dates.len(),
            "FX linking run finished"
        );
        Ok(summary)
    }

    async fn link_date(
        &self,
        store: &dyn LinkStore,
        date: NaiveDate,
        page_size: i64,
        options: &LinkOptions,
        session: &mut WriteSession,
    ) -> SyncResult<DateResult> {
        let mut result = DateResult {
            date,
            quote_found: false,
            matched: 0,
            linked: 0,
            skipped: 0,
        };

        let Some(quote) = store
            .quote(&self.config.settlement_currency, date)
            .await?
        else {
            warn!(%date, "No FX quote for arrival date");
            return Ok(result);
        };
        result.quote_found = true;
        let snapshot = FxSnapshot::from(&quote);

        let mut offset = 0;
        loop {
            let page = store
                .arrivals(date, options.property_filter.as_deref(), page_size, offset)
                .await?;
            let fetched = page.len();
            result.matched += fetched;

            for stored in page {
                if stored.fx_on_checkin.is_some() && !options.force {
                    result.skipped += 1;
                    continue;
                }
                result.linked += 1;
                if options.dry_run {
                    continue;
                }
                self.write_snapshot(stored, &snapshot, session).await?;
            }

            if fetched < page_size as usize {
                break;
            }
            offset += page_size;
        }
        Ok(result)
    }

    async fn write_snapshot(
        &self,
        stored: Reservation,
        snapshot: &FxSnapshot,
        session: &mut WriteSession,
    ) -> SyncResult<()> {
        let key = stored.key();
        let before_value = stored.document_value();
        let prev_hash = stored
            .content_hash
            .clone()
            .unwrap_or_else(|| content_hash(&before_value));

        let mut doc = stored;
        doc.fx_on_checkin = Some(Json(snapshot.clone()));
        let after_value = doc.document_value();
        let new_hash = content_hash(&after_value);
        doc.content_hash = Some(new_hash.clone());

        let entry = HistoryEntry::record(
            &key,
            "fx_link",
            snapshot.date.to_string(),
            ChangeType::Updated,
            serde_json::to_value(diff_documents(&before_value, &after_value))
                .map_err(DbError::from)?,
            Some(prev_hash),
            Some(new_hash),
            after_value,
        );

        let conn = session.conn().await?;
        doc.upsert(&mut *conn).await?;
        entry.insert(&mut *conn).await?;
        session.note_writes(2).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_explicit_range_wins() {
        let range = resolve_range(
            Some((d(2024, 6, 1), d(2024, 6, 5))),
            Some(d(2024, 6, 20)),
            Some(d(2024, 6, 30)),
            d(2024, 7, 1),
            30,
        );
        assert_eq!(range, Some((d(2024, 6, 1), d(2024, 6, 5))));
        // Inverted explicit range means nothing to do.
        assert_eq!(
            resolve_range(Some((d(2024, 6, 5), d(2024, 6, 1))), None, None, d(2024, 7, 1), 30),
            None
        );
    }

    #[test]
    fn test_resumes_after_watermark() {
        let range = resolve_range(None, Some(d(2024, 6, 10)), Some(d(2024, 6, 15)), d(2024, 7, 1), 30);
        assert_eq!(range, Some((d(2024, 6, 11), d(2024, 6, 15))));
    }

    #[test]
    fn test_no_watermark_bounded_by_lookback() {
        let range = resolve_range(None, None, Some(d(2024, 6, 30)), d(2024, 7, 1), 30);
        assert_eq!(range, Some((d(2024, 5, 31), d(2024, 6, 30))));
    }

    #[test]
    fn test_end_capped_at_today() {
        // Quotes can exist for future dates; linking never runs ahead.
        let range = resolve_range(None, Some(d(2024, 6, 25)), Some(d(2024, 7, 10)), d(2024, 6, 28), 30);
        assert_eq!(range, Some((d(2024, 6, 26), d(2024, 6, 28))));
    }

    #[test]
    fn test_caught_up_yields_nothing() {
        assert_eq!(
            resolve_range(None, Some(d(2024, 6, 15)), Some(d(2024, 6, 15)), d(2024, 7, 1), 30),
            None
        );
    }

    #[test]
    fn test_no_quotes_falls_back_to_today() {
        let range = resolve_range(None, None, None, d(2024, 7, 1), 30);
        assert_eq!(range, Some((d(2024, 6, 1), d(2024, 7, 1))));
    }

    use std::collections::HashMap;

    use lodgex_db::models::ReservationKey;
    use rust_decimal_macros::dec;
    use sqlx::postgres::PgPoolOptions;

    #[derive(Default)]
    struct FixtureStore {
        quotes: HashMap<NaiveDate, FxQuote>,
        arrivals: HashMap<NaiveDate, Vec<Reservation>>,
    }

    #[async_trait]
    impl LinkStore for FixtureStore {
        async fn watermark(&self, _currency: &str) -> SyncResult<Option<NaiveDate>> {
            Ok(None)
        }

        async fn latest_quote_date(&self, _currency: &str) -> SyncResult<Option<NaiveDate>> {
            Ok(self.quotes.keys().max().copied())
        }

        async fn quote(&self, _currency: &str, date: NaiveDate) -> SyncResult<Option<FxQuote>> {
            Ok(self.quotes.get(&date).cloned())
        }

        async fn arrivals(
            &self,
            date: NaiveDate,
            _property_filter: Option<&str>,
            limit: i64,
            offset: i64,
        ) -> SyncResult<Vec<Reservation>> {
            let page = self
                .arrivals
                .get(&date)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok(page)
        }
    }

    fn lazy_pool() -> DbPool {
        // Never connected: dry-run walks plan only.
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    fn usd_quote(date: NaiveDate) -> FxQuote {
        FxQuote {
            currency: "USD".to_string(),
            quote_date: date,
            house: "central".to_string(),
            buy_rate: dec!(36.50),
            sell_rate: dec!(37.10),
            source: "daily-feed".to_string(),
            upserted_at: Utc::now(),
        }
    }

    fn arrival(n: u32, date: NaiveDate, already_linked: bool) -> Reservation {
        let key = ReservationKey {
            property_id: "villa-aurora".to_string(),
            external_reservation_id: format!("BK-{n}"),
            room_id: "ext-201".to_string(),
        };
        let mut doc = Reservation::new(&key);
        doc.arrival_date = Some(date);
        if already_linked {
            doc.fx_on_checkin = Some(Json(FxSnapshot::from(&usd_quote(date))));
        }
        doc
    }

    #[tokio::test]
    async fn test_quote_gap_is_recorded_without_failing_the_run() {
        let quote_date = d(2024, 6, 2);
        let mut store = FixtureStore::default();
        store.quotes.insert(quote_date, usd_quote(quote_date));
        store.arrivals.insert(
            quote_date,
            vec![
                arrival(1, quote_date, false),
                arrival(2, quote_date, true),
                arrival(3, quote_date, false),
            ],
        );

        let engine = FxLinkEngine::new(lazy_pool(), SyncConfig::default());
        let options = LinkOptions {
            range: Some((d(2024, 6, 1), quote_date)),
            dry_run: true,
            page_size: Some(2),
            ..Default::default()
        };
        let summary = engine.link_with(&store, &options).await.unwrap();

        assert_eq!(summary.no_quote_dates, vec![d(2024, 6, 1)]);
        assert_eq!(summary.dates.len(), 2);
        let gap = &summary.dates[0];
        assert!(!gap.quote_found);
        assert_eq!((gap.matched, gap.linked, gap.skipped), (0, 0, 0));

        let hit = &summary.dates[1];
        assert!(hit.quote_found);
        assert_eq!(hit.matched, 3);
        assert_eq!(hit.matched, hit.linked + hit.skipped);
        assert_eq!(hit.skipped, 1);
        assert_eq!(summary.linked, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_force_relinks_already_linked_reservations() {
        let quote_date = d(2024, 6, 2);
        let mut store = FixtureStore::default();
        store.quotes.insert(quote_date, usd_quote(quote_date));
        store
            .arrivals
            .insert(quote_date, vec![arrival(1, quote_date, true)]);

        let engine = FxLinkEngine::new(lazy_pool(), SyncConfig::default());
        let options = LinkOptions {
            range: Some((quote_date, quote_date)),
            force: true,
            dry_run: true,
            ..Default::default()
        };
        let summary = engine.link_with(&store, &options).await.unwrap();
        assert_eq!(summary.linked, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_empty_quote_table_walks_lookback_window() {
        // No quotes and no watermark: the run covers the lookback
        // window ending today and reports every date as a gap.
        let store = FixtureStore::default();
        let engine = FxLinkEngine::new(lazy_pool(), SyncConfig::default());
        let options = LinkOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = engine.link_with(&store, &options).await.unwrap();

        assert_eq!(summary.dates.len(), 31);
        assert_eq!(summary.no_quote_dates.len(), summary.dates.len());
        let (from, to) = (summary.from.unwrap(), summary.to.unwrap());
        assert_eq!(to - from, chrono::Duration::days(30));
        assert_eq!(summary.linked, 0);
        assert_eq!(summary.skipped, 0);
    }
}
