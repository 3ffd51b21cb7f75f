//! Engine configuration.
//!
//! Passed in explicitly at construction; the engines never read the
//! process environment.

use lodgex_db::WriteSessionConfig;

/// Shared configuration for the sync engines.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Currency the payable total and breakdown are expressed in.
    pub settlement_currency: String,
    /// Write-batch tuning.
    pub session: WriteSessionConfig,
    /// Days to look back when FX linking has no watermark.
    pub fx_lookback_days: i64,
    /// Page size for per-date reservation matching in FX linking.
    pub fx_page_size: i64,
    /// Default selection limit for enrichment batches.
    pub enrich_limit: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settlement_currency: "USD".to_string(),
            session: WriteSessionConfig::default(),
            fx_lookback_days: 30,
            fx_page_size: 30,
            enrich_limit: 50,
        }
    }
}
