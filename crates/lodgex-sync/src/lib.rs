//! Reservation synchronization and settlement engines for lodgex.
//!
//! The engines in this crate turn channel-manager data into reservation
//! documents and keep them settled: the upsert engine imports raw
//! reservations per room, the enrichment merger folds in supplementary
//! data, the mutation handler applies host actions, the FX linking
//! engine annotates arrivals with exchange-rate snapshots, and the
//! orchestrator runs the whole sequence under a lease lock. Pricing
//! always flows through the financial calculator and list merging
//! through the reconcile engine, so every writer honors the same
//! preservation and dedupe rules.

pub mod calculator;
pub mod config;
pub mod enrich;
pub mod error;
pub mod fx_link;
pub mod merge;
pub mod mutation;
pub mod orchestrator;
pub mod upsert;

pub use calculator::{payment_status, preserve, recompute, BreakdownTotals};
pub use config::SyncConfig;
pub use enrich::{EnrichOptions, EnrichSelection, EnrichSummary, EnrichmentMerger};
pub use error::{SyncError, SyncResult};
pub use fx_link::{FxLinkEngine, LinkOptions, LinkSummary};
pub use merge::{reconcile, UnifiedEntry};
pub use mutation::{Actor, HostAction, MutationHandler, MutationOutcome};
pub use orchestrator::{
    EnrichStep, FxLinkStep, ImportByArrivalStep, LockProvider, Orchestrator, RunOptions,
    RunReport, StepResult, StepStatus, SyncStep, SyncTodayStep,
};
pub use upsert::{
    ImportJob, ImportReport, PropertyImportOutcome, UpsertEngine, UpsertOptions, UpsertSummary,
};
