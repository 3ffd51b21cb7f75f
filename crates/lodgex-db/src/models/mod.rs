//! Persistent models for the lodgex reservation sync engine.

pub mod fx;
pub mod history;
pub mod ledger;
pub mod reservation;

pub use fx::{FxLinkMeta, FxQuote, FxSnapshot};
pub use history::{ChangeType, HistoryEntry};
pub use ledger::PaymentLedgerEntry;
pub use reservation::{
    EnrichmentState, EntrySource, PaymentStatus, Reservation, ReservationKey, ToPayBreakdown,
    UnifiedExtra, UnifiedNote, UnifiedPayment,
};
