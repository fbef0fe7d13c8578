//! Session tracking: the coordinator that owns the ledger and the alarm that
//! rolls it over each day.

pub mod coordinator;
pub mod reset;

pub use coordinator::{LedgerSnapshot, PageVerdict, SessionCoordinator};
pub use reset::{logical_day, DailyResetAlarm};
