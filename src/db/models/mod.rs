pub mod ledger;
pub mod policy;
pub mod rules;

pub use ledger::{ActiveSession, DailyTime, DailyTotal, LedgerSlice};
pub use policy::validation;
pub use policy::{BandColors, BlockingSettings, OverlayConfig, ResetTime};
pub use rules::{AiCache, AiCacheEntry, AiSettings, RuleSnapshot, UserRules};
