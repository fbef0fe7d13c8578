pub mod hosts;
pub mod sync;

pub use sync::{is_granted, SiteSync, SyncReport};
