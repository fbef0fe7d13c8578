//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Modules with chatty diagnostics (the coordinator loop, the site sync, the
//! host dispatcher) define the flag once and use these instead of calling
//! `log::*!` directly, so a single const silences a noisy module.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("coordinator started");
//! ```

/// `log::info!` when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// `log::warn!` when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// `log::error!` when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// `log::debug!` when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
