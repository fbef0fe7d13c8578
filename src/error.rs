//! User-facing error taxonomy.
//!
//! Internal plumbing uses `anyhow`; anything that can reach the UI or a tab is
//! expressed as a `TrackerError` so it maps onto a stable `ErrorCode`.

use serde::Serialize;

use crate::protocol::TabId;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("{0} is already tracked")]
    AlreadyTracked(String),

    #[error("{0} is not tracked")]
    NotTracked(String),

    #[error("access to {0} has not been granted")]
    PermissionDenied(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tab {0} is unreachable")]
    Unreachable(TabId),

    #[error("storage unavailable: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    AlreadyTracked,
    NotTracked,
    PermissionDenied,
    InvalidInput,
    Unreachable,
    StorageUnavailable,
}

impl TrackerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TrackerError::AlreadyTracked(_) => ErrorCode::AlreadyTracked,
            TrackerError::NotTracked(_) => ErrorCode::NotTracked,
            TrackerError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            TrackerError::InvalidInput(_) => ErrorCode::InvalidInput,
            TrackerError::Unreachable(_) => ErrorCode::Unreachable,
            TrackerError::Storage(_) => ErrorCode::StorageUnavailable,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TrackerError::InvalidInput(message.into())
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        TrackerError::Storage(err)
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
