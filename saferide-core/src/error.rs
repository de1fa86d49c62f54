use thiserror::Error;

use crate::types::AlertStatus;

/// Domain errors surfaced to callers of the lifecycle operations.
/// Per-contact delivery failures never show up here; those are swallowed
/// into `DeliveryRecord`s.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("operation not allowed while alert is {0}")]
    InvalidState(AlertStatus),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type AlertResult<T> = Result<T, AlertError>;
