use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("courier {0} is not available for assignment")]
    CourierUnavailable(Uuid),

    #[error("order is already assigned to courier {0}")]
    AlreadyAssigned(Uuid),

    /// A record changed between read and commit. Retried by the engine.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{operation} did not commit after {attempts} attempts, try again")]
    Contention {
        operation: &'static str,
        attempts: u32,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}
