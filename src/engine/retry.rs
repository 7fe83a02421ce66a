use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Runs one read-stage-commit attempt until it commits, fails on a business
/// rule, or exhausts the configured attempts on commit conflicts.
pub async fn with_retry<T, F>(
    state: &AppState,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Result<T, AppError>,
{
    let policy = state.policy;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match attempt() {
            Err(err) if err.is_retryable() => {
                state
                    .metrics
                    .transaction_conflicts_total
                    .with_label_values(&[operation])
                    .inc();

                if attempts >= policy.max_attempts {
                    warn!(operation, attempts, error = %err, "giving up after commit conflicts");
                    return Err(AppError::Contention {
                        operation,
                        attempts,
                    });
                }

                debug!(operation, attempts, error = %err, "commit conflict; retrying");
                sleep(policy.retry_backoff * attempts).await;
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::with_retry;
    use crate::config::DispatchPolicy;
    use crate::engine::selection::TieBreak;
    use crate::error::AppError;
    use crate::state::AppState;

    fn state(max_attempts: u32) -> AppState {
        let policy = DispatchPolicy {
            tie_break: TieBreak::RegistrationOrder,
            max_attempts,
            retry_backoff: Duration::from_millis(1),
        };
        AppState::new(policy, Decimal::new(5000, 2), Decimal::new(2000, 2), 16).0
    }

    #[tokio::test]
    async fn conflict_is_retried_until_commit() {
        let state = state(3);
        let mut calls = 0;

        let result = with_retry(&state, "test", || {
            calls += 1;
            if calls < 2 {
                Err(AppError::Conflict("moved".to_string()))
            } else {
                Ok(calls)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_contention() {
        let state = state(2);
        let mut calls = 0;

        let err = with_retry(&state, "test", || -> Result<(), AppError> {
            calls += 1;
            Err(AppError::Conflict("moved".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 2);
        assert!(matches!(err, AppError::Contention { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn business_errors_are_never_retried() {
        let state = state(5);
        let mut calls = 0;

        let err = with_retry(&state, "test", || -> Result<(), AppError> {
            calls += 1;
            Err(AppError::InvalidOperation("already picked up".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, AppError::InvalidOperation(_)));
    }
}
