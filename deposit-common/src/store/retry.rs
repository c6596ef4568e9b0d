//! Retry logic for transient database lock errors
//!
//! This sits below the optimistic-concurrency layer: it only absorbs
//! "database is locked" contention inside one backend. Version conflicts are
//! never retried here.

use std::future::Future;
use std::time::{Duration, Instant};

use super::{StoreError, StoreResult};

/// Retry a store operation with exponential backoff until `max_wait_ms` elapses.
///
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If "database is locked": back off and retry while time remains,
///    otherwise give up with a `Storage` error
/// 4. Any other error (including conflicts) is returned immediately
///
/// Backoff starts at 10ms, doubles per attempt, capped at 1000ms.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying store operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Store operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Store operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Store operation failed: max retry time exceeded"
                    );
                    return Err(StoreError::Storage(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

fn is_lock_error(err: &StoreError) -> bool {
    match err {
        #[cfg(feature = "sqlx")]
        StoreError::Database(db_err) => db_err.to_string().contains("database is locked"),
        StoreError::Storage(message) => message.contains("database is locked"),
        _ => false,
    }
}
