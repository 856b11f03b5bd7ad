//! Attempt-loop with bounded attempts, result-sensitive re-entry, and
//! exception classification.

use crate::config::CoreConfig;
use crate::error::OperationResult;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Whether a thrown error should restart the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    Terminal,
}

/// Default classification: transient browser/network faults are retryable,
/// anything else is terminal. Grounded on
/// `TrueLayer-reqwest-middleware`'s `Retryable::{Transient, Fatal}` split.
pub fn default_is_retryable_exception(err: &anyhow::Error) -> RetryDecision {
    let msg = err.to_string().to_lowercase();
    let transient_markers = [
        "transport",
        "navigation failed",
        "timed out",
        "timeout",
        "connection",
        "stale element",
        "no such element",
    ];
    if transient_markers.iter().any(|m| msg.contains(m)) {
        RetryDecision::Retryable
    } else {
        RetryDecision::Terminal
    }
}

/// `min(base * 2^attempt, max)` plus up to 25% jitter. Grounded on the
/// `clawft` retry reference file's `compute_delay`.
fn backoff_delay(cfg: &CoreConfig, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt);
    let base_ms = cfg.retry_base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp as u64);
    let capped_ms = raw_ms.min(cfg.retry_max_delay.as_millis() as u64);

    let jitter_max_ms = capped_ms / 4;
    let jitter_ms = if jitter_max_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_max_ms)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

/// Runs `op` up to `max_attempts` times.
///
/// - Terminal `OperationResult` tags (`Success`/`Failure`/`PendingQR`/
///   `PendingNET`) stop the loop immediately.
/// - `Waiting` re-enters the loop unless `should_retry` says otherwise; if
///   attempts are exhausted while only ever seeing `Waiting`, the last
///   `Waiting` result is returned unchanged - never upgraded to `Failure`.
/// - An `Err` from `op` is classified by `is_retryable_exception`: retryable
///   errors restart the loop (consuming an attempt and a backoff delay),
///   terminal errors are wrapped as `Failure(message)` immediately.
/// - `cancellation` is checked before every attempt and interrupts the
///   backoff sleep; either way a cancelled token short-circuits to
///   `Waiting("cancelled")` rather than running `op` again.
pub async fn execute_with_retry<T, Fut>(
    cfg: &CoreConfig,
    max_attempts: u32,
    mut op: impl FnMut(u32) -> Fut,
    should_retry: impl Fn(&OperationResult<T>) -> bool,
    is_retryable_exception: impl Fn(&anyhow::Error) -> RetryDecision,
    cancellation: &CancellationToken,
) -> OperationResult<T>
where
    Fut: Future<Output = anyhow::Result<OperationResult<T>>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_waiting: Option<OperationResult<T>> = None;

    for attempt in 0..max_attempts {
        if cancellation.is_cancelled() {
            return OperationResult::Waiting("cancelled".to_string());
        }

        match op(attempt).await {
            Ok(result) => {
                if result.is_terminal() {
                    return result;
                }
                // Waiting: keep looping unless the caller overrides.
                if !should_retry(&result) {
                    return result;
                }
                last_waiting = Some(result);
            }
            Err(err) => match is_retryable_exception(&err) {
                RetryDecision::Terminal => return OperationResult::Failure(err.to_string()),
                RetryDecision::Retryable => {
                    log::warn!("retryable error on attempt {}: {}", attempt + 1, err);
                }
            },
        }

        if attempt + 1 < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(backoff_delay(cfg, attempt)) => {}
                _ = cancellation.cancelled() => return OperationResult::Waiting("cancelled".to_string()),
            }
        }
    }

    last_waiting.unwrap_or_else(|| OperationResult::Waiting("no attempts produced a result".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_immediately_on_success() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            5,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(OperationResult::Success(true, "ok".to_string())) }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::Success(true, "ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiting_twice_then_success_invokes_op_three_times() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            5,
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(OperationResult::Waiting("not yet".to_string()))
                    } else {
                        Ok(OperationResult::Success(true, "done".to_string()))
                    }
                }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::Success(true, "done".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_waiting_never_upgrades_to_failure() {
        let cfg = CoreConfig::default();
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            3,
            |_attempt| async { Ok(OperationResult::Waiting("still waiting".to_string())) },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::Waiting("still waiting".to_string()));
    }

    #[tokio::test]
    async fn terminal_states_stop_immediately() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            5,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(OperationResult::PendingQR("auth required".to_string())) }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::PendingQR("auth required".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_exception_becomes_failure_without_exhausting_attempts() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            5,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("profile corrupt")) }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::Failure("profile corrupt".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_exception_keeps_retrying() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            3,
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow::anyhow!("stale element reference"))
                    } else {
                        Ok(OperationResult::Success(true, "ok".to_string()))
                    }
                }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, OperationResult::Success(true, "ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_without_calling_op() {
        let cfg = CoreConfig::default();
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        token.cancel();

        let result: OperationResult<bool> = execute_with_retry(
            &cfg,
            5,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(OperationResult::Success(true, "ok".to_string())) }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            &token,
        )
        .await;

        assert_eq!(result, OperationResult::Waiting("cancelled".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
