//! Bounded readiness polling
//!
//! Polls a condition at the interval given by a [`RetryPolicy`] until it holds
//! or the attempt ceiling is reached. The ceiling guarantees termination with a
//! diagnosable result instead of an indefinite hang.

use crate::collaborators::CollaboratorError;
use crate::core::RetryPolicy;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The condition never held within the attempt ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollExhausted {
    /// Number of attempts made
    pub attempts: u32,

    /// Last probe error, if the final misses were errors rather than "not yet"
    pub last_error: Option<CollaboratorError>,
}

/// Poll `probe` until it returns `Ok(true)`
///
/// Probe errors count as a miss and are retried. Returns the 1-based attempt
/// on which the condition held.
pub async fn poll_until<F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    probe: F,
) -> Result<u32, PollExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CollaboratorError>>,
{
    poll(policy, operation, None, probe).await
}

/// Like [`poll_until`], but gives up once the next attempt could not start
/// before `deadline`
pub async fn poll_until_deadline<F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    deadline: Instant,
    probe: F,
) -> Result<u32, PollExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CollaboratorError>>,
{
    poll(policy, operation, Some(deadline), probe).await
}

async fn poll<F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    deadline: Option<Instant>,
    mut probe: F,
) -> Result<u32, PollExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CollaboratorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        match probe().await {
            Ok(true) => {
                debug!(operation = %operation, attempt, "Condition met");
                return Ok(attempt);
            }
            Ok(false) => {
                debug!(operation = %operation, attempt, max_attempts, "Condition not met yet");
                last_error = None;
            }
            Err(e) => {
                warn!(operation = %operation, attempt, max_attempts, error = %e, "Readiness probe failed");
                last_error = Some(e);
            }
        }

        if attempt == max_attempts {
            break;
        }

        let delay = policy.delay_after(attempt);
        if let Some(deadline) = deadline {
            if deadline.saturating_duration_since(Instant::now()) <= delay {
                debug!(operation = %operation, attempt, "Deadline reached before next attempt");
                break;
            }
        }
        tokio::time::sleep(delay).await;
    }

    warn!(operation = %operation, attempts, "Readiness attempts exhausted");
    Err(PollExhausted {
        attempts,
        last_error,
    })
}
