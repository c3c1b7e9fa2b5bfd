use std::time::Duration;

use tokio::time::Instant;

use crate::assistant::Assistant;
use crate::error::{ActivityError, AssistantError};

/// Exponential backoff applied by the engine between activity attempts.
/// Defaults: 1s initial interval, doubling, capped at 100x the initial
/// interval, unlimited attempts (the activity budget bounds them instead).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// 0 means unlimited.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exp);
        if !secs.is_finite() || secs >= self.maximum_interval.as_secs_f64() {
            return self.maximum_interval;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.maximum_attempts != 0 && attempts >= self.maximum_attempts
    }
}

/// Run `acknowledge` until it succeeds, fails permanently, or the budget runs out.
pub(crate) async fn run_activity(
    assistant: &dyn Assistant,
    options: &super::ActivityOptions,
    input: &str,
) -> Result<String, ActivityError> {
    let budget = options.budget();
    let deadline = Instant::now() + budget;
    let policy = &options.retry_policy;
    let mut attempts = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ActivityError::Timeout { budget, attempts });
        }
        attempts += 1;

        let attempt_timeout = options.start_to_close_timeout.min(remaining);
        let error = match tokio::time::timeout(attempt_timeout, assistant.acknowledge(input)).await
        {
            Ok(Ok(reply)) if !reply.is_empty() => return Ok(reply),
            Ok(Ok(_)) => AssistantError::EmptyReply {
                provider: assistant.provider().to_string(),
            },
            Ok(Err(e)) => e,
            Err(_) => {
                tracing::warn!(
                    provider = assistant.provider(),
                    attempt = attempts,
                    "activity attempt timed out after {}ms",
                    attempt_timeout.as_millis()
                );
                if Instant::now() >= deadline || policy.exhausted(attempts) {
                    return Err(ActivityError::Timeout { budget, attempts });
                }
                tokio::time::sleep(policy.backoff(attempts).min(
                    deadline.saturating_duration_since(Instant::now()),
                ))
                .await;
                continue;
            }
        };

        if !error.is_retryable() || policy.exhausted(attempts) {
            return Err(ActivityError::Failed {
                source: error,
                attempts,
            });
        }

        let delay = policy.backoff(attempts);
        if Instant::now() + delay >= deadline {
            return Err(ActivityError::Failed {
                source: error,
                attempts,
            });
        }

        tracing::warn!(
            provider = assistant.provider(),
            attempt = attempts,
            "activity attempt failed, retrying in {}ms: {error}",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}
