use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{DispatchRequest, StageClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Pause after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dispatch failed after {attempts} attempt(s): {last_error}")]
pub struct DispatchFailure {
    pub attempts: u32,
    pub last_error: String,
}

/// Wraps a [`StageClient`] with bounded retries and exponential backoff.
/// Exhaustion is reported as a value, never as a panic or a dropped request.
#[derive(Clone)]
pub struct RetrySender {
    client: Arc<dyn StageClient>,
    policy: RetryPolicy,
}

impl RetrySender {
    pub fn new(client: Arc<dyn StageClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn send(&self, request: &DispatchRequest) -> Result<Accepted, DispatchFailure> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.client.dispatch(request).await {
                Ok(()) => return Ok(Accepted { attempts: attempt }),
                Err(e) => e,
            };

            tracing::warn!(
                job_id = %request.job_id,
                stage = %request.stage,
                attempt,
                max_attempts = self.policy.max_attempts,
                error = %error,
                "Dispatch attempt failed"
            );

            if attempt >= self.policy.max_attempts || !error.is_retryable() {
                return Err(DispatchFailure {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            tokio::time::sleep(self.policy.delay_after(attempt)).await;
        }
    }
}
