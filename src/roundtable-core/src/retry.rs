//! Bounded exponential-backoff retry for AI generation calls.
//!
//! Intermediate failures are logged and swallowed. Only the aggregated
//! [`GenerationExhausted`] failure reaches the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Logical type of the work being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Thoughts,
    Speech,
    Score,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Thoughts => "thoughts",
            OperationKind::Speech => "speech",
            OperationKind::Score => "score",
        };
        f.write_str(name)
    }
}

/// Retry configuration, passed into every [`execute`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// Delay inserted after the failed attempt `attempt` (1-indexed):
    /// `min(base_delay * backoff_factor^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled_ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        if !scaled_ms.is_finite() || scaled_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(scaled_ms.max(0.0).round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Duration::from_millis(10_000), 2.0)
    }
}

/// Aggregated failure raised once every attempt has failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} generation failed for participant '{participant_id}' after {attempts} attempts: {message}")]
pub struct GenerationExhausted {
    pub kind: OperationKind,
    pub participant_id: String,
    pub attempts: u32,
    /// Message of the last underlying error.
    pub message: String,
}

/// Callback invoked exactly once when an operation is exhausted.
pub type ErrorCallback = Box<dyn Fn(&GenerationExhausted) + Send + Sync>;

/// Identifies what is being retried, for logging and the aggregated error.
pub struct RetryContext {
    pub kind: OperationKind,
    pub participant_id: String,
    on_error: Option<ErrorCallback>,
}

impl RetryContext {
    pub fn new(kind: OperationKind, participant_id: impl Into<String>) -> Self {
        Self {
            kind,
            participant_id: participant_id.into(),
            on_error: None,
        }
    }

    pub fn with_on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }
}

impl fmt::Debug for RetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryContext")
            .field("kind", &self.kind)
            .field("participant_id", &self.participant_id)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    context: &RetryContext,
    mut operation: F,
) -> Result<T, GenerationExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        debug!(
            kind = %context.kind,
            participant_id = %context.participant_id,
            attempt,
            "Starting generation attempt"
        );

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                if attempt == max_attempts {
                    warn!(
                        kind = %context.kind,
                        participant_id = %context.participant_id,
                        attempt,
                        error = %last_error,
                        "Generation attempt failed, no attempts left"
                    );
                    break;
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    kind = %context.kind,
                    participant_id = %context.participant_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Generation attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    let failure = GenerationExhausted {
        kind: context.kind,
        participant_id: context.participant_id.clone(),
        attempts: max_attempts,
        message: last_error,
    };
    if let Some(ref callback) = context.on_error {
        callback(&failure);
    }
    Err(failure)
}
