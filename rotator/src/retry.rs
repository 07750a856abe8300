//! Exponential backoff with jitter around individual API calls.

use crate::error::is_retryable;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Upper bound on any single computed delay, so that a large attempt count
/// cannot overflow [`Duration`].
const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// How often, and how patiently, a failing call is repeated.
///
/// The delay before retry `n` (1-based) is
/// `initial_delay * backoff_factor^(n-1)` plus a random jitter in `[0, max_jitter)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    /// Exclusive upper bound on the random delay added to every backoff.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// The deterministic part of the delay that follows failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            MAX_DELAY
        }
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = self.max_jitter.as_secs_f64();
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max))
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or has
    /// been attempted [`Self::max_attempts`] times.
    ///
    /// When attempts run out, the last error is returned with `step` and the
    /// attempt count attached.
    pub async fn run<T, F, Fut>(&self, step: &str, call: F) -> eyre::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = eyre::Result<T>>,
    {
        self.run_with_sleep(step, call, tokio::time::sleep).await
    }

    pub(crate) async fn run_with_sleep<T, F, Fut, S, SFut>(
        &self,
        step: &str,
        mut call: F,
        mut sleep: S,
    ) -> eyre::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = eyre::Result<T>>,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(step, attempt, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !is_retryable(&error) {
                tracing::error!(step, attempt, error = %error, "failure is not retryable");
                return Err(error);
            }
            if attempt >= max_attempts {
                tracing::error!(step, attempt, error = %error, "giving up");
                return Err(error.wrap_err(format!("{step} failed after {attempt} attempts")));
            }

            let delay = self.base_delay(attempt) + self.jitter();
            tracing::warn!(
                step,
                attempt,
                delay = ?delay,
                error = %error,
                "call failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
