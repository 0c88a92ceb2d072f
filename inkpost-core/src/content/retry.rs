use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::GenerationSection;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    jitter_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, jitter_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter_ms,
        }
    }

    pub fn from_section(section: &GenerationSection) -> Self {
        Self::new(
            section.max_attempts,
            Duration::from_millis(section.backoff_ms),
            section.jitter_ms,
        )
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Exponential: base, 2×base, 4×base, …
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16) as u32;
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds, `retryable` rejects its error, or
    /// the attempt bound is hit. The last error is returned.
    pub async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    })
                }
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(error);
                    }
                    let mut delay = self.delay_for_attempt(attempt);
                    if self.jitter_ms > 0 {
                        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
                        delay += Duration::from_millis(jitter);
                    }
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying after failure");
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}
