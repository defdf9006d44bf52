//! Fixed-schedule retry for hosted embedding calls

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::EmbeddingError;

const DEFAULT_SCHEDULE_SECS: [u64; 3] = [1, 3, 5];
const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Delays between attempts. Not exponential: the wait after the n-th failed
/// attempt is `delays[n - 1]`, and waits beyond the schedule reuse its last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  delays: Vec<Duration>,
  max_attempts: usize,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::fixed(DEFAULT_MAX_ATTEMPTS)
  }
}

impl RetryPolicy {
  /// The 1s/3s/5s schedule with at most `max_attempts` calls in total
  pub fn fixed(max_attempts: usize) -> Self {
    let delays = DEFAULT_SCHEDULE_SECS.iter().map(|s| Duration::from_secs(*s)).collect();
    Self::with_delays(delays, max_attempts)
  }

  /// A zero budget still makes one call
  pub fn with_delays(delays: Vec<Duration>, max_attempts: usize) -> Self {
    Self { delays, max_attempts: max_attempts.max(1) }
  }

  /// Exactly one call, for backends that have nothing transient to wait out
  pub fn none() -> Self {
    Self::with_delays(Vec::new(), 1)
  }

  pub fn max_attempts(&self) -> usize {
    self.max_attempts
  }

  /// Wait after failed attempt number `attempt` (1-based)
  pub fn delay_after_attempt(&self, attempt: usize) -> Duration {
    let index = attempt.saturating_sub(1);
    self.delays.get(index).or(self.delays.last()).copied().unwrap_or(Duration::ZERO)
  }

  /// Run `operation`, retrying transient failures on the fixed schedule
  pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, EmbeddingError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbeddingError>>,
  {
    let mut attempt = 1;
    loop {
      match operation().await {
        Ok(value) => {
          if attempt > 1 {
            tracing::info!(attempt, "Embedding succeeded after retry");
          }
          return Ok(value);
        }
        Err(error) if !error.is_transient() => return Err(error),
        Err(error) if attempt >= self.max_attempts => {
          tracing::error!(attempts = attempt, %error, "All embedding attempts failed");
          return Err(EmbeddingError::RetriesExhausted {
            attempts: attempt,
            last: error.to_string(),
          });
        }
        Err(error) => {
          let delay = self.delay_after_attempt(attempt);
          tracing::warn!(
            attempt,
            delay_secs = delay.as_secs_f32(),
            %error,
            "Embedding attempt failed, retrying"
          );
          sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}
