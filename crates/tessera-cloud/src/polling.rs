//! Exponential-backoff polling.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::CloudError;

/// How to poll a run until it reaches a terminal status.
///
/// The delay between attempts starts at `delay`, is multiplied by `backoff`
/// after every attempt and is capped at `max_delay` when sleeping. Polling
/// fails with [`CloudError::PollingTimeout`] as soon as the uncapped delay
/// exceeds `max_duration`, and with [`CloudError::PollingExhausted`] after
/// `max_tries` attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
  pub backoff: f64,
  pub delay: Duration,
  /// Slept once before the first attempt.
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub max_duration: Duration,
  pub max_tries: u32,
}

impl Default for PollingOptions {
  fn default() -> Self {
    Self {
      backoff: 1.0,
      delay: Duration::from_secs(1),
      initial_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(20),
      max_duration: Duration::from_secs(300),
      max_tries: 100,
    }
  }
}

impl PollingOptions {
  pub fn validate(&self) -> Result<(), CloudError> {
    if self.max_tries == 0 {
      return Err(CloudError::InvalidPollingOptions(
        "max_tries must be at least 1".to_string(),
      ));
    }
    if !self.backoff.is_finite() || self.backoff <= 0.0 {
      return Err(CloudError::InvalidPollingOptions(format!(
        "backoff must be a positive number, got {}",
        self.backoff
      )));
    }
    if self.max_delay < self.delay {
      return Err(CloudError::InvalidPollingOptions(format!(
        "max_delay ({:?}) is shorter than delay ({:?})",
        self.max_delay, self.delay
      )));
    }
    Ok(())
  }
}

/// Call `check` until it yields a value, sleeping between attempts as
/// `options` describes. `run_id` only labels errors and logs.
pub async fn poll<T, F, Fut>(
  options: &PollingOptions,
  run_id: &str,
  mut check: F,
) -> Result<T, CloudError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<Option<T>, CloudError>>,
{
  options.validate()?;
  tokio::time::sleep(options.initial_delay).await;

  let max_duration = options.max_duration.as_secs_f64();
  let max_delay = options.max_delay.as_secs_f64();
  let mut delay = options.delay.as_secs_f64();

  for attempt in 1..=options.max_tries {
    if let Some(value) = check().await? {
      debug!(run_id, attempt, "polling finished");
      return Ok(value);
    }

    if delay > max_duration {
      return Err(CloudError::PollingTimeout {
        run_id: run_id.to_string(),
        tries: attempt,
        max_duration: options.max_duration,
      });
    }

    if attempt < options.max_tries {
      let sleep = delay.min(max_delay);
      debug!(run_id, attempt, sleep_secs = sleep, "run not finished, waiting");
      tokio::time::sleep(Duration::from_secs_f64(sleep)).await;
    }
    delay *= options.backoff;
  }

  Err(CloudError::PollingExhausted {
    run_id: run_id.to_string(),
    max_tries: options.max_tries,
  })
}
