//! Backoff policies.

use std::time::Duration;

use reqwest::Method;

/// Transport-level retries for transient server errors.
///
/// The delay before retry `n` (1-based) is
/// `backoff_factor * 2^(n-1) + U(0, backoff_jitter)` seconds, capped at
/// `backoff_max`. 429 is never retried here, see [`RateLimitPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub max_retries: u32,
  /// Seconds.
  pub backoff_factor: f64,
  /// Seconds.
  pub backoff_jitter: f64,
  pub backoff_max: Duration,
  pub status_forcelist: Vec<u16>,
  pub allowed_methods: Vec<Method>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 10,
      backoff_factor: 1.0,
      backoff_jitter: 0.1,
      backoff_max: Duration::from_secs(60),
      status_forcelist: vec![500, 502, 503, 504, 507, 509],
      allowed_methods: vec![Method::GET, Method::POST, Method::PUT, Method::DELETE],
    }
  }
}

impl RetryPolicy {
  /// No retries at all.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Default::default()
    }
  }

  /// Whether `method` may be retried.
  pub fn allows(&self, method: &Method) -> bool {
    self.allowed_methods.contains(method)
  }

  /// Whether a response with `status` to `method` should be retried.
  pub fn should_retry_status(&self, method: &Method, status: u16) -> bool {
    status != 429 && self.allows(method) && self.status_forcelist.contains(&status)
  }

  /// Delay before retry number `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    self.backoff_with_jitter(attempt, rand::random::<f64>())
  }

  /// Delay before retry `attempt`, with `unit` in `[0, 1)` scaling the jitter.
  pub fn backoff_with_jitter(&self, attempt: u32, unit: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let base = self.backoff_factor * 2f64.powi(exponent);
    let seconds = base + self.backoff_jitter * unit.clamp(0.0, 1.0);
    cap(seconds, self.backoff_max)
  }
}

/// Backoff for HTTP 429 ("too many requests").
///
/// Uses the server's `Retry-After` when present, otherwise
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
  pub max_retries: u32,
  pub initial_delay: Duration,
  pub multiplier: f64,
  pub max_delay: Duration,
}

impl Default for RateLimitPolicy {
  fn default() -> Self {
    Self {
      max_retries: 8,
      initial_delay: Duration::from_secs(1),
      multiplier: 2.0,
      max_delay: Duration::from_secs(60),
    }
  }
}

impl RateLimitPolicy {
  /// Delay before rate-limit retry number `attempt` (1-based).
  pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
      return retry_after.min(self.max_delay);
    }
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let seconds = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
    cap(seconds, self.max_delay)
  }
}

fn cap(seconds: f64, max: Duration) -> Duration {
  if !seconds.is_finite() || seconds >= max.as_secs_f64() {
    return max;
  }
  Duration::from_secs_f64(seconds.max(0.0))
}
