use std::time::Duration;

use tessera_client::ClientError;
use thiserror::Error;

/// Errors raised by the runs API.
#[derive(Debug, Error)]
pub enum CloudError {
  /// Transport failure, including non-2xx responses.
  #[error(transparent)]
  Client(#[from] ClientError),

  /// The polling delay grew past `max_duration` before the run finished.
  #[error(
    "timed out polling run {run_id} after {tries} tries: delay exceeded the maximum duration of {max_duration:?}"
  )]
  PollingTimeout {
    run_id: String,
    tries: u32,
    max_duration: Duration,
  },

  /// `max_tries` metadata fetches never saw a terminal status.
  #[error("run {run_id} did not reach a terminal status after {max_tries} tries")]
  PollingExhausted { run_id: String, max_tries: u32 },

  /// Some runs were still in flight when the wait timeout elapsed.
  #[error("timed out after {timeout:?} waiting for runs: {}", .pending.join(", "))]
  WaitTimeout {
    pending: Vec<String>,
    timeout: Duration,
  },

  #[error("invalid polling options: {0}")]
  InvalidPollingOptions(String),

  #[error("unexpected response from {endpoint}: {message}")]
  InvalidResponse { endpoint: String, message: String },
}

impl CloudError {
  /// Whether this is the wall-clock polling ceiling.
  pub fn is_polling_timeout(&self) -> bool {
    matches!(self, Self::PollingTimeout { .. })
  }

  /// Whether this is the try-count polling ceiling.
  pub fn is_polling_exhausted(&self) -> bool {
    matches!(self, Self::PollingExhausted { .. })
  }
}
