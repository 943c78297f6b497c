//! Waiting on several runs at once.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::application::Application;
use crate::error::CloudError;
use crate::run::RunResult;

/// Backoff for [`Application::wait_for_runs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
  /// Wall-clock limit. `None` waits forever.
  pub timeout: Option<Duration>,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
}

impl Default for WaitOptions {
  fn default() -> Self {
    Self {
      timeout: None,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(30),
    }
  }
}

impl WaitOptions {
  pub fn with_timeout(timeout: Duration) -> Self {
    Self {
      timeout: Some(timeout),
      ..Default::default()
    }
  }
}

impl Application {
  /// Wait until every run in `run_ids` has a terminal status, then return
  /// their results in the same order.
  ///
  /// Runs are checked in rounds; the pause between rounds doubles from
  /// `initial_backoff` up to `max_backoff`. Failed runs are returned like any
  /// other; callers inspect the status.
  pub async fn wait_for_runs(
    &self,
    run_ids: &[String],
    options: &WaitOptions,
  ) -> Result<Vec<RunResult>, CloudError> {
    let start = Instant::now();
    let mut pending: Vec<&str> = run_ids.iter().map(String::as_str).collect();
    let mut finished = HashMap::with_capacity(run_ids.len());
    let mut backoff = options.initial_backoff;

    loop {
      let mut still_pending = Vec::new();
      for run_id in pending {
        let information = self.run_metadata(run_id).await?;
        if information.status().is_terminal() {
          debug!(run_id, status = %information.status(), "run finished");
          finished.insert(run_id, information);
        } else {
          still_pending.push(run_id);
        }
      }
      pending = still_pending;

      if pending.is_empty() {
        break;
      }

      if let Some(timeout) = options.timeout {
        if start.elapsed() >= timeout {
          return Err(CloudError::WaitTimeout {
            pending: pending.iter().map(|id| id.to_string()).collect(),
            timeout,
          });
        }
      }

      debug!(
        pending = pending.len(),
        backoff_ms = backoff.as_millis() as u64,
        "waiting for runs"
      );
      tokio::time::sleep(backoff).await;
      backoff = (backoff * 2).min(options.max_backoff);
    }

    info!(
      runs = run_ids.len(),
      elapsed_ms = start.elapsed().as_millis() as u64,
      "runs_finished"
    );

    let mut results = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
      if let Some(information) = finished.get(run_id.as_str()) {
        results.push(self.fetch_result(run_id, information).await?);
      }
    }
    Ok(results)
  }
}
