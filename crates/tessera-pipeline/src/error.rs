use std::time::Duration;

use tessera_cloud::{CloudError, ErrorLog, StatusV2};
use thiserror::Error;

/// Errors found while building a pipeline, before anything runs.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("pipeline has no steps")]
  Empty,

  #[error("step '{step}' is declared more than once")]
  DuplicateStep { step: String },

  #[error("step '{step}' needs unknown step '{predecessor}'")]
  UnknownPredecessor { step: String, predecessor: String },

  #[error("cycle detected among steps: {}", .steps.join(", "))]
  Cycle { steps: Vec<String> },

  #[error(
    "app step '{step}' has {} predecessors ({}), but app steps take at most one",
    .predecessors.len(),
    .predecessors.join(", ")
  )]
  AppStepFanIn {
    step: String,
    predecessors: Vec<String>,
  },

  #[error("invalid step '{step}': {message}")]
  InvalidStep { step: String, message: String },
}

/// Errors raised while running a pipeline. The first one aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("step '{step}' failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: anyhow::Error,
  },

  /// A remote run reached a terminal status other than `succeeded`.
  #[error(
    "app step '{step}' run {run_id} ended with status {status}: {}",
    .error_log.as_ref().and_then(|log| log.error.as_deref()).unwrap_or("no error log")
  )]
  AppRunFailed {
    step: String,
    run_id: String,
    status: StatusV2,
    error_log: Option<ErrorLog>,
  },

  #[error("app step '{step}' could not run: {source}")]
  AppRun {
    step: String,
    #[source]
    source: CloudError,
  },

  #[error("app step '{step}' received {count} inputs, expected exactly one")]
  AppStepInputs { step: String, count: usize },

  #[error("app step '{step}' needs a transport, but the runner has none")]
  NoTransport { step: String },

  #[error("step '{step}' did not finish within {timeout:?}")]
  Timeout { step: String, timeout: Duration },

  /// The step's task panicked outside its body, e.g. in an optional
  /// step's predicate.
  #[error("step '{step}' panicked: {message}")]
  StepPanicked { step: String, message: String },

  #[error("pipeline cancelled")]
  Cancelled,

  #[error("step task failed to join: {0}")]
  Join(String),
}

impl PipelineError {
  /// Name of the step that failed, when one did.
  pub fn step(&self) -> Option<&str> {
    match self {
      Self::StepFailed { step, .. }
      | Self::AppRunFailed { step, .. }
      | Self::AppRun { step, .. }
      | Self::AppStepInputs { step, .. }
      | Self::NoTransport { step }
      | Self::Timeout { step, .. }
      | Self::StepPanicked { step, .. } => Some(step),
      Self::Cancelled | Self::Join(_) => None,
    }
  }
}
