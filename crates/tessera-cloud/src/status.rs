use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusV2 {
  Canceled,
  Failed,
  None,
  Queued,
  Running,
  Succeeded,
}

impl StatusV2 {
  /// No further transitions happen from a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Canceled => "canceled",
      Self::Failed => "failed",
      Self::None => "none",
      Self::Queued => "queued",
      Self::Running => "running",
      Self::Succeeded => "succeeded",
    }
  }
}

impl fmt::Display for StatusV2 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Legacy status reported alongside [`StatusV2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Failed,
  Running,
  Succeeded,
}
