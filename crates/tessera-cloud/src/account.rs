//! Account-wide views.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_client::{Request, Transport};

use crate::error::CloudError;
use crate::status::StatusV2;

/// A run waiting in, or being executed from, the account queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRun {
  pub id: String,
  #[serde(default)]
  pub user_email: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub application_id: Option<String>,
  #[serde(default)]
  pub application_instance_id: Option<String>,
  #[serde(default)]
  pub application_version_id: Option<String>,
  #[serde(default)]
  pub execution_class: Option<String>,
  pub status_v2: StatusV2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Queue {
  #[serde(default)]
  pub runs: Vec<QueuedRun>,
}

/// Handle to the account's API.
#[derive(Clone)]
pub struct Account {
  transport: Arc<dyn Transport>,
}

impl Account {
  pub const ENDPOINT: &'static str = "v1/account";

  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self { transport }
  }

  /// Runs queued or executing across the account.
  pub async fn queue(&self) -> Result<Queue, CloudError> {
    let response = self
      .transport
      .send(Request::get(format!("{}/queue", Self::ENDPOINT)))
      .await?;
    Ok(response.json()?)
  }
}
