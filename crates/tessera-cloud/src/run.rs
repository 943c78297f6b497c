//! Run types exchanged with the runs API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_client::{ClientError, payload_size};

use crate::status::{Status, StatusV2};

/// Input of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
  /// Structured input. Sent inline when small enough.
  Json(Value),
  /// Raw text input. Always sent through an upload URL.
  Text(String),
}

impl RunInput {
  /// Bytes this input occupies on the wire.
  pub fn size(&self) -> Result<usize, ClientError> {
    match self {
      Self::Json(value) => payload_size(value),
      Self::Text(text) => Ok(text.len()),
    }
  }

  /// Body of the upload PUT and its content type.
  pub(crate) fn into_upload(self) -> Result<(Vec<u8>, &'static str), ClientError> {
    match self {
      Self::Json(value) => serde_json::to_vec(&value)
        .map(|body| (body, "application/json"))
        .map_err(ClientError::Serialize),
      Self::Text(text) => Ok((text.into_bytes(), "text/plain")),
    }
  }

  /// Parse a body, keeping it as text when it is not JSON.
  pub(crate) fn from_body(body: &[u8]) -> Self {
    match serde_json::from_slice(body) {
      Ok(value) => Self::Json(value),
      Err(_) => Self::Text(String::from_utf8_lossy(body).into_owned()),
    }
  }
}

impl From<Value> for RunInput {
  fn from(value: Value) -> Self {
    Self::Json(value)
  }
}

/// Execution settings for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub execution_class: Option<String>,
}

/// A run submission.
///
/// Either `input` or `upload_id` should be set. When both are, the upload
/// wins and `input` is not sent.
#[derive(Debug, Clone, Default)]
pub struct NewRun {
  pub input: Option<RunInput>,
  /// Defaults to the application's default instance.
  pub instance_id: Option<String>,
  pub name: Option<String>,
  pub description: Option<String>,
  /// Reference to input already uploaded through an upload URL.
  pub upload_id: Option<String>,
  pub options: BTreeMap<String, String>,
  pub configuration: Option<RunConfiguration>,
}

impl NewRun {
  pub fn json(input: Value) -> Self {
    Self {
      input: Some(RunInput::Json(input)),
      ..Default::default()
    }
  }

  pub fn text(input: impl Into<String>) -> Self {
    Self {
      input: Some(RunInput::Text(input.into())),
      ..Default::default()
    }
  }

  pub fn uploaded(upload_id: impl Into<String>) -> Self {
    Self {
      upload_id: Some(upload_id.into()),
      ..Default::default()
    }
  }

  pub fn instance(mut self, instance_id: impl Into<String>) -> Self {
    self.instance_id = Some(instance_id.into());
    self
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.options.insert(key.into(), value.into());
    self
  }

  /// Add options of any JSON type, stringified the way the API expects.
  pub fn options(mut self, options: &serde_json::Map<String, Value>) -> Self {
    self.options.extend(stringify_options(options));
    self
  }

  pub fn configuration(mut self, configuration: RunConfiguration) -> Self {
    self.configuration = Some(configuration);
    self
  }
}

/// Convert option values to strings: strings stay as they are, everything
/// else becomes its compact JSON text.
pub fn stringify_options(options: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
  options
    .iter()
    .map(|(key, value)| {
      let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      (key.clone(), value)
    })
    .collect()
}

/// Body of the create-run call.
#[derive(Debug, Serialize)]
pub(crate) struct CreateRun<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input: Option<&'a Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub upload_id: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<&'a str>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub options: &'a BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub configuration: Option<&'a RunConfiguration>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedRun {
  pub run_id: String,
}

/// Server-side facts about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
  pub status_v2: StatusV2,
  #[serde(default)]
  pub status: Option<Status>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  /// Milliseconds.
  #[serde(default)]
  pub duration: Option<f64>,
  /// Bytes.
  #[serde(default)]
  pub input_size: f64,
  /// Bytes.
  #[serde(default)]
  pub output_size: f64,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub application_id: Option<String>,
  #[serde(default)]
  pub application_instance_id: Option<String>,
  #[serde(default)]
  pub application_version_id: Option<String>,
}

/// A run and its metadata, without output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInformation {
  pub id: String,
  pub metadata: Metadata,
  #[serde(default)]
  pub user_email: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
}

impl RunInformation {
  pub fn status(&self) -> StatusV2 {
    self.metadata.status_v2
  }
}

/// Captured error output of a failed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub stdout: Option<String>,
  #[serde(default)]
  pub stderr: Option<String>,
}

/// A run's metadata plus its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
  #[serde(flatten)]
  pub information: RunInformation,
  /// Absent until the run has succeeded.
  #[serde(default)]
  pub output: Option<Value>,
  #[serde(default)]
  pub error_log: Option<ErrorLog>,
}

impl RunResult {
  pub fn id(&self) -> &str {
    &self.information.id
  }

  pub fn status(&self) -> StatusV2 {
    self.information.metadata.status_v2
  }
}

/// Location to upload large input to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUrl {
  pub upload_id: String,
  pub upload_url: String,
}

/// Location to download large output or input from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadUrl {
  pub url: String,
}

/// Logs of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
  #[serde(default)]
  pub log: String,
}
