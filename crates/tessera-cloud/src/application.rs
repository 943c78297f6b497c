//! Runs of a single application.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tessera_client::{Request, Transport};
use tracing::{debug, info, instrument};

use crate::error::CloudError;
use crate::polling::{PollingOptions, poll};
use crate::run::{
  CreateRun, CreatedRun, DownloadUrl, NewRun, RunInformation, RunInput, RunLog, RunResult,
  UploadUrl,
};

/// Inputs and outputs above this many bytes go through presigned URLs.
pub const MAX_RUN_SIZE: usize = 5 * 1024 * 1024;

/// Instance used when a submission does not name one.
pub const DEFAULT_INSTANCE_ID: &str = "devint";

/// Handle to one application's runs.
#[derive(Clone)]
pub struct Application {
  transport: Arc<dyn Transport>,
  id: String,
  endpoint: String,
  default_instance_id: String,
}

impl fmt::Debug for Application {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Application")
      .field("id", &self.id)
      .field("endpoint", &self.endpoint)
      .field("default_instance_id", &self.default_instance_id)
      .finish_non_exhaustive()
  }
}

impl Application {
  pub fn new(transport: Arc<dyn Transport>, id: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      transport,
      endpoint: format!("v1/applications/{}", id),
      id,
      default_instance_id: DEFAULT_INSTANCE_ID.to_string(),
    }
  }

  pub fn with_default_instance(mut self, instance_id: impl Into<String>) -> Self {
    self.default_instance_id = instance_id.into();
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Base path of this application's API.
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn default_instance_id(&self) -> &str {
    &self.default_instance_id
  }

  /// Submit a run and return its id.
  ///
  /// Text input, and JSON input larger than [`MAX_RUN_SIZE`], is uploaded
  /// first and referenced by upload id. A caller-supplied `upload_id` is sent
  /// as-is and the input is ignored.
  #[instrument(name = "new_run", skip(self, run), fields(application_id = %self.id))]
  pub async fn new_run(&self, run: NewRun) -> Result<String, CloudError> {
    let mut upload_id = run.upload_id;
    let mut inline = None;

    if upload_id.is_none() {
      match run.input {
        Some(input) if requires_upload(&input)? => {
          let url = self.upload_url().await?;
          self.upload_large_input(input, &url.upload_url).await?;
          upload_id = Some(url.upload_id);
        }
        Some(RunInput::Json(value)) => inline = Some(value),
        Some(RunInput::Text(_)) | None => {}
      }
    }

    let body = CreateRun {
      input: inline.as_ref(),
      upload_id: upload_id.as_deref(),
      name: run.name.as_deref(),
      description: run.description.as_deref(),
      options: &run.options,
      configuration: run.configuration.as_ref(),
    };
    let body = serde_json::to_value(&body).map_err(tessera_client::ClientError::Serialize)?;
    let instance_id = run
      .instance_id
      .unwrap_or_else(|| self.default_instance_id.clone());

    let response = self
      .transport
      .send(
        Request::post(format!("{}/runs", self.endpoint))
          .json(body)
          .query("instance_id", &instance_id),
      )
      .await?;
    let created: CreatedRun = response.json()?;

    info!(
      run_id = %created.run_id,
      instance_id = %instance_id,
      uploaded = upload_id.is_some(),
      "run_submitted"
    );
    Ok(created.run_id)
  }

  /// Submit a run and poll until its result is available.
  pub async fn new_run_with_result(
    &self,
    run: NewRun,
    polling: &PollingOptions,
  ) -> Result<RunResult, CloudError> {
    let run_id = self.new_run(run).await?;
    self.run_result_with_polling(&run_id, polling).await
  }

  /// Request a presigned location for large input.
  pub async fn upload_url(&self) -> Result<UploadUrl, CloudError> {
    let response = self
      .transport
      .send(Request::post(format!("{}/runs/uploadurl", self.endpoint)))
      .await?;
    Ok(response.json()?)
  }

  /// PUT `input` to a presigned `upload_url`. The API's auth headers are not
  /// sent there.
  pub async fn upload_large_input(
    &self,
    input: RunInput,
    upload_url: &str,
  ) -> Result<(), CloudError> {
    let (body, content_type) = input.into_upload()?;
    debug!(bytes = body.len(), "uploading run input");
    self
      .transport
      .send(
        Request::put(upload_url)
          .data(body)
          .header("Content-Type", content_type),
      )
      .await?;
    Ok(())
  }

  /// Metadata of a run. Cheap; used for polling.
  pub async fn run_metadata(&self, run_id: &str) -> Result<RunInformation, CloudError> {
    let response = self
      .transport
      .send(Request::get(format!(
        "{}/runs/{}/metadata",
        self.endpoint, run_id
      )))
      .await?;
    Ok(response.json()?)
  }

  /// Metadata and output of a run, whatever its status.
  pub async fn run_result(&self, run_id: &str) -> Result<RunResult, CloudError> {
    let information = self.run_metadata(run_id).await?;
    self.fetch_result(run_id, &information).await
  }

  /// Poll the run's metadata until its status is terminal, then fetch its
  /// result.
  #[instrument(name = "run_result_with_polling", skip(self, polling), fields(application_id = %self.id))]
  pub async fn run_result_with_polling(
    &self,
    run_id: &str,
    polling: &PollingOptions,
  ) -> Result<RunResult, CloudError> {
    let app = self;
    let information = poll(polling, run_id, move || async move {
      let information = app.run_metadata(run_id).await?;
      Ok::<_, CloudError>(information.status().is_terminal().then_some(information))
    })
    .await?;
    self.fetch_result(run_id, &information).await
  }

  /// Fetch the result, following the download indirection when the output is
  /// too large to be returned inline.
  pub(crate) async fn fetch_result(
    &self,
    run_id: &str,
    information: &RunInformation,
  ) -> Result<RunResult, CloudError> {
    let large = information.metadata.output_size > MAX_RUN_SIZE as f64;
    let mut request = Request::get(format!("{}/runs/{}", self.endpoint, run_id));
    if large {
      request = request.query("format", "url");
    }

    let response = self.transport.send(request).await?;
    let mut result: RunResult = response.json()?;

    if large {
      if let Some(output) = result.output.take() {
        let url = download_url(output, &response.endpoint)?;
        debug!(run_id, "downloading large run output");
        let download = self
          .transport
          .send(Request::get(url.url).header("Content-Type", "application/json"))
          .await?;
        result.output = Some(download.json()?);
      }
    }

    Ok(result)
  }

  /// Input a run was submitted with.
  ///
  /// Inputs above [`MAX_RUN_SIZE`] are fetched through a download URL. Bodies
  /// that are not JSON come back as [`RunInput::Text`].
  pub async fn run_input(&self, run_id: &str) -> Result<RunInput, CloudError> {
    let information = self.run_metadata(run_id).await?;
    let endpoint = format!("{}/runs/{}/input", self.endpoint, run_id);

    if information.metadata.input_size <= MAX_RUN_SIZE as f64 {
      let response = self.transport.send(Request::get(endpoint)).await?;
      return Ok(RunInput::from_body(&response.body));
    }

    let response = self
      .transport
      .send(Request::get(endpoint).query("format", "url"))
      .await?;
    let url: DownloadUrl = response.json()?;
    let download = self.transport.send(Request::get(url.url).header("Accept", "*/*")).await?;
    Ok(RunInput::from_body(&download.body))
  }

  /// Request cancellation of a run. Best effort: the run may already have
  /// finished.
  pub async fn cancel_run(&self, run_id: &str) -> Result<(), CloudError> {
    self
      .transport
      .send(Request::patch(format!(
        "{}/runs/{}/cancel",
        self.endpoint, run_id
      )))
      .await?;
    info!(run_id, "run_cancel_requested");
    Ok(())
  }

  /// Logs the run wrote while executing.
  pub async fn run_logs(&self, run_id: &str) -> Result<RunLog, CloudError> {
    let response = self
      .transport
      .send(Request::get(format!("{}/runs/{}/logs", self.endpoint, run_id)))
      .await?;
    Ok(response.json()?)
  }
}

fn requires_upload(input: &RunInput) -> Result<bool, CloudError> {
  Ok(match input {
    RunInput::Text(_) => true,
    RunInput::Json(_) => input.size()? > MAX_RUN_SIZE,
  })
}

fn download_url(output: Value, endpoint: &str) -> Result<DownloadUrl, CloudError> {
  serde_json::from_value(output).map_err(|e| CloudError::InvalidResponse {
    endpoint: endpoint.to_string(),
    message: format!("expected a download url for large output: {}", e),
  })
}
