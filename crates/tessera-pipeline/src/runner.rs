//! Pipeline runner.
//!
//! The [`PipelineRunner`] walks a validated [`Pipeline`] with a bounded pool
//! of tasks. A step is dispatched once every predecessor has recorded an
//! outcome; the first failure aborts the run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_client::Transport;
use tessera_cloud::{Application, CloudError, NewRun, RunInput, StatusV2, WaitOptions};
use tessera_log::Logger;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::PipelineError;
use crate::events::{ExecutionNotifier, NoopNotifier, PipelineEvent};
use crate::pipeline::Pipeline;
use crate::step::{AppStep, Step, StepContext, StepFn, StepKind, StepResult};

/// Steps running at once, unless configured otherwise.
pub const DEFAULT_MAX_PARALLELISM: usize = 8;

/// Configuration for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Upper bound on steps in flight. Repeat fan-out is not counted.
  pub max_parallelism: usize,
  /// Fail a step that has not finished in this long. `None` waits forever.
  pub step_timeout: Option<Duration>,
  /// How app steps wait for their remote runs.
  pub wait: WaitOptions,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      max_parallelism: DEFAULT_MAX_PARALLELISM,
      step_timeout: None,
      wait: WaitOptions::default(),
    }
  }
}

/// What a finished step recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepOutcome {
  Completed(Value),
  /// An optional step that did not run. Successors see `null` in its slot.
  Skipped,
}

impl StepOutcome {
  pub fn value(&self) -> Option<&Value> {
    match self {
      Self::Completed(value) => Some(value),
      Self::Skipped => None,
    }
  }

  fn as_input(&self) -> Value {
    self.value().cloned().unwrap_or(Value::Null)
  }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
  pub execution_id: String,
  /// Outcome of every step, keyed by step name.
  pub outcomes: HashMap<String, StepOutcome>,
}

impl PipelineResult {
  /// Output of `step`, if it ran.
  pub fn get(&self, step: &str) -> Option<&Value> {
    self.outcomes.get(step).and_then(StepOutcome::value)
  }

  pub fn is_skipped(&self, step: &str) -> bool {
    matches!(self.outcomes.get(step), Some(StepOutcome::Skipped))
  }
}

/// Executes a pipeline.
///
/// # Usage
///
/// ```ignore
/// let runner = PipelineRunner::new(Arc::new(pipeline))
///   .with_transport(Arc::new(client));
///
/// let cancel = CancellationToken::new();
/// let result = runner.run(json!({ "stops": [] }), cancel).await?;
/// ```
pub struct PipelineRunner {
  pipeline: Arc<Pipeline>,
  transport: Option<Arc<dyn Transport>>,
  logger: Logger,
  notifier: Arc<dyn ExecutionNotifier>,
  config: RunnerConfig,
}

impl PipelineRunner {
  pub fn new(pipeline: Arc<Pipeline>) -> Self {
    Self {
      pipeline,
      transport: None,
      logger: Logger::stderr(),
      notifier: Arc::new(NoopNotifier),
      config: RunnerConfig::default(),
    }
  }

  /// Transport for app steps. Required when the pipeline has any.
  pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  pub fn with_logger(mut self, logger: Logger) -> Self {
    self.logger = logger;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_config(mut self, config: RunnerConfig) -> Self {
    self.config = config;
    self
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.pipeline
  }

  /// Run every step once, feeding `input` to the root steps.
  #[instrument(
    name = "pipeline_run",
    skip(self, input, cancel),
    fields(pipeline = %self.pipeline.name())
  )]
  pub async fn run(
    &self,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<PipelineResult, PipelineError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      pipeline = %self.pipeline.name(),
      steps = self.pipeline.steps().len(),
      "pipeline_started"
    );
    self.notifier.notify(PipelineEvent::PipelineStarted {
      execution_id: execution_id.clone(),
      pipeline: self.pipeline.name().to_string(),
    });

    let result = match self.check_transport() {
      Ok(()) => {
        self.pipeline.log_diagnostics(&self.logger);
        self.run_loop(&execution_id, input, &cancel).await
      }
      Err(e) => Err(e),
    };

    match &result {
      Ok(_) => {
        info!(execution_id = %execution_id, "pipeline_completed");
        self.notifier.notify(PipelineEvent::PipelineCompleted {
          execution_id: execution_id.clone(),
        });
      }
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "pipeline_failed");
        self.notifier.notify(PipelineEvent::PipelineFailed {
          execution_id: execution_id.clone(),
          error: e.to_string(),
        });
      }
    }

    result
  }

  fn check_transport(&self) -> Result<(), PipelineError> {
    if self.transport.is_some() {
      return Ok(());
    }
    match self.pipeline.app_steps().next() {
      Some(step) => Err(PipelineError::NoTransport {
        step: step.to_string(),
      }),
      None => Ok(()),
    }
  }

  /// Run the main scheduling loop.
  ///
  /// `open` holds steps whose turn may have come, `running` those in the
  /// pool, `closed` those with a recorded outcome.
  async fn run_loop(
    &self,
    execution_id: &str,
    input: Value,
    cancel: &CancellationToken,
  ) -> Result<PipelineResult, PipelineError> {
    let graph = self.pipeline.graph();
    let max_parallelism = self.config.max_parallelism.max(1);

    let mut open: Vec<String> = graph.entry_points().to_vec();
    let mut running: HashSet<String> = HashSet::new();
    let mut closed: HashMap<String, StepOutcome> = HashMap::new();
    let mut tasks: JoinSet<(String, Result<StepOutcome, PipelineError>)> = JoinSet::new();
    let mut task_steps: HashMap<task::Id, String> = HashMap::new();

    while !open.is_empty() || !running.is_empty() {
      if cancel.is_cancelled() {
        tasks.abort_all();
        warn!(execution_id = %execution_id, "pipeline cancelled");
        return Err(PipelineError::Cancelled);
      }

      while running.len() < max_parallelism {
        let Some(pos) = open.iter().position(|step| {
          graph
            .upstream(step)
            .iter()
            .all(|p| closed.contains_key(p))
        }) else {
          break;
        };
        let name = open.remove(pos);
        let Some(step) = self.pipeline.step(&name) else {
          continue;
        };

        info!(execution_id = %execution_id, step = %name, "step_started");
        self.notifier.notify(PipelineEvent::StepStarted {
          execution_id: execution_id.to_string(),
          step: name.clone(),
        });

        let task = self.step_task(step, self.inputs_for(step, &closed, &input));
        let handle = tasks.spawn(task.run());
        task_steps.insert(handle.id(), name.clone());
        running.insert(name);
      }

      if running.is_empty() {
        break;
      }

      let joined = tokio::select! {
        joined = tasks.join_next_with_id() => joined,
        _ = cancel.cancelled() => {
          tasks.abort_all();
          warn!(execution_id = %execution_id, "pipeline cancelled during step execution");
          return Err(PipelineError::Cancelled);
        }
      };
      let Some(joined) = joined else {
        break;
      };
      let (name, outcome) = match joined {
        Ok((id, joined)) => {
          task_steps.remove(&id);
          joined
        }
        Err(e) => {
          tasks.abort_all();
          let error = match task_steps.remove(&e.id()) {
            Some(step) => {
              let message = panic_message(e);
              error!(execution_id = %execution_id, step = %step, error = %message, "step_panicked");
              self.notifier.notify(PipelineEvent::StepFailed {
                execution_id: execution_id.to_string(),
                step: step.clone(),
                error: message.clone(),
              });
              PipelineError::StepPanicked { step, message }
            }
            None => PipelineError::Join(e.to_string()),
          };
          return Err(error);
        }
      };
      running.remove(&name);

      match outcome {
        Ok(outcome) => {
          self.record(execution_id, &name, &outcome);
          closed.insert(name.clone(), outcome);
          for successor in graph.downstream(&name) {
            if !open.contains(successor)
              && !running.contains(successor)
              && !closed.contains_key(successor)
            {
              open.push(successor.clone());
            }
          }
        }
        Err(e) => {
          tasks.abort_all();
          error!(execution_id = %execution_id, step = %name, error = %e, "step_failed");
          self.notifier.notify(PipelineEvent::StepFailed {
            execution_id: execution_id.to_string(),
            step: name,
            error: e.to_string(),
          });
          return Err(e);
        }
      }
    }

    Ok(PipelineResult {
      execution_id: execution_id.to_string(),
      outcomes: closed,
    })
  }

  fn record(&self, execution_id: &str, step: &str, outcome: &StepOutcome) {
    match outcome {
      StepOutcome::Completed(output) => {
        info!(execution_id = %execution_id, step = %step, "step_completed");
        self.notifier.notify(PipelineEvent::StepCompleted {
          execution_id: execution_id.to_string(),
          step: step.to_string(),
          output: output.clone(),
        });
      }
      StepOutcome::Skipped => {
        info!(execution_id = %execution_id, step = %step, "step_skipped");
        self.notifier.notify(PipelineEvent::StepSkipped {
          execution_id: execution_id.to_string(),
          step: step.to_string(),
        });
      }
    }
  }

  /// Positional inputs of `step`: predecessor outcomes in `needs` order, or
  /// the pipeline input for a root step.
  fn inputs_for(
    &self,
    step: &Step,
    closed: &HashMap<String, StepOutcome>,
    input: &Value,
  ) -> Vec<Value> {
    if step.needs.is_empty() {
      return vec![input.clone()];
    }
    step
      .needs
      .iter()
      .map(|p| closed.get(p).map(StepOutcome::as_input).unwrap_or(Value::Null))
      .collect()
  }

  fn step_task(&self, step: &Step, inputs: Vec<Value>) -> StepTask {
    StepTask {
      name: step.name.clone(),
      kind: step.kind.clone(),
      inputs: Arc::new(inputs),
      transport: self.transport.clone(),
      logger: self.logger.clone(),
      wait: self.config.wait.clone(),
      timeout: self.config.step_timeout,
    }
  }
}

/// Text of a task's panic payload, when it carried one.
fn panic_message(error: JoinError) -> String {
  if !error.is_panic() {
    return error.to_string();
  }
  let payload = error.into_panic();
  if let Some(message) = payload.downcast_ref::<&str>() {
    return message.to_string();
  }
  if let Some(message) = payload.downcast_ref::<String>() {
    return message.clone();
  }
  "unknown panic payload".to_string()
}

/// Everything one step needs to run inside the pool.
struct StepTask {
  name: String,
  kind: StepKind,
  inputs: Arc<Vec<Value>>,
  transport: Option<Arc<dyn Transport>>,
  logger: Logger,
  wait: WaitOptions,
  timeout: Option<Duration>,
}

impl StepTask {
  #[instrument(name = "pipeline_step", skip(self), fields(step = %self.name))]
  async fn run(self) -> (String, Result<StepOutcome, PipelineError>) {
    let name = self.name.clone();
    let timeout = self.timeout;
    let outcome = match timeout {
      Some(timeout) => match tokio::time::timeout(timeout, self.execute()).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PipelineError::Timeout {
          step: name.clone(),
          timeout,
        }),
      },
      None => self.execute().await,
    };
    (name, outcome)
  }

  async fn execute(self) -> Result<StepOutcome, PipelineError> {
    let mut kind = &self.kind;
    while let StepKind::Optional { predicate, inner } = kind {
      let context = StepContext {
        name: &self.name,
        inputs: &self.inputs,
      };
      if !predicate(&context) {
        self.logger.log(format!("Skipping {}", self.name));
        return Ok(StepOutcome::Skipped);
      }
      kind = inner;
    }

    self.logger.log(format!("Entering {}", self.name));
    let output = match kind {
      StepKind::Plain(body) => self.run_plain(body).await?,
      StepKind::App(app) => self
        .run_app(app, 1)
        .await?
        .into_iter()
        .next()
        .unwrap_or(Value::Null),
      StepKind::Repeat { repetitions, inner } => match inner.as_ref() {
        StepKind::Plain(body) => Value::Array(self.run_plain_repeated(body, *repetitions).await?),
        StepKind::App(app) => Value::Array(self.run_app(app, *repetitions).await?),
        StepKind::Repeat { .. } | StepKind::Optional { .. } => return Err(self.malformed()),
      },
      StepKind::Optional { .. } => return Err(self.malformed()),
    };
    self.logger.log(format!("Finished {}", self.name));

    Ok(StepOutcome::Completed(output))
  }

  async fn run_plain(&self, body: &StepFn) -> Result<Value, PipelineError> {
    let body = body.clone();
    let inputs = self.inputs.clone();
    let joined = tokio::task::spawn_blocking(move || body.call(&inputs)).await;
    self.body_output(joined)
  }

  /// Run `body` `repetitions` times in parallel; outputs keep invocation
  /// order.
  async fn run_plain_repeated(
    &self,
    body: &StepFn,
    repetitions: usize,
  ) -> Result<Vec<Value>, PipelineError> {
    let handles: Vec<_> = (0..repetitions)
      .map(|_| {
        let body = body.clone();
        let inputs = self.inputs.clone();
        tokio::task::spawn_blocking(move || body.call(&inputs))
      })
      .collect();

    let mut outputs = Vec::with_capacity(repetitions);
    for handle in handles {
      outputs.push(self.body_output(handle.await)?);
    }
    Ok(outputs)
  }

  fn body_output(&self, joined: Result<StepResult, JoinError>) -> Result<Value, PipelineError> {
    match joined {
      Ok(Ok(output)) => Ok(output),
      Ok(Err(source)) => Err(PipelineError::StepFailed {
        step: self.name.clone(),
        source,
      }),
      Err(e) => Err(PipelineError::StepFailed {
        step: self.name.clone(),
        source: anyhow::anyhow!("step panicked: {}", e),
      }),
    }
  }

  /// Submit `repetitions` runs of `app` with the step's single input, wait
  /// for all of them, and return their outputs in submission order.
  async fn run_app(&self, app: &AppStep, repetitions: usize) -> Result<Vec<Value>, PipelineError> {
    let [input] = self.inputs.as_slice() else {
      return Err(PipelineError::AppStepInputs {
        step: self.name.clone(),
        count: self.inputs.len(),
      });
    };
    let transport = self
      .transport
      .clone()
      .ok_or_else(|| PipelineError::NoTransport {
        step: self.name.clone(),
      })?;
    let app_error = |source: CloudError| PipelineError::AppRun {
      step: self.name.clone(),
      source,
    };

    self
      .logger
      .log(format!("Running {} version {}", app.app_id, app.instance_id));
    let application = Application::new(transport, app.app_id.clone())
      .with_default_instance(app.instance_id.clone());

    let mut run_ids = Vec::with_capacity(repetitions);
    for _ in 0..repetitions {
      let run = NewRun {
        input: Some(RunInput::Json(input.clone())),
        options: app.options.clone(),
        configuration: app.configuration.clone(),
        ..Default::default()
      };
      run_ids.push(application.new_run(run).await.map_err(app_error)?);
    }
    info!(step = %self.name, app_id = %app.app_id, run_ids = ?run_ids, "app_runs_submitted");

    let results = application
      .wait_for_runs(&run_ids, &self.wait)
      .await
      .map_err(app_error)?;

    if let Some(failed) = results.iter().find(|r| r.status() != StatusV2::Succeeded) {
      return Err(PipelineError::AppRunFailed {
        step: self.name.clone(),
        run_id: failed.id().to_string(),
        status: failed.status(),
        error_log: failed.error_log.clone(),
      });
    }

    Ok(
      results
        .into_iter()
        .map(|r| r.output.unwrap_or(Value::Null))
        .collect(),
    )
  }

  fn malformed(&self) -> PipelineError {
    PipelineError::StepFailed {
      step: self.name.clone(),
      source: anyhow::anyhow!("repeat can only wrap a plain or app step"),
    }
  }
}
