//! Execution events and notifiers for observability.
//!
//! Events are emitted by the runner's scheduling loop, so their order matches
//! the order in which steps were dispatched and their results recorded.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
  PipelineStarted {
    execution_id: String,
    pipeline: String,
  },

  /// A step was dispatched to the worker pool.
  StepStarted { execution_id: String, step: String },

  /// An optional step's predicate declined to run it.
  StepSkipped { execution_id: String, step: String },

  StepCompleted {
    execution_id: String,
    step: String,
    output: serde_json::Value,
  },

  StepFailed {
    execution_id: String,
    step: String,
    error: String,
  },

  PipelineCompleted { execution_id: String },

  PipelineFailed { execution_id: String, error: String },
}

/// Trait for receiving pipeline events.
///
/// The runner calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: PipelineEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls scheduling; volume is a few
  // events per step.
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }

  /// A notifier and the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
