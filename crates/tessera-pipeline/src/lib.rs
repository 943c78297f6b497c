//! Tessera Pipeline
//!
//! Declare a DAG of steps, validate it once, then run it with bounded
//! parallelism. Steps are local closures or remote application runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PipelineBuilder                        │
//! │  - step(Step::plain / nullary / app ...) in order           │
//! │  - build(): duplicates, unknown needs, app fan-in, cycles   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Pipeline                            │
//! │  - Graph (adjacency, entry points, join points)             │
//! │  - mermaid diagram and render URL                           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PipelineRunner                         │
//! │  - open / running / closed sets, JoinSet bounded to 8       │
//! │  - plain steps on the blocking pool, app steps via cloud    │
//! │  - events through an ExecutionNotifier                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let pipeline = Pipeline::builder("routing")
//!   .step(Step::plain("prepare", |inputs| Ok(inputs[0].clone())))
//!   .step(Step::app("solve", AppStep::new("routing-app")).needs(["prepare"]).repeat(3))
//!   .step(Step::plain("pick", |inputs| Ok(best(&inputs[0]))).needs(["solve"]))
//!   .build()?;
//!
//! let result = PipelineRunner::new(Arc::new(pipeline))
//!   .with_transport(Arc::new(client))
//!   .run(input, CancellationToken::new())
//!   .await?;
//! ```

mod error;
mod events;
mod graph;
mod mermaid;
mod pipeline;
mod runner;
mod step;

pub use error::{GraphError, PipelineError};
pub use events::{ChannelNotifier, ExecutionNotifier, NoopNotifier, PipelineEvent};
pub use graph::Graph;
pub use mermaid::{mermaid_url, to_mermaid};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use runner::{
  DEFAULT_MAX_PARALLELISM, PipelineResult, PipelineRunner, RunnerConfig, StepOutcome,
};
pub use step::{AppStep, Predicate, Step, StepContext, StepFn, StepKind, StepResult};
