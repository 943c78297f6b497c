//! Pipeline registration and validation.

use std::collections::HashMap;

use tessera_log::Logger;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::mermaid::{mermaid_url, to_mermaid};
use crate::step::{Step, StepKind};

/// Collects steps in declaration order. [`PipelineBuilder::build`] validates
/// the whole graph at once.
#[derive(Debug)]
pub struct PipelineBuilder {
  name: String,
  steps: Vec<Step>,
}

impl PipelineBuilder {
  pub fn step(mut self, step: Step) -> Self {
    self.steps.push(step);
    self
  }

  /// Validate and freeze the graph.
  ///
  /// Fails on duplicate names, unknown predecessors, malformed step kinds,
  /// app steps with more than one predecessor, and cycles.
  pub fn build(self) -> Result<Pipeline, GraphError> {
    if self.steps.is_empty() {
      return Err(GraphError::Empty);
    }

    let mut index = HashMap::with_capacity(self.steps.len());
    for (i, step) in self.steps.iter().enumerate() {
      if index.insert(step.name.clone(), i).is_some() {
        return Err(GraphError::DuplicateStep {
          step: step.name.clone(),
        });
      }
    }

    for step in &self.steps {
      if let Some(predecessor) = step.needs.iter().find(|p| !index.contains_key(*p)) {
        return Err(GraphError::UnknownPredecessor {
          step: step.name.clone(),
          predecessor: predecessor.clone(),
        });
      }
      validate_kind(&step.name, &step.kind)?;
    }

    for step in &self.steps {
      if step.kind.is_app() && step.needs.len() > 1 {
        return Err(GraphError::AppStepFanIn {
          step: step.name.clone(),
          predecessors: step.needs.clone(),
        });
      }
    }

    let graph = Graph::new(&self.steps);
    let cyclic = graph.cyclic_steps();
    if !cyclic.is_empty() {
      return Err(GraphError::Cycle { steps: cyclic });
    }

    Ok(Pipeline {
      name: self.name,
      steps: self.steps,
      index,
      graph,
    })
  }
}

fn validate_kind(step: &str, kind: &StepKind) -> Result<(), GraphError> {
  match kind {
    StepKind::Plain(_) | StepKind::App(_) => Ok(()),
    StepKind::Optional { inner, .. } => validate_kind(step, inner),
    StepKind::Repeat { repetitions, inner } => {
      if *repetitions == 0 {
        return Err(GraphError::InvalidStep {
          step: step.to_string(),
          message: "repeat needs at least one repetition".to_string(),
        });
      }
      match inner.as_ref() {
        StepKind::Plain(_) | StepKind::App(_) => Ok(()),
        StepKind::Repeat { .. } | StepKind::Optional { .. } => Err(GraphError::InvalidStep {
          step: step.to_string(),
          message: "repeat can only wrap a plain or app step".to_string(),
        }),
      }
    }
  }
}

/// A validated, acyclic set of steps.
#[derive(Debug)]
pub struct Pipeline {
  name: String,
  steps: Vec<Step>,
  index: HashMap<String, usize>,
  graph: Graph,
}

impl Pipeline {
  pub fn builder(name: impl Into<String>) -> PipelineBuilder {
    PipelineBuilder {
      name: name.into(),
      steps: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Steps in declaration order.
  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  pub fn step(&self, name: &str) -> Option<&Step> {
    self.index.get(name).map(|i| &self.steps[*i])
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Names of the app steps, in declaration order.
  pub fn app_steps(&self) -> impl Iterator<Item = &str> {
    self
      .steps
      .iter()
      .filter(|s| s.kind.is_app())
      .map(|s| s.name.as_str())
  }

  pub fn mermaid(&self) -> String {
    to_mermaid(self)
  }

  /// Write each step's definition and doc, the mermaid diagram and a render
  /// link to `logger`.
  pub fn log_diagnostics(&self, logger: &Logger) {
    for step in &self.steps {
      logger.log("Node:");
      logger.log(format!("  Definition: {}", step.definition()));
      logger.log(format!(
        "  Docstring: {}",
        step.doc.as_deref().unwrap_or("None")
      ));
    }
    let diagram = self.mermaid();
    logger.log(diagram.trim_end());
    logger.log(format!("Mermaid URL: {}", mermaid_url(&diagram)));
  }
}
