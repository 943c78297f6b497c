//! Step descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tessera_cloud::{RunConfiguration, stringify_options};

/// What a local step body returns.
pub type StepResult = anyhow::Result<Value>;

/// Decides whether an optional step runs. `true` runs it, `false` skips it.
pub type Predicate = Arc<dyn Fn(&StepContext<'_>) -> bool + Send + Sync>;

/// What a predicate sees of the step it guards.
#[derive(Debug)]
pub struct StepContext<'a> {
  pub name: &'a str,
  /// Predecessor results in declaration order, or the pipeline input for a
  /// root step.
  pub inputs: &'a [Value],
}

/// Body of a local step.
#[derive(Clone)]
pub enum StepFn {
  /// Takes no arguments; predecessor results are dropped.
  Nullary(Arc<dyn Fn() -> StepResult + Send + Sync>),
  /// Takes predecessor results as positional arguments.
  WithInputs(Arc<dyn Fn(&[Value]) -> StepResult + Send + Sync>),
}

impl StepFn {
  pub(crate) fn call(&self, inputs: &[Value]) -> StepResult {
    match self {
      Self::Nullary(f) => f(),
      Self::WithInputs(f) => f(inputs),
    }
  }
}

impl fmt::Debug for StepFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Nullary(_) => f.write_str("Nullary"),
      Self::WithInputs(_) => f.write_str("WithInputs"),
    }
  }
}

/// A remote application invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStep {
  pub app_id: String,
  pub instance_id: String,
  /// Sent as the run's options. The service only accepts strings.
  pub options: BTreeMap<String, String>,
  pub configuration: Option<RunConfiguration>,
}

impl AppStep {
  /// Instance used when none is given.
  pub const DEFAULT_INSTANCE: &'static str = "default";

  pub fn new(app_id: impl Into<String>) -> Self {
    Self {
      app_id: app_id.into(),
      instance_id: Self::DEFAULT_INSTANCE.to_string(),
      options: BTreeMap::new(),
      configuration: None,
    }
  }

  pub fn instance(mut self, instance_id: impl Into<String>) -> Self {
    self.instance_id = instance_id.into();
    self
  }

  pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.options.insert(key.into(), value.into());
    self
  }

  /// Add options of any JSON type; non-strings are stored as JSON text.
  pub fn options(mut self, options: &serde_json::Map<String, Value>) -> Self {
    self.options.extend(stringify_options(options));
    self
  }

  pub fn configuration(mut self, configuration: RunConfiguration) -> Self {
    self.configuration = Some(configuration);
    self
  }
}

/// How a step is executed.
///
/// `Repeat` may only wrap `Plain` or `App`. `Optional` may wrap anything.
#[derive(Clone)]
pub enum StepKind {
  Plain(StepFn),
  /// Run `inner` this many times in parallel; the result is an ordered array.
  Repeat {
    repetitions: usize,
    inner: Box<StepKind>,
  },
  App(AppStep),
  Optional {
    predicate: Predicate,
    inner: Box<StepKind>,
  },
}

impl StepKind {
  /// Whether the step ultimately invokes a remote application.
  pub fn is_app(&self) -> bool {
    match self {
      Self::App(_) => true,
      Self::Plain(_) => false,
      Self::Repeat { inner, .. } | Self::Optional { inner, .. } => inner.is_app(),
    }
  }

  /// Repetition count, if the step fans out.
  pub fn repetitions(&self) -> Option<usize> {
    match self {
      Self::Repeat { repetitions, .. } => Some(*repetitions),
      Self::Optional { inner, .. } => inner.repetitions(),
      Self::Plain(_) | Self::App(_) => None,
    }
  }

  pub fn is_optional(&self) -> bool {
    matches!(self, Self::Optional { .. })
  }
}

impl fmt::Debug for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Plain(body) => f.debug_tuple("Plain").field(body).finish(),
      Self::Repeat { repetitions, inner } => f
        .debug_struct("Repeat")
        .field("repetitions", repetitions)
        .field("inner", inner)
        .finish(),
      Self::App(app) => f.debug_tuple("App").field(app).finish(),
      Self::Optional { inner, .. } => f
        .debug_struct("Optional")
        .field("inner", inner)
        .finish_non_exhaustive(),
    }
  }
}

/// One node of a pipeline: a name, the steps it needs, and how it runs.
#[derive(Debug, Clone)]
pub struct Step {
  pub name: String,
  /// Predecessor names. Their results are passed in this order.
  pub needs: Vec<String>,
  pub kind: StepKind,
  pub doc: Option<String>,
}

impl Step {
  pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
    Self {
      name: name.into(),
      needs: Vec::new(),
      kind,
      doc: None,
    }
  }

  /// A local step taking its predecessors' results (or the pipeline input).
  pub fn plain<F>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn(&[Value]) -> StepResult + Send + Sync + 'static,
  {
    Self::new(name, StepKind::Plain(StepFn::WithInputs(Arc::new(body))))
  }

  /// A local step taking no arguments.
  pub fn nullary<F>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn() -> StepResult + Send + Sync + 'static,
  {
    Self::new(name, StepKind::Plain(StepFn::Nullary(Arc::new(body))))
  }

  /// A step that submits a run of a remote application.
  pub fn app(name: impl Into<String>, app: AppStep) -> Self {
    Self::new(name, StepKind::App(app))
  }

  pub fn needs<I, S>(mut self, predecessors: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.needs.extend(predecessors.into_iter().map(Into::into));
    self
  }

  /// Fan the step out `repetitions` times.
  pub fn repeat(mut self, repetitions: usize) -> Self {
    self.kind = StepKind::Repeat {
      repetitions,
      inner: Box::new(self.kind),
    };
    self
  }

  /// Only run the step when `predicate` returns `true`.
  pub fn optional<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&StepContext<'_>) -> bool + Send + Sync + 'static,
  {
    self.kind = StepKind::Optional {
      predicate: Arc::new(predicate),
      inner: Box::new(self.kind),
    };
    self
  }

  pub fn doc(mut self, doc: impl Into<String>) -> Self {
    self.doc = Some(doc.into());
    self
  }

  /// One-line description used in diagnostics.
  pub fn definition(&self) -> String {
    let mut out = format!("Step({}", self.name);
    if !self.needs.is_empty() {
      out.push_str(&format!(", needs({})", self.needs.join(",")));
    }
    if let Some(repetitions) = self.kind.repetitions() {
      out.push_str(&format!(", repeat({})", repetitions));
    }
    if self.kind.is_optional() {
      out.push_str(", optional");
    }
    if let Some(app) = app_of(&self.kind) {
      out.push_str(&format!(", app({}, {})", app.app_id, app.instance_id));
    }
    out.push(')');
    out
  }
}

fn app_of(kind: &StepKind) -> Option<&AppStep> {
  match kind {
    StepKind::App(app) => Some(app),
    StepKind::Plain(_) => None,
    StepKind::Repeat { inner, .. } | StepKind::Optional { inner, .. } => app_of(inner),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_wrapping_order() {
    let step = Step::app("solve", AppStep::new("routing"))
      .repeat(3)
      .optional(|_| true);

    assert!(step.kind.is_app());
    assert!(step.kind.is_optional());
    assert_eq!(step.kind.repetitions(), Some(3));
    match &step.kind {
      StepKind::Optional { inner, .. } => {
        assert!(matches!(**inner, StepKind::Repeat { repetitions: 3, .. }))
      }
      other => panic!("unexpected kind: {other:?}"),
    }
  }

  #[test]
  fn test_step_fn_arity() {
    let nullary = StepFn::Nullary(Arc::new(|| Ok(json!("constant"))));
    let with_inputs = StepFn::WithInputs(Arc::new(|inputs: &[Value]| Ok(json!(inputs.len()))));
    let inputs = [json!(1), json!(2)];

    assert_eq!(nullary.call(&inputs).unwrap(), json!("constant"));
    assert_eq!(with_inputs.call(&inputs).unwrap(), json!(2));
  }

  #[test]
  fn test_app_options_are_strings() {
    let options = json!({ "duration": 30, "mode": "fast" });
    let app = AppStep::new("routing").options(options.as_object().unwrap());

    assert_eq!(app.instance_id, "default");
    assert_eq!(app.options["duration"], "30");
    assert_eq!(app.options["mode"], "fast");
  }

  #[test]
  fn test_definition() {
    let step = Step::app("solve", AppStep::new("routing").instance("latest"))
      .needs(["prepare"])
      .repeat(2);

    assert_eq!(
      step.definition(),
      "Step(solve, needs(prepare), repeat(2), app(routing, latest))"
    );
  }
}
