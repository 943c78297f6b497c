mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Value, json};
use tessera_cloud::StatusV2;
use tessera_log::Logger;
use tessera_pipeline::{
  AppStep, ChannelNotifier, GraphError, Pipeline, PipelineError, PipelineEvent, PipelineRunner,
  RunnerConfig, Step,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use common::{FakeCloud, SharedBuffer};

fn runner(pipeline: Pipeline) -> PipelineRunner {
  PipelineRunner::new(Arc::new(pipeline)).with_logger(Logger::sink())
}

fn drain(mut rx: UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

fn position(events: &[PipelineEvent], matches: impl Fn(&PipelineEvent) -> bool) -> usize {
  events
    .iter()
    .position(matches)
    .expect("event was not emitted")
}

fn started(step: &'static str) -> impl Fn(&PipelineEvent) -> bool {
  move |e| matches!(e, PipelineEvent::StepStarted { step: s, .. } if s == step)
}

fn completed(step: &'static str) -> impl Fn(&PipelineEvent) -> bool {
  move |e| matches!(e, PipelineEvent::StepCompleted { step: s, .. } if s == step)
}

#[tokio::test]
async fn test_diamond_runs_join_after_both_branches() {
  let pipeline = Pipeline::builder("diamond")
    .step(Step::plain("a", |inputs| Ok(json!(inputs[0].as_i64().unwrap_or(0) + 1))))
    .step(Step::plain("b", |inputs| Ok(json!(inputs[0].as_i64().unwrap_or(0) * 10))).needs(["a"]))
    .step(Step::plain("c", |inputs| Ok(json!(inputs[0].as_i64().unwrap_or(0) * 100))).needs(["a"]))
    .step(Step::plain("d", |inputs| Ok(json!(inputs))).needs(["c", "b"]))
    .build()
    .unwrap();

  let (notifier, rx) = ChannelNotifier::channel();
  let result = runner(pipeline)
    .with_notifier(Arc::new(notifier))
    .run(json!(1), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("a"), Some(&json!(2)));
  assert_eq!(result.get("d"), Some(&json!([200, 20])));

  let events = drain(rx);
  let d_started = position(&events, started("d"));
  assert!(position(&events, completed("b")) < d_started);
  assert!(position(&events, completed("c")) < d_started);
  assert!(matches!(events.first(), Some(PipelineEvent::PipelineStarted { .. })));
  assert!(matches!(events.last(), Some(PipelineEvent::PipelineCompleted { .. })));
}

#[tokio::test]
async fn test_nullary_step_ignores_inputs() {
  let pipeline = Pipeline::builder("nullary")
    .step(Step::plain("load", |inputs| Ok(inputs[0].clone())))
    .step(Step::nullary("constant", || Ok(json!("fixed"))).needs(["load"]))
    .build()
    .unwrap();

  let result = runner(pipeline)
    .run(json!({ "ignored": true }), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("load"), Some(&json!({ "ignored": true })));
  assert_eq!(result.get("constant"), Some(&json!("fixed")));
}

#[tokio::test]
async fn test_repeated_plain_step_runs_in_parallel() {
  let pipeline = Pipeline::builder("repeat")
    .step(
      Step::plain("sample", |inputs| {
        std::thread::sleep(Duration::from_millis(200));
        Ok(json!(inputs[0].as_i64().unwrap_or(0) * 2))
      })
      .repeat(4),
    )
    .build()
    .unwrap();

  let started = std::time::Instant::now();
  let result = runner(pipeline)
    .run(json!(21), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("sample"), Some(&json!([42, 42, 42, 42])));
  assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn test_repeat_results_follow_invocation_order() {
  let counter = Arc::new(AtomicUsize::new(0));
  let claims = counter.clone();

  let pipeline = Pipeline::builder("repeat-order")
    .step(
      Step::nullary("sample", move || {
        let i = claims.fetch_add(1, Ordering::SeqCst) as u64;
        // Earlier invocations finish last.
        std::thread::sleep(Duration::from_millis(50 * (4 - i)));
        Ok(json!(i))
      })
      .repeat(4),
    )
    .build()
    .unwrap();

  let (notifier, rx) = ChannelNotifier::channel();
  let result = runner(pipeline)
    .with_notifier(Arc::new(notifier))
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("sample"), Some(&json!([0, 1, 2, 3])));
  assert_eq!(counter.load(Ordering::SeqCst), 4);

  let events = drain(rx);
  assert!(events.iter().any(completed("sample")));
}

#[tokio::test]
async fn test_repeated_app_step_keeps_submission_order() {
  let cloud = FakeCloud::new();
  let pipeline = Pipeline::builder("ensemble")
    .step(Step::plain("prepare", |_| Ok(json!({ "stops": 3 }))))
    .step(
      Step::app("solve", AppStep::new("routing").instance("v2").option("duration", "10"))
        .needs(["prepare"])
        .repeat(3),
    )
    .build()
    .unwrap();

  let result = runner(pipeline)
    .with_transport(cloud.transport())
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap();

  let outputs = result.get("solve").unwrap().as_array().unwrap();
  let runs: Vec<&str> = outputs.iter().map(|o| o["run"].as_str().unwrap()).collect();
  assert_eq!(runs, ["run-1", "run-2", "run-3"]);
  assert!(outputs.iter().all(|o| o["input"] == json!({ "stops": 3 })));

  let submitted = cloud.runs();
  assert_eq!(submitted.len(), 3);
  assert!(submitted.iter().all(|r| r.app_id == "routing" && r.instance_id == "v2"));
  assert_eq!(submitted[0].options, json!({ "duration": "10" }));
}

#[tokio::test]
async fn test_app_step_root_receives_pipeline_input() {
  let cloud = FakeCloud::new();
  let pipeline = Pipeline::builder("single")
    .step(Step::app("solve", AppStep::new("routing")))
    .build()
    .unwrap();

  let result = runner(pipeline)
    .with_transport(cloud.transport())
    .run(json!({ "vehicles": 2 }), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(
    result.get("solve"),
    Some(&json!({ "app": "routing", "run": "run-1", "input": { "vehicles": 2 } }))
  );
  assert_eq!(cloud.runs()[0].instance_id, AppStep::DEFAULT_INSTANCE);
}

#[tokio::test]
async fn test_failed_app_run_stops_successors() {
  let cloud = FakeCloud::new();
  cloud.fail_run("run-2");
  let reported = Arc::new(AtomicBool::new(false));
  let flag = reported.clone();

  let pipeline = Pipeline::builder("failing")
    .step(Step::app("solve", AppStep::new("routing")).repeat(3))
    .step(
      Step::plain("report", move |_| {
        flag.store(true, Ordering::SeqCst);
        Ok(Value::Null)
      })
      .needs(["solve"]),
    )
    .build()
    .unwrap();

  let (notifier, rx) = ChannelNotifier::channel();
  let err = runner(pipeline)
    .with_transport(cloud.transport())
    .with_notifier(Arc::new(notifier))
    .run(json!({}), CancellationToken::new())
    .await
    .unwrap_err();

  match err {
    PipelineError::AppRunFailed {
      step,
      run_id,
      status,
      error_log,
    } => {
      assert_eq!(step, "solve");
      assert_eq!(run_id, "run-2");
      assert_eq!(status, StatusV2::Failed);
      assert_eq!(error_log.unwrap().error.as_deref(), Some("solver crashed"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(!reported.load(Ordering::SeqCst));

  let events = drain(rx);
  assert!(!events.iter().any(started("report")));
  assert!(matches!(events.last(), Some(PipelineEvent::PipelineFailed { .. })));
}

#[tokio::test]
async fn test_optional_step_skip_passes_null() {
  let buffer = SharedBuffer::default();
  let pipeline = Pipeline::builder("optional")
    .step(Step::plain("load", |_| Ok(json!({ "refine": false }))))
    .step(
      Step::plain("refine", |_| Ok(json!("refined")))
        .needs(["load"])
        .optional(|ctx| ctx.inputs[0]["refine"] == json!(true)),
    )
    .step(Step::plain("finish", |inputs| Ok(json!(inputs))).needs(["load", "refine"]))
    .build()
    .unwrap();

  let (notifier, rx) = ChannelNotifier::channel();
  let result = PipelineRunner::new(Arc::new(pipeline))
    .with_logger(Logger::new(buffer.clone()))
    .with_notifier(Arc::new(notifier))
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_skipped("refine"));
  assert_eq!(result.get("refine"), None);
  assert_eq!(result.get("finish"), Some(&json!([{ "refine": false }, null])));

  let events = drain(rx);
  assert!(
    events
      .iter()
      .any(|e| matches!(e, PipelineEvent::StepSkipped { step, .. } if step == "refine"))
  );

  let lines = buffer.lines();
  assert!(lines.contains(&"Skipping refine".to_string()));
  assert!(!lines.contains(&"Entering refine".to_string()));
  assert!(lines.contains(&"Entering finish".to_string()));
  assert!(lines.contains(&"Finished finish".to_string()));
}

#[tokio::test]
async fn test_optional_step_runs_when_predicate_holds() {
  let pipeline = Pipeline::builder("optional")
    .step(Step::plain("refine", |_| Ok(json!("refined"))).optional(|ctx| ctx.name == "refine"))
    .build()
    .unwrap();

  let result = runner(pipeline)
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("refine"), Some(&json!("refined")));
}

#[tokio::test]
async fn test_step_error_aborts_pipeline() {
  let ran = Arc::new(Mutex::new(Vec::new()));
  let log = ran.clone();

  let pipeline = Pipeline::builder("broken")
    .step(Step::plain("a", |_| Ok(Value::Null)))
    .step(Step::plain("b", |_| Err(anyhow!("bad data"))).needs(["a"]))
    .step(
      Step::plain("c", move |_| {
        log.lock().unwrap().push("c");
        Ok(Value::Null)
      })
      .needs(["b"]),
    )
    .build()
    .unwrap();

  let err = runner(pipeline)
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::StepFailed { ref step, .. } if step == "b"));
  assert_eq!(err.step(), Some("b"));
  assert!(err.to_string().contains("bad data"));
  assert!(ran.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_step_is_reported_as_failure() {
  let pipeline = Pipeline::builder("panics")
    .step(Step::plain("a", |_| panic!("boom")))
    .build()
    .unwrap();

  let err = runner(pipeline)
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::StepFailed { ref step, .. } if step == "a"));
}

#[tokio::test]
async fn test_panicking_predicate_names_its_step() {
  let pipeline = Pipeline::builder("bad-guard")
    .step(Step::plain("load", |_| Ok(json!({}))))
    .step(
      Step::plain("refine", |_| Ok(Value::Null))
        .needs(["load"])
        .optional(|_| panic!("guard exploded")),
    )
    .build()
    .unwrap();

  let (notifier, rx) = ChannelNotifier::channel();
  let err = runner(pipeline)
    .with_notifier(Arc::new(notifier))
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap_err();

  match &err {
    PipelineError::StepPanicked { step, message } => {
      assert_eq!(step, "refine");
      assert_eq!(message, "guard exploded");
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(err.step(), Some("refine"));

  let events = drain(rx);
  assert!(
    events
      .iter()
      .any(|e| matches!(e, PipelineEvent::StepFailed { step, .. } if step == "refine"))
  );
}

#[tokio::test]
async fn test_app_step_without_transport_fails_before_running() {
  let ran = Arc::new(AtomicBool::new(false));
  let flag = ran.clone();
  let pipeline = Pipeline::builder("offline")
    .step(Step::plain("prepare", move |_| {
      flag.store(true, Ordering::SeqCst);
      Ok(Value::Null)
    }))
    .step(Step::app("solve", AppStep::new("routing")).needs(["prepare"]))
    .build()
    .unwrap();

  let err = runner(pipeline)
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::NoTransport { ref step } if step == "solve"));
  assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_stops_waiting_on_app_runs() {
  let cloud = FakeCloud::new();
  cloud.stall_app("routing");
  let pipeline = Pipeline::builder("stalled")
    .step(Step::app("solve", AppStep::new("routing")))
    .build()
    .unwrap();

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let err = runner(pipeline)
    .with_transport(cloud.transport())
    .run(Value::Null, cancel)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Cancelled));
}

#[tokio::test]
async fn test_step_timeout() {
  let cloud = FakeCloud::new();
  cloud.stall_app("routing");
  let pipeline = Pipeline::builder("slow")
    .step(Step::app("solve", AppStep::new("routing")))
    .build()
    .unwrap();

  let err = runner(pipeline)
    .with_transport(cloud.transport())
    .with_config(RunnerConfig {
      step_timeout: Some(Duration::from_millis(100)),
      ..Default::default()
    })
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Timeout { ref step, .. } if step == "solve"));
}

#[tokio::test]
async fn test_max_parallelism_bounds_running_steps() {
  let current = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));

  let mut builder = Pipeline::builder("wide");
  for i in 0..8 {
    let current = current.clone();
    let peak = peak.clone();
    builder = builder.step(Step::nullary(format!("leaf-{i}"), move || {
      let now = current.fetch_add(1, Ordering::SeqCst) + 1;
      peak.fetch_max(now, Ordering::SeqCst);
      std::thread::sleep(Duration::from_millis(30));
      current.fetch_sub(1, Ordering::SeqCst);
      Ok(Value::Null)
    }));
  }

  let result = runner(builder.build().unwrap())
    .with_config(RunnerConfig {
      max_parallelism: 3,
      ..Default::default()
    })
    .run(Value::Null, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.outcomes.len(), 8);
  assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn test_cycle_is_rejected_at_build() {
  let err = Pipeline::builder("loop")
    .step(Step::plain("a", |_| Ok(Value::Null)).needs(["b"]))
    .step(Step::plain("b", |_| Ok(Value::Null)).needs(["a"]))
    .build()
    .unwrap_err();

  assert!(matches!(err, GraphError::Cycle { ref steps } if steps == &["a", "b"]));
}

#[tokio::test]
async fn test_run_logs_diagnostics_and_app_banner() {
  let cloud = FakeCloud::new();
  let buffer = SharedBuffer::default();
  let pipeline = Pipeline::builder("logged")
    .step(Step::app("solve", AppStep::new("routing").instance("latest")).doc("Solve it."))
    .build()
    .unwrap();

  PipelineRunner::new(Arc::new(pipeline))
    .with_transport(cloud.transport())
    .with_logger(Logger::new(buffer.clone()))
    .run(json!({}), CancellationToken::new())
    .await
    .unwrap();

  let out = buffer.contents();
  assert!(out.contains("  Definition: Step(solve, app(routing, latest))\n"));
  assert!(out.contains("  Docstring: Solve it.\n"));
  assert!(out.contains("Mermaid URL: https://mermaid.ink/svg/"));
  assert!(out.contains("Entering solve\nRunning routing version latest\n"));
  assert!(out.contains("Finished solve\n"));
}
