//! Waiting on several runs.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockTransport, metadata, not_found, ok};
use serde_json::json;
use tessera_cloud::{Application, CloudError, StatusV2, WaitOptions};

/// Serves runs that become terminal after `checks` metadata calls.
fn service(runs: &[(&str, &str, u32)]) -> Arc<MockTransport> {
  let state: HashMap<String, (String, u32)> = runs
    .iter()
    .map(|(id, status, checks)| (id.to_string(), (status.to_string(), *checks)))
    .collect();
  let state = Arc::new(Mutex::new(state));

  MockTransport::new(move |request| {
    let path = request
      .endpoint
      .trim_start_matches("v1/applications/routing/runs/");
    let (run_id, is_metadata) = match path.strip_suffix("/metadata") {
      Some(run_id) => (run_id, true),
      None => (path, false),
    };

    let mut state = state.lock().unwrap();
    let Some((status, remaining)) = state.get_mut(run_id) else {
      return not_found(request);
    };

    let current = if *remaining > 0 { "running" } else { status.as_str() };
    let mut body = metadata(run_id, current, 8.0);
    if is_metadata {
      *remaining = remaining.saturating_sub(1);
    } else {
      body["output"] = json!({ "run": run_id });
    }
    ok(request, body)
  })
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_request_order() {
  let transport = service(&[("run-a", "succeeded", 3), ("run-b", "failed", 0)]);
  let app = Application::new(transport, "routing");
  let run_ids = vec!["run-a".to_string(), "run-b".to_string()];

  let results = app
    .wait_for_runs(&run_ids, &WaitOptions::default())
    .await
    .unwrap();

  assert_eq!(results.len(), 2);
  assert_eq!(results[0].id(), "run-a");
  assert_eq!(results[0].status(), StatusV2::Succeeded);
  assert_eq!(results[0].output, Some(json!({ "run": "run-a" })));
  assert_eq!(results[1].status(), StatusV2::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_up_to_max() {
  let transport = service(&[("run-a", "succeeded", 5)]);
  let app = Application::new(transport, "routing");
  let options = WaitOptions {
    max_backoff: Duration::from_secs(4),
    ..Default::default()
  };
  let start = tokio::time::Instant::now();

  app
    .wait_for_runs(&["run-a".to_string()], &options)
    .await
    .unwrap();

  // Five rounds still running: 1 + 2 + 4 + 4 + 4.
  assert_eq!(start.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_names_pending_runs() {
  let transport = service(&[("run-a", "succeeded", 0), ("run-b", "succeeded", 1000)]);
  let app = Application::new(transport, "routing");
  let run_ids = vec!["run-a".to_string(), "run-b".to_string()];

  let err = app
    .wait_for_runs(&run_ids, &WaitOptions::with_timeout(Duration::from_secs(10)))
    .await
    .unwrap_err();

  match err {
    CloudError::WaitTimeout { pending, timeout } => {
      assert_eq!(pending, vec!["run-b".to_string()]);
      assert_eq!(timeout, Duration::from_secs(10));
    }
    other => panic!("unexpected error: {other}"),
  }
}
