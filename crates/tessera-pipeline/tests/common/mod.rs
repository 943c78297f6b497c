//! In-memory runs service for app-step tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tessera_client::{ClientError, Request, Response, Transport};

/// A run as the fake service saw it.
#[derive(Debug, Clone)]
pub struct SubmittedRun {
  pub id: String,
  pub app_id: String,
  pub instance_id: String,
  pub input: Value,
  pub options: Value,
}

#[derive(Default)]
struct State {
  runs: Vec<SubmittedRun>,
  /// Run ids that end in `failed`.
  failing: Vec<String>,
  /// Apps whose runs never finish.
  stuck_apps: Vec<String>,
}

/// Accepts runs and finishes them immediately. Each run's output echoes its
/// app, id and input.
#[derive(Clone, Default)]
pub struct FakeCloud {
  state: Arc<Mutex<State>>,
}

impl FakeCloud {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make the run with this id fail.
  pub fn fail_run(&self, run_id: &str) {
    self.state.lock().unwrap().failing.push(run_id.to_string());
  }

  /// Keep every run of `app_id` running forever.
  pub fn stall_app(&self, app_id: &str) {
    self.state.lock().unwrap().stuck_apps.push(app_id.to_string());
  }

  pub fn runs(&self) -> Vec<SubmittedRun> {
    self.state.lock().unwrap().runs.clone()
  }

  pub fn transport(&self) -> Arc<dyn Transport> {
    Arc::new(self.clone())
  }

  fn handle(&self, request: &Request) -> Response {
    let Some(path) = request.endpoint.strip_prefix("v1/applications/") else {
      return not_found(request);
    };
    let parts: Vec<&str> = path.split('/').collect();
    let mut state = self.state.lock().unwrap();

    match (request.method.as_str(), parts.as_slice()) {
      ("POST", [app_id, "runs"]) => {
        let id = format!("run-{}", state.runs.len() + 1);
        let payload = request.payload.clone().unwrap_or(Value::Null);
        state.runs.push(SubmittedRun {
          id: id.clone(),
          app_id: app_id.to_string(),
          instance_id: request.query_param("instance_id").unwrap_or_default().to_string(),
          input: payload["input"].clone(),
          options: payload["options"].clone(),
        });
        ok(request, json!({ "run_id": id }))
      }
      ("GET", [_, "runs", run_id, "metadata"]) => match status_of(&state, run_id) {
        Some(status) => ok(request, envelope(run_id, status)),
        None => not_found(request),
      },
      ("GET", [_, "runs", run_id]) => {
        let Some(status) = status_of(&state, run_id) else {
          return not_found(request);
        };
        let mut body = envelope(run_id, status);
        if status == "succeeded" {
          let run = state.runs.iter().find(|r| r.id == *run_id);
          if let Some(run) = run {
            body["output"] = json!({ "app": run.app_id, "run": run.id, "input": run.input });
          }
        } else {
          body["error_log"] = json!({ "error": "solver crashed", "stderr": "exit status 1" });
        }
        ok(request, body)
      }
      _ => not_found(request),
    }
  }
}

fn status_of(state: &State, run_id: &str) -> Option<&'static str> {
  let run = state.runs.iter().find(|r| r.id == run_id)?;
  Some(if state.stuck_apps.contains(&run.app_id) {
    "running"
  } else if state.failing.iter().any(|id| id == run_id) {
    "failed"
  } else {
    "succeeded"
  })
}

fn envelope(run_id: &str, status: &str) -> Value {
  json!({
    "id": run_id,
    "metadata": { "status_v2": status, "output_size": 32.0 }
  })
}

fn ok(request: &Request, body: Value) -> Response {
  Response::from_json(request.endpoint.clone(), &body)
}

fn not_found(request: &Request) -> Response {
  Response::new(request.endpoint.clone(), 404, "not found")
}

#[async_trait]
impl Transport for FakeCloud {
  async fn send(&self, request: Request) -> Result<Response, ClientError> {
    let response = self.handle(&request);
    if response.status != 200 {
      return Err(ClientError::Http {
        method: request.method,
        endpoint: request.endpoint,
        status: response.status,
        body: response.text(),
      });
    }
    Ok(response)
  }
}

/// `Write` sink whose contents can be read back.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
  pub fn contents(&self) -> String {
    String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
  }

  pub fn lines(&self) -> Vec<String> {
    self.contents().lines().map(str::to_string).collect()
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}
