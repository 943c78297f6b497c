//! Recording transport for exercising the runs API without a network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tessera_client::{ClientError, Method, Request, Response, Transport};

type Handler = dyn Fn(&Request) -> Response + Send + Sync;

/// Answers every request with `handler` and remembers what was sent.
///
/// Non-2xx responses are turned into [`ClientError::Http`], like the real
/// client does.
pub struct MockTransport {
  handler: Box<Handler>,
  requests: Mutex<Vec<Request>>,
}

impl MockTransport {
  pub fn new(handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> Arc<Self> {
    Arc::new(Self {
      handler: Box::new(handler),
      requests: Mutex::new(Vec::new()),
    })
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  /// Number of requests with `method` whose endpoint ends with `suffix`.
  pub fn count(&self, method: Method, suffix: &str) -> usize {
    self
      .requests()
      .iter()
      .filter(|r| r.method == method && r.endpoint.ends_with(suffix))
      .count()
  }

  pub fn find(&self, method: Method, suffix: &str) -> Option<Request> {
    self
      .requests()
      .into_iter()
      .find(|r| r.method == method && r.endpoint.ends_with(suffix))
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: Request) -> Result<Response, ClientError> {
    self.requests.lock().unwrap().push(request.clone());
    let response = (self.handler)(&request);
    if !(200..300).contains(&response.status) {
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

pub fn ok(request: &Request, body: Value) -> Response {
  Response::from_json(request.endpoint.clone(), &body)
}

pub fn not_found(request: &Request) -> Response {
  Response::new(request.endpoint.clone(), 404, "{\"error\":\"not found\"}")
}

pub fn metadata(run_id: &str, status: &str, output_size: f64) -> Value {
  json!({
    "id": run_id,
    "user_email": "someone@example.com",
    "metadata": {
      "status_v2": status,
      "created_at": "2024-05-01T10:00:00Z",
      "duration": 1200.0,
      "input_size": 64.0,
      "output_size": output_size,
      "application_id": "routing"
    }
  })
}
