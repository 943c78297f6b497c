//! Request and response types.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// One call to the cloud API.
///
/// `endpoint` is resolved against the client's base URL, so it may be a
/// relative path (`v1/applications/foo/runs`) or an absolute URL (a presigned
/// upload or download location).
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub endpoint: String,
  /// JSON body. Mutually exclusive with `data`.
  pub payload: Option<serde_json::Value>,
  /// Raw body. Mutually exclusive with `payload`.
  pub data: Option<Bytes>,
  /// Replaces the client's default headers (including auth) when set.
  pub headers: Option<HashMap<String, String>>,
  pub query: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
    Self {
      method,
      endpoint: endpoint.into(),
      payload: None,
      data: None,
      headers: None,
      query: Vec::new(),
    }
  }

  /// GET `endpoint`.
  pub fn get(endpoint: impl Into<String>) -> Self {
    Self::new(Method::GET, endpoint)
  }

  /// POST to `endpoint`. Attach a body with [`Request::json`] or [`Request::data`].
  pub fn post(endpoint: impl Into<String>) -> Self {
    Self::new(Method::POST, endpoint)
  }

  /// PUT to `endpoint`, typically a presigned upload URL.
  pub fn put(endpoint: impl Into<String>) -> Self {
    Self::new(Method::PUT, endpoint)
  }

  /// PATCH `endpoint`.
  pub fn patch(endpoint: impl Into<String>) -> Self {
    Self::new(Method::PATCH, endpoint)
  }

  /// DELETE `endpoint`.
  pub fn delete(endpoint: impl Into<String>) -> Self {
    Self::new(Method::DELETE, endpoint)
  }

  /// Send `payload` as the JSON body.
  pub fn json(mut self, payload: serde_json::Value) -> Self {
    self.payload = Some(payload);
    self
  }

  /// Send raw bytes as the body.
  pub fn data(mut self, data: impl Into<Bytes>) -> Self {
    self.data = Some(data.into());
    self
  }

  /// Add a header override. The first call drops the default header set.
  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self
      .headers
      .get_or_insert_with(HashMap::new)
      .insert(name.into(), value.into());
    self
  }

  pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.query.push((key.into(), value.into()));
    self
  }

  /// Value of query parameter `key`, if set.
  pub fn query_param(&self, key: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }
}

/// A successful response, fully buffered.
#[derive(Debug, Clone)]
pub struct Response {
  pub endpoint: String,
  pub status: u16,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl Response {
  pub fn new(endpoint: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      endpoint: endpoint.into(),
      status,
      headers: HeaderMap::new(),
      body: body.into(),
    }
  }

  /// A 200 response with a JSON body.
  pub fn from_json(endpoint: impl Into<String>, value: &serde_json::Value) -> Self {
    Self::new(endpoint, 200, value.to_string())
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
    serde_json::from_slice(&self.body).map_err(|source| ClientError::Decode {
      endpoint: self.endpoint.clone(),
      source,
    })
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// `Retry-After` in whole seconds, if the server sent one.
  pub fn retry_after(&self) -> Option<Duration> {
    self
      .headers
      .get(RETRY_AFTER)?
      .to_str()
      .ok()?
      .trim()
      .parse::<u64>()
      .ok()
      .map(Duration::from_secs)
  }
}

/// Serialized size of `value` in bytes (compact JSON, UTF-8).
pub fn payload_size(value: &serde_json::Value) -> Result<usize, ClientError> {
  serde_json::to_vec(value)
    .map(|v| v.len())
    .map_err(ClientError::Serialize)
}
