use reqwest::Method;
use tessera_config::ConfigError;
use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum ClientError {
  /// Credentials or profile could not be resolved.
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// A request carried both a JSON payload and raw data.
  #[error("cannot use both a JSON payload and raw data in one request")]
  ConflictingPayload,

  /// The request body is above the backend's payload ceiling.
  #[error("{kind} size of {size} bytes exceeds the maximum allowed size of {max} bytes")]
  PayloadTooLarge {
    kind: &'static str,
    size: usize,
    max: usize,
  },

  /// Non-2xx response after retries were exhausted.
  #[error("{method} request to {endpoint} failed with status code {status} and message: {body}")]
  Http {
    method: Method,
    endpoint: String,
    status: u16,
    body: String,
  },

  /// The request never produced a response (connection, timeout, TLS).
  #[error("{method} request to {endpoint} failed: {source}")]
  Request {
    method: Method,
    endpoint: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("invalid url '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("invalid header '{name}': {message}")]
  InvalidHeader { name: String, message: String },

  #[error("failed to decode response from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize payload: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to build http client: {0}")]
  Build(#[source] reqwest::Error),
}

impl ClientError {
  /// HTTP status of an [`ClientError::Http`] failure.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// 4xx: the request itself was rejected.
  pub fn is_client_error(&self) -> bool {
    self.status().is_some_and(|s| (400..500).contains(&s))
  }

  /// 5xx: the service failed to handle a valid request.
  pub fn is_server_error(&self) -> bool {
    self.status().is_some_and(|s| s >= 500)
  }
}
