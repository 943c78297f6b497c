//! Client configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tessera_config::CredentialSource;

use crate::retry::{RateLimitPolicy, RetryPolicy};

/// Default base URL of the cloud API.
pub const DEFAULT_URL: &str = "https://api.cloud.nextmv.io";

/// Largest request body the backend accepts, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 500 * 1024 * 1024;

/// Configuration for a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ClientConfig {
  /// Explicit API key. Falls back to the environment, then the config file.
  pub api_key: Option<String>,
  /// Named profile in the config file.
  pub profile: Option<String>,
  /// Config file location, `~/.tessera/config.toml` when unset.
  pub config_path: Option<PathBuf>,
  /// Base URL. Falls back to the profile's endpoint, then [`DEFAULT_URL`].
  pub url: Option<String>,
  /// Per-request timeout.
  pub timeout: Duration,
  /// Headers added to every request on top of auth and content type.
  pub headers: HashMap<String, String>,
  /// Transport-level retries for transient failures.
  pub retry: RetryPolicy,
  /// Backoff applied to HTTP 429 responses.
  pub rate_limit: RateLimitPolicy,
  /// Ceiling on serialized request bodies.
  pub max_payload_size: usize,
}

impl fmt::Debug for ClientConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClientConfig")
      .field("api_key", &self.api_key.as_ref().map(|_| "***"))
      .field("profile", &self.profile)
      .field("config_path", &self.config_path)
      .field("url", &self.url)
      .field("timeout", &self.timeout)
      .field("headers", &self.headers)
      .field("retry", &self.retry)
      .field("rate_limit", &self.rate_limit)
      .field("max_payload_size", &self.max_payload_size)
      .finish()
  }
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      profile: None,
      config_path: None,
      url: None,
      timeout: Duration::from_secs(20),
      headers: HashMap::new(),
      retry: RetryPolicy::default(),
      rate_limit: RateLimitPolicy::default(),
      max_payload_size: MAX_PAYLOAD_SIZE,
    }
  }
}

impl ClientConfig {
  /// Config with an explicit API key and defaults otherwise.
  pub fn with_api_key(api_key: impl Into<String>) -> Self {
    Self {
      api_key: Some(api_key.into()),
      ..Default::default()
    }
  }

  pub(crate) fn credential_source(&self) -> CredentialSource {
    CredentialSource {
      api_key: self.api_key.clone(),
      profile: self.profile.clone(),
      config_path: self.config_path.clone(),
    }
  }
}
