//! HTTP client implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tessera_config::Credentials;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{ClientConfig, DEFAULT_URL};
use crate::error::ClientError;
use crate::request::{Request, Response};
use crate::transport::Transport;

/// A request after validation, ready to be sent (and re-sent).
struct Prepared {
  method: Method,
  endpoint: String,
  url: Url,
  headers: HeaderMap,
  query: Vec<(String, String)>,
  body: Option<Bytes>,
}

/// Authenticated client for the cloud API.
///
/// Each client owns its own connection pool.
#[derive(Debug, Clone)]
pub struct Client {
  http: reqwest::Client,
  base_url: Url,
  default_headers: HeaderMap,
  config: ClientConfig,
}

impl Client {
  /// Build a client, resolving credentials from `config`, the environment
  /// and the config file. Fails if no API key can be found.
  pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
    let credentials = config.credential_source().resolve()?;
    Self::with_credentials(config, credentials)
  }

  /// Build a client from already-resolved credentials.
  pub fn with_credentials(
    config: ClientConfig,
    credentials: Credentials,
  ) -> Result<Self, ClientError> {
    let url = config
      .url
      .clone()
      .or_else(|| credentials.endpoint.clone())
      .unwrap_or_else(|| DEFAULT_URL.to_string());
    let base_url = parse_base_url(&url)?;

    let mut default_headers = to_header_map(&config.headers)?;
    let mut authorization = header_value(
      AUTHORIZATION.as_str(),
      &format!("Bearer {}", credentials.api_key),
    )?;
    authorization.set_sensitive(true);
    default_headers.insert(AUTHORIZATION, authorization);
    default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(ClientError::Build)?;

    debug!(base_url = %base_url, key_source = ?credentials.source, "client created");

    Ok(Self {
      http,
      base_url,
      default_headers,
      config,
    })
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Headers sent when a request does not override them.
  pub fn default_headers(&self) -> &HeaderMap {
    &self.default_headers
  }

  /// Validate and resolve a request without sending it.
  fn prepare(&self, request: Request) -> Result<Prepared, ClientError> {
    let body = match (request.payload, request.data) {
      (Some(_), Some(_)) => return Err(ClientError::ConflictingPayload),
      (Some(payload), None) => {
        let body = serde_json::to_vec(&payload).map_err(ClientError::Serialize)?;
        self.check_size("payload", body.len())?;
        Some(Bytes::from(body))
      }
      (None, Some(data)) => {
        self.check_size("data", data.len())?;
        Some(data)
      }
      (None, None) => None,
    };

    let url = self
      .base_url
      .join(&request.endpoint)
      .map_err(|source| ClientError::InvalidUrl {
        url: request.endpoint.clone(),
        source,
      })?;

    let headers = match &request.headers {
      Some(headers) => to_header_map(headers)?,
      None => self.default_headers.clone(),
    };

    Ok(Prepared {
      method: request.method,
      endpoint: request.endpoint,
      url,
      headers,
      query: request.query,
      body,
    })
  }

  fn check_size(&self, kind: &'static str, size: usize) -> Result<(), ClientError> {
    let max = self.config.max_payload_size;
    if size > max {
      return Err(ClientError::PayloadTooLarge { kind, size, max });
    }
    Ok(())
  }

  /// Send once per attempt, retrying transient failures per the retry policy.
  ///
  /// Returns whatever response ends the loop, including non-2xx ones.
  async fn send_with_retries(&self, prepared: &Prepared) -> Result<Response, ClientError> {
    let policy = &self.config.retry;
    let mut attempt = 0;

    loop {
      let mut builder = self
        .http
        .request(prepared.method.clone(), prepared.url.clone())
        .headers(prepared.headers.clone());
      if !prepared.query.is_empty() {
        builder = builder.query(&prepared.query);
      }
      if let Some(body) = &prepared.body {
        builder = builder.body(body.clone());
      }

      match builder.send().await {
        Ok(response) => {
          let status = response.status().as_u16();
          if attempt < policy.max_retries && policy.should_retry_status(&prepared.method, status) {
            attempt += 1;
            let delay = policy.backoff(attempt);
            warn!(
              endpoint = %prepared.endpoint,
              status,
              attempt,
              delay_ms = delay.as_millis() as u64,
              "transient server error, retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
          }

          let headers = response.headers().clone();
          let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Request {
              method: prepared.method.clone(),
              endpoint: prepared.endpoint.clone(),
              source,
            })?;

          return Ok(Response {
            endpoint: prepared.endpoint.clone(),
            status,
            headers,
            body,
          });
        }
        Err(e)
          if (e.is_connect() || e.is_timeout())
            && attempt < policy.max_retries
            && policy.allows(&prepared.method) =>
        {
          attempt += 1;
          let delay = policy.backoff(attempt);
          warn!(
            endpoint = %prepared.endpoint,
            error = %e,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "request failed, retrying"
          );
          tokio::time::sleep(delay).await;
        }
        Err(source) => {
          return Err(ClientError::Request {
            method: prepared.method.clone(),
            endpoint: prepared.endpoint.clone(),
            source,
          });
        }
      }
    }
  }
}

#[async_trait]
impl Transport for Client {
  #[instrument(
    name = "client_request",
    skip(self, request),
    fields(method = %request.method, endpoint = %request.endpoint)
  )]
  async fn send(&self, request: Request) -> Result<Response, ClientError> {
    let prepared = self.prepare(request)?;
    let policy = &self.config.rate_limit;
    let mut rate_limited = 0;

    loop {
      let response = self.send_with_retries(&prepared).await?;

      if response.status == 429 && rate_limited < policy.max_retries {
        rate_limited += 1;
        let delay = policy.delay(rate_limited, response.retry_after());
        warn!(
          endpoint = %prepared.endpoint,
          attempt = rate_limited,
          delay_ms = delay.as_millis() as u64,
          "rate limited, backing off"
        );
        tokio::time::sleep(delay).await;
        continue;
      }

      if !(200..300).contains(&response.status) {
        return Err(ClientError::Http {
          method: prepared.method.clone(),
          endpoint: prepared.endpoint.clone(),
          status: response.status,
          body: response.text(),
        });
      }

      debug!(status = response.status, bytes = response.body.len(), "request completed");
      return Ok(response);
    }
  }
}

/// Parse the base URL, making sure relative endpoints append to its path.
fn parse_base_url(url: &str) -> Result<Url, ClientError> {
  let normalized = if url.ends_with('/') {
    url.to_string()
  } else {
    format!("{}/", url)
  };
  Url::parse(&normalized).map_err(|source| ClientError::InvalidUrl {
    url: url.to_string(),
    source,
  })
}

fn to_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ClientError> {
  let mut map = HeaderMap::with_capacity(headers.len());
  for (name, value) in headers {
    let header_name =
      HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
        name: name.clone(),
        message: e.to_string(),
      })?;
    map.insert(header_name, header_value(name, value)?);
  }
  Ok(map)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
  HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
    name: name.to_string(),
    message: e.to_string(),
  })
}
