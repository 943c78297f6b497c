//! Tessera Client
//!
//! The transport layer every cloud call goes through. A [`Client`]:
//! - resolves credentials at construction time (see `tessera-config`)
//! - refuses payloads above [`MAX_PAYLOAD_SIZE`] before touching the network
//! - retries transient 5xx responses and connection failures with jittered
//!   exponential backoff ([`RetryPolicy`])
//! - backs off on HTTP 429 with a separate budget ([`RateLimitPolicy`]) so
//!   rate limiting never eats into the retries meant for server errors
//! - turns any remaining non-2xx response into [`ClientError::Http`]
//!
//! Higher layers depend on the [`Transport`] trait rather than on `Client`
//! directly, which keeps them testable without a server.

mod client;
mod config;
mod error;
mod request;
mod retry;
mod transport;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_URL, MAX_PAYLOAD_SIZE};
pub use error::ClientError;
pub use request::{Request, Response, payload_size};
pub use reqwest::Method;
pub use retry::{RateLimitPolicy, RetryPolicy};
pub use transport::Transport;
