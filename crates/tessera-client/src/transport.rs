use async_trait::async_trait;

use crate::error::ClientError;
use crate::request::{Request, Response};

/// Something that can carry a [`Request`] to the cloud API.
///
/// Implementations must only return `Ok` for 2xx responses.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: Request) -> Result<Response, ClientError>;
}
