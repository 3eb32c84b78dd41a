//! Raw API responses
//!
//! The client never interprets response bodies; merging the batches of one
//! retrieval into a dataset is the caller's job. [`ApiResponse`] keeps what
//! is needed for that: the resource path that produced it, the status and
//! the body bytes.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};

/// One successful response from the API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    resource: String,
    status: u16,
    body: Bytes,
}

impl ApiResponse {
    /// Create a response record
    pub fn new(resource: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            resource: resource.into(),
            status,
            body: body.into(),
        }
    }

    /// Resource path, including the encoded query, that was requested
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw body bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text
    pub fn text(&self) -> ClientResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ClientError::Decode(format!("body of {} is not UTF-8: {e}", self.resource)))
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ClientError::Decode(format!("failed to deserialize {}: {e}", self.resource))
        })
    }
}
