//! Port definition for the network transport.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::TransportError;

/// A fully formed request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    /// Creates a GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What the transport received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, `None` when the server sent nothing.
    pub body: Option<Bytes>,
}

impl TransportResponse {
    /// Creates a response with a body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: Some(body.into()),
        }
    }

    /// Creates a response without a body.
    #[must_use]
    pub const fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Returns true for statuses in [200, 399].
    #[must_use]
    pub const fn is_acceptable_status(&self) -> bool {
        self.status >= 200 && self.status <= 399
    }
}

/// Port for issuing network requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Performs the request, following redirects.
    async fn fetch(&self, request: &TransportRequest)
    -> Result<TransportResponse, TransportError>;
}
