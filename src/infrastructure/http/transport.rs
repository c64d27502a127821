//! `reqwest` implementation of the transport port.

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, trace, warn};

use crate::domain::errors::{CacheError, CacheResult, TransportError};
use crate::domain::ports::{TransportPort, TransportRequest, TransportResponse};

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("pixfetch/", env!("CARGO_PKG_VERSION"));

/// Issues image requests over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::NetworkError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl TransportPort for HttpTransport {
    async fn fetch(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::request(format!("invalid method {}: {e}", request.method)))?;

        let builder = request
            .headers
            .iter()
            .fold(self.client.request(method, &request.url), |builder, (name, value)| {
                builder.header(name.as_str(), value.as_str())
            });

        trace!(url = %request.url, "Sending request");
        let response = builder.send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| classify(&e))?;
        debug!(url = %request.url, status, size = body.len(), "Response received");

        if body.is_empty() {
            Ok(TransportResponse::empty(status))
        } else {
            Ok(TransportResponse::new(status, body))
        }
    }
}

fn classify(err: &reqwest::Error) -> TransportError {
    if is_connection_lost(err) {
        warn!(error = %err, "Connection lost");
        TransportError::connection_lost(err.to_string())
    } else if err.is_timeout() {
        TransportError::request("request timed out")
    } else if err.is_connect() {
        TransportError::request(format!("failed to connect: {err}"))
    } else {
        TransportError::request(err.to_string())
    }
}

/// Walks the source chain looking for an I/O error that means the peer
/// dropped an established connection.
fn is_connection_lost(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}
