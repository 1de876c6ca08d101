//! The seam between request generation and the network.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::generator::CacheRequest;

/// The logical name requests are aggregated under in statistics.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RequestName {
    /// `POST /put`
    Put,
    /// `GET /get`
    Get,
}

impl RequestName {
    /// The request path, which doubles as the display name.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestName::Put => "/put",
            RequestName::Get => "/get",
        }
    }
}

impl fmt::Display for RequestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request did not succeed.
///
/// The display form is the reason failures are grouped by in the report.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Failure {
    /// The server answered with a non-2xx status.
    #[error("status {0}")]
    Status(StatusCode),
    /// The request did not complete within the configured timeout.
    #[error("timeout")]
    Timeout,
    /// No connection could be established.
    #[error("connect")]
    Connect,
    /// Reading the response body failed.
    #[error("body")]
    Body,
    /// Any other error while building or sending the request.
    #[error("request")]
    Request,
}

/// The result of sending one request.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Which kind of request was sent.
    pub name: RequestName,
    /// Time from sending the request until the response body was read.
    pub elapsed: Duration,
    /// Size of the request body.
    pub bytes_sent: u64,
    /// Size of the response body.
    pub bytes_received: u64,
    /// `Ok` for 2xx responses.
    pub result: Result<(), Failure>,
}

impl Outcome {
    /// Returns `true` if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends cache requests somewhere.
///
/// Implementations own everything network related: connection pooling, timeouts and timing. They
/// must not retry.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a single request and reports how it went.
    async fn send(&self, request: CacheRequest<'_>) -> Outcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: CacheRequest<'_>) -> Outcome {
        (**self).send(request).await
    }
}
