//! Contains the transport sending cache requests over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url, header};
use serde::Serialize;
use thiserror::Error;

use crate::generator::CacheRequest;
use crate::transport::{Failure, Outcome, Transport};

/// Errors raised while setting up the [`HttpTransport`].
#[derive(Debug, Error)]
pub enum HttpError {
    /// The host is not an absolute `http` or `https` URL.
    #[error("invalid host `{0}`: {1}")]
    InvalidHost(String, String),
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct PutBody<'a> {
    key: &'a str,
    value: &'a str,
}

/// Sends requests to a cache service over HTTP.
///
/// All virtual users share one instance and therefore one connection pool.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    put_url: Url,
    get_url: Url,
}

impl HttpTransport {
    /// Creates a transport for the cache at `host`, e.g. `http://localhost:7171`.
    ///
    /// Requests exceeding `timeout` count as failed. Without a timeout, requests wait for as long
    /// as the server takes.
    pub fn new(host: &str, timeout: Option<Duration>) -> Result<Self, HttpError> {
        let base = parse_host(host)?;
        let endpoint = |path: &str| {
            format!("{}/{path}", base.as_str().trim_end_matches('/'))
                .parse::<Url>()
                .map_err(|err| HttpError::InvalidHost(host.to_owned(), err.to_string()))
        };

        let mut builder =
            Client::builder().user_agent(concat!("cacheload/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            put_url: endpoint("put")?,
            get_url: endpoint("get")?,
        })
    }

    fn build(&self, request: CacheRequest<'_>) -> Result<(RequestBuilder, u64), Failure> {
        match request {
            CacheRequest::Put { key, value } => {
                let body =
                    serde_json::to_vec(&PutBody { key, value }).map_err(|_| Failure::Request)?;
                let len = body.len() as u64;
                let builder = self
                    .client
                    .post(self.put_url.clone())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body);
                Ok((builder, len))
            }
            CacheRequest::Get { key } => {
                let builder = self.client.get(self.get_url.clone()).query(&[("key", key)]);
                Ok((builder, 0))
            }
        }
    }

    async fn execute(builder: RequestBuilder) -> (u64, Result<(), Failure>) {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return (0, Err(err.into())),
        };

        let status = response.status();
        // always drain the body so the connection goes back into the pool
        let received = match response.bytes().await {
            Ok(body) => body.len() as u64,
            Err(err) => return (0, Err(err.into())),
        };

        if status.is_success() {
            (received, Ok(()))
        } else {
            (received, Err(Failure::Status(status)))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: CacheRequest<'_>) -> Outcome {
        let name = request.name();
        let start = Instant::now();

        let (bytes_sent, bytes_received, result) = match self.build(request) {
            Ok((builder, bytes_sent)) => {
                let (bytes_received, result) = Self::execute(builder).await;
                (bytes_sent, bytes_received, result)
            }
            Err(failure) => (0, 0, Err(failure)),
        };

        Outcome {
            name,
            elapsed: start.elapsed(),
            bytes_sent,
            bytes_received,
            result,
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Failure::Timeout
        } else if err.is_connect() {
            Failure::Connect
        } else if err.is_body() || err.is_decode() {
            Failure::Body
        } else {
            Failure::Request
        }
    }
}

/// Parses and checks the base URL of the cache service.
pub fn parse_host(host: &str) -> Result<Url, HttpError> {
    let url = Url::parse(host)
        .map_err(|err| HttpError::InvalidHost(host.to_owned(), err.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpError::InvalidHost(
            host.to_owned(),
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(HttpError::InvalidHost(host.to_owned(), "missing host".to_owned()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_paths() {
        let transport = HttpTransport::new("http://localhost:7171", None).unwrap();
        assert_eq!(transport.put_url.as_str(), "http://localhost:7171/put");
        assert_eq!(transport.get_url.as_str(), "http://localhost:7171/get");

        let transport = HttpTransport::new("http://cache.internal/v1/", None).unwrap();
        assert_eq!(transport.put_url.as_str(), "http://cache.internal/v1/put");
        assert_eq!(transport.get_url.as_str(), "http://cache.internal/v1/get");
    }

    #[test]
    fn rejects_bad_hosts() {
        for host in ["", "localhost:7171", "ftp://localhost", "not a url"] {
            assert!(
                matches!(parse_host(host), Err(HttpError::InvalidHost(..))),
                "{host} should be rejected"
            );
        }
    }

    #[test]
    fn get_request_encodes_key() {
        let transport = HttpTransport::new("http://localhost:7171", None).unwrap();
        let (builder, sent) = transport.build(CacheRequest::Get { key: "a b&c" }).unwrap();
        let request = builder.build().unwrap();

        assert_eq!(sent, 0);
        assert_eq!(*request.method(), reqwest::Method::GET);
        assert_eq!(request.url().as_str(), "http://localhost:7171/get?key=a+b%26c");
    }

    #[test]
    fn put_request_has_json_body() {
        let transport = HttpTransport::new("http://localhost:7171", None).unwrap();
        let (builder, sent) = transport
            .build(CacheRequest::Put {
                key: "k",
                value: "v\n",
            })
            .unwrap();
        let request = builder.build().unwrap();

        assert_eq!(*request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "http://localhost:7171/put");
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/json");

        let body = request.body().and_then(|body| body.as_bytes()).unwrap();
        assert_eq!(sent, body.len() as u64);
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, serde_json::json!({"key": "k", "value": "v\n"}));
    }
}
