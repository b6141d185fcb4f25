//! JSON requests to external services, retried with a [retry::Policy].

use crate::retry;
use bytes::Bytes;
use reqwest::{header::HeaderMap, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

const USER_AGENT: &str = concat!("bgt-booster/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur when sending a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to encode body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
}

impl Error {
    /// Returns the HTTP status, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Whether a non-success status is worth retrying.
fn retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Shared HTTP client.
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
    policy: retry::Policy,
}

impl Client {
    pub fn new(policy: retry::Policy) -> Self {
        Self {
            inner: reqwest::Client::new(),
            policy,
        }
    }

    /// Sends a `GET` with `query` appended (percent-encoded) and returns the response body.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Bytes, Error> {
        self.send(Method::GET, url, query, headers, None).await
    }

    /// Sends `body` as JSON with a `POST` and returns the response body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<Bytes, Error> {
        let body = Bytes::from(serde_json::to_vec(body)?);
        self.send(Method::POST, url, &[], headers, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<Bytes, Error> {
        let headers = build_headers(url, headers)?;
        self.policy
            .retry(|| {
                let mut request = self
                    .inner
                    .request(method.clone(), url)
                    .query(query)
                    .headers(headers.clone());
                if let Some(body) = &body {
                    request = request.body(body.clone());
                }
                let method = method.clone();
                async move {
                    let response = request.send().await.map_err(|source| {
                        let permanent = source.is_builder();
                        let err = Error::Transport {
                            url: url.to_string(),
                            source,
                        };
                        if permanent {
                            retry::Error::Permanent(err)
                        } else {
                            retry::Error::Transient(err)
                        }
                    })?;
                    let status = response.status();
                    let bytes = response.bytes().await.map_err(|source| Error::Transport {
                        url: url.to_string(),
                        source,
                    })?;
                    if status.is_success() {
                        return Ok(bytes);
                    }
                    let err = Error::Status {
                        method,
                        url: url.to_string(),
                        status,
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                    };
                    if retryable(status) {
                        Err(retry::Error::Transient(err))
                    } else {
                        Err(retry::Error::Permanent(err))
                    }
                }
            })
            .await
    }
}

fn build_headers(url: &str, extra: &[(&str, &str)]) -> Result<HeaderMap, Error> {
    let defaults = [
        ("accept", "application/json"),
        ("content-type", "application/json"),
        ("user-agent", USER_AGENT),
    ];
    let mut headers = HeaderMap::new();
    for (name, value) in defaults.iter().chain(extra.iter()) {
        let invalid = |reason: String| Error::InvalidRequest {
            url: url.to_string(),
            reason,
        };
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let value =
            reqwest::header::HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
