//! Single network calls with uniform retry semantics.
//!
//! A [`Transport`] performs exactly one request and decodes the JSON body.
//! [`HttpTransport`] is the `reqwest` implementation; tests substitute
//! scripted transports. [`Fetcher`] layers shape checks and a
//! [`RetryPolicy`] on top.
//!
//! # Retry Strategy
//!
//! Every failure (network, HTTP status, undecodable or mis-shaped body) is
//! treated the same way: wait a fixed delay, then try again. The loop is
//! explicit and bounded by `max_retries`; once exhausted the caller receives
//! [`FetchError::MaxRetriesExceeded`] wrapping the last error. A policy with
//! `max_retries = None` never gives up.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::models::RawRecord;

/// HTTP method of a [`Request`]; `Post` carries the JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Get,
    Post(Value),
}

/// One logical API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post(body),
            url: url.into(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            Method::Get => write!(f, "GET {}", self.url),
            Method::Post(_) => write!(f, "POST {}", self.url),
        }
    }
}

/// Performs one request and returns the decoded JSON body.
///
/// Implementations must not retry; retrying is the [`Fetcher`]'s job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Value, FetchError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Value, FetchError> {
        let url = request.url.as_str();
        let builder = match &request.method {
            Method::Get => self.client.get(url),
            Method::Post(body) => self.client.post(url).json(body),
        };

        let transport_err = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = builder
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport_err)?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Fixed-delay retry with an optional ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: Option<u32>,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: Option<u32>, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// No retries at all: the first failure is terminal.
    pub fn none() -> Self {
        Self::new(Some(0), Duration::ZERO)
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the policy is exhausted.
    ///
    /// `op` is re-invoked from scratch on each attempt, so a multi-call
    /// sequence passed here restarts from its first call.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retries: u32 = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let Some(max) = self.max_retries {
                if retries >= max {
                    return Err(FetchError::MaxRetriesExceeded {
                        what: what.to_string(),
                        attempts: retries + 1,
                        last: Box::new(err),
                    });
                }
            }

            retries += 1;
            warn!(
                what,
                retry = retries,
                delay_secs = self.delay.as_secs(),
                error = %err,
                "fetch failed, retrying"
            );
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
    }
}

/// A listing response: the item array plus the rest of the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub items: Vec<Value>,
    /// Envelope fields other than the item array (facets, totals, ...).
    pub envelope: RawRecord,
}

/// Shape-aware fetch entry point shared by all paginator calls.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One attempt, expecting a JSON object. Never retries.
    pub async fn attempt_object(&self, request: &Request) -> Result<RawRecord, FetchError> {
        debug!(%request, "fetching");
        let body = self.transport.send(request).await?;
        into_object(&request.url, body)
    }

    /// One attempt, expecting an envelope whose `field` is an array.
    pub async fn attempt_listing(
        &self,
        request: &Request,
        field: &str,
    ) -> Result<Listing, FetchError> {
        let envelope = self.attempt_object(request).await?;
        into_listing(&request.url, envelope, field)
    }

    /// Fetch a single object, retrying per policy.
    pub async fn fetch_object(&self, request: &Request) -> Result<RawRecord, FetchError> {
        let what = request.to_string();
        self.policy
            .run(&what, || self.attempt_object(request))
            .await
    }

    /// Fetch a listing, retrying per policy.
    pub async fn fetch_listing(&self, request: &Request, field: &str) -> Result<Listing, FetchError> {
        let what = request.to_string();
        self.policy
            .run(&what, || self.attempt_listing(request, field))
            .await
    }
}

fn into_object(url: &str, body: Value) -> Result<RawRecord, FetchError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(FetchError::Shape {
            url: url.to_string(),
            expected: "a JSON object".to_string(),
        }),
    }
}

fn into_listing(url: &str, mut envelope: RawRecord, field: &str) -> Result<Listing, FetchError> {
    let items = match envelope.shift_remove(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(FetchError::Shape {
                url: url.to_string(),
                expected: format!("an array in field '{}'", field),
            })
        }
    };
    Ok(Listing { items, envelope })
}
