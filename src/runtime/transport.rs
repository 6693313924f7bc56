//! Network transport shared by every HTTP primitive.

use anyhow::Context;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, Method};
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure of the underlying call itself. The display text is what ends up
/// in a record's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// A request ready to go on the wire
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;
}

impl<F, Fut> Transport for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
{
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        self(request).boxed()
    }
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let client = self.client.clone();
        async move {
            let mut builder = client.request(request.method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let url = response.url().to_string();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok(HttpResponse {
                status,
                url,
                headers,
                body,
            })
        }
        .boxed()
    }
}

/// Stand-in used when the HTTP client could not be built; every call fails.
struct UnavailableTransport {
    reason: String,
}

impl Transport for UnavailableTransport {
    fn execute(&self, _request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let reason = self.reason.clone();
        async move { Err(TransportError::Network(reason)) }.boxed()
    }
}

static DEFAULT_TRANSPORT: Lazy<Arc<dyn Transport>> = Lazy::new(|| match ReqwestTransport::new() {
    Ok(transport) => Arc::new(transport),
    Err(e) => {
        tracing::error!("HTTP client unavailable: {:#}", e);
        Arc::new(UnavailableTransport {
            reason: format!("HTTP client unavailable: {:#}", e),
        })
    }
});

/// Transport used by primitives that were not given one explicitly
pub fn default_transport() -> Arc<dyn Transport> {
    Arc::clone(&DEFAULT_TRANSPORT)
}
