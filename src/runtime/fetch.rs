//! Global `fetch` primitive
//!
//! Application code calls [`fetch`], which dispatches through whatever
//! implementation currently occupies the process-wide slot. Replacing the slot
//! ([`install_fetch`]) is how interceptors hook in.

use crate::runtime::body::{with_content_type, RequestBody};
use crate::runtime::transport::{default_transport, HttpRequest, Transport, TransportError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, Method};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Arguments of a `fetch` call
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    /// Defaults to `GET` when absent
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some(method.to_string()),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Upper-cased method, `GET` when none was given
    pub fn effective_method(&self) -> String {
        self.method
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_else(|| "GET".to_string())
    }
}

/// Settled `fetch` response. Bodies are reference-counted, so clones are
/// cheap and reading one clone never consumes another.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: u16,
    url: String,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, url: impl Into<String>, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    pub async fn text(&self) -> Result<String, TransportError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TransportError::Body(format!("response is not valid UTF-8: {}", e)))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Body(e.to_string()))
    }
}

pub trait FetchPrimitive: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, TransportError>>;
}

impl<F, Fut> FetchPrimitive for F
where
    F: Fn(FetchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FetchResponse, TransportError>> + Send + 'static,
{
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, TransportError>> {
        self(request).boxed()
    }
}

/// The built-in `fetch`, running requests through a [`Transport`]
pub struct NativeFetch {
    transport: Arc<dyn Transport>,
}

impl NativeFetch {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl FetchPrimitive for NativeFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, TransportError>> {
        let transport = Arc::clone(&self.transport);
        async move {
            let method = Method::from_bytes(request.effective_method().as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let (headers, body) = match &request.body {
                Some(body) => {
                    let (bytes, content_type) = body.encode()?;
                    (with_content_type(request.headers, content_type), Some(bytes))
                }
                None => (request.headers, None),
            };

            let response = transport
                .execute(HttpRequest {
                    method,
                    url: request.url,
                    headers,
                    body,
                })
                .await?;
            Ok(FetchResponse::new(
                response.status,
                response.url,
                response.headers,
                response.body,
            ))
        }
        .boxed()
    }
}

static FETCH: Lazy<RwLock<Arc<dyn FetchPrimitive>>> =
    Lazy::new(|| RwLock::new(Arc::new(NativeFetch::new(default_transport()))));

/// The implementation currently behind [`fetch`]
pub fn installed_fetch() -> Arc<dyn FetchPrimitive> {
    Arc::clone(&FETCH.read().unwrap_or_else(PoisonError::into_inner))
}

/// Replace the global `fetch`, returning the previous implementation
pub fn install_fetch(fetch: Arc<dyn FetchPrimitive>) -> Arc<dyn FetchPrimitive> {
    let mut slot = FETCH.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, fetch)
}

/// Issue a request through the global `fetch`
pub async fn fetch(request: FetchRequest) -> Result<FetchResponse, TransportError> {
    let current = installed_fetch();
    current.fetch(request).await
}
