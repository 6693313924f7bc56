//! Axios-style HTTP client with request/response interceptor chains.

use crate::runtime::body::{with_content_type, RequestBody};
use crate::runtime::next_instance_id;
use crate::runtime::transport::{default_transport, HttpRequest, Transport};
use http::{Extensions, HeaderMap, Method};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Per-request configuration threaded through every interceptor.
///
/// `extensions` is carried unchanged from the request chain to the
/// response/error chain, so interceptors can correlate the two.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub method: Option<String>,
    pub url: String,
    pub base_url: Option<String>,
    pub headers: Vec<(String, String)>,
    pub data: Option<RequestBody>,
    pub extensions: Extensions,
}

impl RequestConfig {
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.to_string()),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<RequestBody>) -> Self {
        self.data = Some(data.into());
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

#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body, or the body text as a JSON string
    pub data: serde_json::Value,
    pub config: RequestConfig,
}

/// Failure of a client call: transport errors, non-2xx statuses, or an
/// interceptor rejecting the request.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub message: String,
    pub config: Option<RequestConfig>,
    /// Present when the server answered with an error status
    pub response: Option<ClientResponse>,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            config: None,
            response: None,
        }
    }
}

pub type RequestInterceptor =
    Arc<dyn Fn(RequestConfig) -> Result<RequestConfig, ClientError> + Send + Sync>;
pub type ResponseFulfilled =
    Arc<dyn Fn(ClientResponse) -> Result<ClientResponse, ClientError> + Send + Sync>;
pub type ResponseRejected =
    Arc<dyn Fn(ClientError) -> Result<ClientResponse, ClientError> + Send + Sync>;

#[derive(Default)]
pub struct RequestInterceptors {
    handlers: RwLock<Vec<RequestInterceptor>>,
}

impl RequestInterceptors {
    /// Register a request interceptor, returning its index
    pub fn use_interceptor<F>(&self, handler: F) -> usize
    where
        F: Fn(RequestConfig) -> Result<RequestConfig, ClientError> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.push(Arc::new(handler));
        handlers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<RequestInterceptor> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Default)]
pub struct ResponseInterceptors {
    handlers: RwLock<Vec<(Option<ResponseFulfilled>, Option<ResponseRejected>)>>,
}

impl ResponseInterceptors {
    /// Register a fulfilled/rejected pair, returning its index
    pub fn use_interceptor(
        &self,
        on_fulfilled: Option<ResponseFulfilled>,
        on_rejected: Option<ResponseRejected>,
    ) -> usize {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.push((on_fulfilled, on_rejected));
        handlers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(Option<ResponseFulfilled>, Option<ResponseRejected>)> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Default)]
pub struct Interceptors {
    pub request: RequestInterceptors,
    pub response: ResponseInterceptors,
}

/// Anything that can carry request/response interceptors.
///
/// Implementors without interceptor support return `None` and are left alone.
pub trait InterceptorHost {
    fn instance_id(&self) -> u64;

    fn base_url(&self) -> Option<&str> {
        None
    }

    fn interceptors(&self) -> Option<&Interceptors> {
        None
    }
}

/// Join a base URL and a relative path without doubling slashes.
/// Absolute URLs are returned unchanged.
pub fn combine_urls(base: &str, url: &str) -> String {
    if url.contains("://") || base.is_empty() {
        return url.to_string();
    }
    if url.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

pub struct ApiClient {
    id: u64,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
    interceptors: Interceptors,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self::with_transport(default_transport())
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: next_instance_id(),
            base_url: None,
            headers: Vec::new(),
            transport,
            interceptors: Interceptors::default(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Default header sent with every request unless the request overrides it
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    pub async fn get(&self, url: &str) -> Result<ClientResponse, ClientError> {
        self.request(RequestConfig::new("GET", url)).await
    }

    pub async fn post(
        &self,
        url: &str,
        data: impl Into<RequestBody>,
    ) -> Result<ClientResponse, ClientError> {
        self.request(RequestConfig::new("POST", url).data(data)).await
    }

    /// Run the request chain, the call itself, then the response chain
    pub async fn request(&self, config: RequestConfig) -> Result<ClientResponse, ClientError> {
        let config = self.with_defaults(config);

        let mut outgoing = Ok(config);
        for handler in self.interceptors.request.snapshot() {
            outgoing = outgoing.and_then(|config| handler(config));
        }

        let mut result = match outgoing {
            Ok(config) => self.dispatch(config).await,
            Err(e) => Err(e),
        };

        for (on_fulfilled, on_rejected) in self.interceptors.response.snapshot() {
            result = match result {
                Ok(response) => match on_fulfilled {
                    Some(handler) => handler(response),
                    None => Ok(response),
                },
                Err(error) => match on_rejected {
                    Some(handler) => handler(error),
                    None => Err(error),
                },
            };
        }
        result
    }

    fn with_defaults(&self, mut config: RequestConfig) -> RequestConfig {
        if config.base_url.is_none() {
            config.base_url = self.base_url.clone();
        }
        for (name, value) in &self.headers {
            if !config
                .headers
                .iter()
                .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                config.headers.push((name.clone(), value.clone()));
            }
        }
        config
    }

    async fn dispatch(&self, config: RequestConfig) -> Result<ClientResponse, ClientError> {
        let fail = |message: String, config: &RequestConfig| ClientError {
            message,
            config: Some(config.clone()),
            response: None,
        };

        let method = match Method::from_bytes(config.effective_method().as_bytes()) {
            Ok(method) => method,
            Err(e) => return Err(fail(e.to_string(), &config)),
        };
        let url = match &config.base_url {
            Some(base) => combine_urls(base, &config.url),
            None => config.url.clone(),
        };
        let (headers, body) = match &config.data {
            Some(data) => match data.encode() {
                Ok((bytes, content_type)) => {
                    (with_content_type(config.headers.clone(), content_type), Some(bytes))
                }
                Err(e) => return Err(fail(e.to_string(), &config)),
            },
            None => (config.headers.clone(), None),
        };

        let response = match self
            .transport
            .execute(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(fail(e.to_string(), &config)),
        };

        let data = serde_json::from_slice(&response.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&response.body).into_owned())
        });
        let status = response.status;
        let response = ClientResponse {
            status,
            headers: response.headers,
            data,
            config: config.clone(),
        };
        if (200..300).contains(&status) {
            Ok(response)
        } else {
            Err(ClientError {
                message: format!("Request failed with status code {}", status),
                config: Some(config),
                response: Some(response),
            })
        }
    }
}

impl InterceptorHost for ApiClient {
    fn instance_id(&self) -> u64 {
        self.id
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn interceptors(&self) -> Option<&Interceptors> {
        Some(&self.interceptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::transport::{HttpResponse, TransportError};
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    fn respond(status: u16, body: &'static str) -> Arc<dyn Transport> {
        Arc::new(move |request: HttpRequest| async move {
            Ok::<_, TransportError>(HttpResponse {
                status,
                url: request.url,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body.as_bytes()),
            })
        })
    }

    #[derive(Clone)]
    struct Tag(&'static str);

    #[test]
    fn combine_urls_avoids_double_slashes() {
        assert_eq!(
            combine_urls("https://api.example.com/", "/users"),
            "https://api.example.com/users"
        );
        assert_eq!(
            combine_urls("https://api.example.com/v1", "users"),
            "https://api.example.com/v1/users"
        );
        assert_eq!(
            combine_urls("https://api.example.com", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
        assert_eq!(combine_urls("https://api.example.com", ""), "https://api.example.com");
    }

    #[tokio::test]
    async fn successful_request_parses_json_data() {
        let client = ApiClient::with_transport(respond(200, r#"{"id":1}"#))
            .base_url("https://api.example.com");
        let response = client.get("/users/1").await.expect("request succeeds");
        assert_eq!(response.status, 200);
        assert_eq!(response.data, json!({ "id": 1 }));
        assert_eq!(response.config.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[tokio::test]
    async fn error_status_rejects_with_response() {
        let client = ApiClient::with_transport(respond(404, "not here"));
        let err = client.get("https://api.example.com/missing").await.unwrap_err();
        assert_eq!(err.message, "Request failed with status code 404");
        let response = err.response.expect("response attached");
        assert_eq!(response.status, 404);
        assert_eq!(response.data, json!("not here"));
    }

    #[tokio::test]
    async fn extensions_survive_the_interceptor_round_trip() {
        let client = ApiClient::with_transport(respond(200, "{}"));
        client.interceptors().request.use_interceptor(|mut config| {
            config.extensions.insert(Tag("traced"));
            Ok(config)
        });
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        client.interceptors().response.use_interceptor(
            Some(Arc::new(move |response: ClientResponse| {
                *sink.lock().unwrap() = response.config.extensions.get::<Tag>().map(|t| t.0);
                Ok(response)
            })),
            None,
        );

        client.get("https://api.example.com").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some("traced"));
    }

    #[tokio::test]
    async fn rejected_handler_sees_transport_errors() {
        let transport: Arc<dyn Transport> = Arc::new(|_request: HttpRequest| async {
            Err::<HttpResponse, _>(TransportError::Network("Network Error".into()))
        });
        let client = ApiClient::with_transport(transport);
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        client.interceptors().response.use_interceptor(
            None,
            Some(Arc::new(move |error: ClientError| {
                *counter.lock().unwrap() += 1;
                Err::<ClientResponse, _>(error)
            })),
        );

        let err = client.get("https://api.example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "Network Error");
        assert!(err.response.is_none());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn default_headers_do_not_override_request_headers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let transport: Arc<dyn Transport> = Arc::new(move |request: HttpRequest| {
            *sink.lock().unwrap() = request.headers.clone();
            async move {
                Ok::<_, TransportError>(HttpResponse {
                    status: 204,
                    url: request.url,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                })
            }
        });
        let client = ApiClient::with_transport(transport)
            .default_header("Accept", "application/json")
            .default_header("X-App", "demo");
        client
            .request(RequestConfig::new("GET", "https://api.example.com").header("accept", "text/plain"))
            .await
            .unwrap();

        let headers = seen.lock().unwrap().clone();
        assert!(headers.contains(&("accept".to_string(), "text/plain".to_string())));
        assert!(headers.contains(&("X-App".to_string(), "demo".to_string())));
        assert_eq!(headers.len(), 2);
    }
}
