//! Event-driven `XMLHttpRequest` primitive
//!
//! Every [`XmlHttpRequest`] routes `open`, `set_request_header` and `send`
//! through the process-wide [`XhrPrototype`]. Each of the three handles can be
//! replaced independently, which is how interceptors observe XHR traffic
//! without changing what callers see.

use crate::runtime::body::{with_content_type, Blob, RequestBody};
use crate::runtime::next_instance_id;
use crate::runtime::transport::{default_transport, HttpRequest, HttpResponse, Transport, TransportError};
use bytes::Bytes;
use http::{HeaderMap, Method};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

pub const UNSENT: u8 = 0;
pub const OPENED: u8 = 1;
pub const HEADERS_RECEIVED: u8 = 2;
pub const LOADING: u8 = 3;
pub const DONE: u8 = 4;

/// How the response body is exposed through [`XmlHttpRequest::response`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Text,
    Json,
    Blob,
    ArrayBuffer,
    Document,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::Json => "json",
            ResponseType::Blob => "blob",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Document => "document",
        }
    }
}

/// Decoded response body, shaped by the response type
#[derive(Debug, Clone, PartialEq)]
pub enum XhrResponse {
    Text(String),
    /// `None` when the body was not valid JSON
    Json(Option<serde_json::Value>),
    Blob(Blob),
    ArrayBuffer(Bytes),
    Document(String),
}

pub type ReadyStateHandler = Arc<dyn Fn(&XmlHttpRequest) + Send + Sync>;

pub type OpenFn = Arc<dyn Fn(&XmlHttpRequest, &str, &str) + Send + Sync>;
pub type SetRequestHeaderFn = Arc<dyn Fn(&XmlHttpRequest, &str, &str) + Send + Sync>;
pub type SendFn = Arc<dyn Fn(&XmlHttpRequest, Option<RequestBody>) + Send + Sync>;

/// The shared method table behind every XHR instance
#[derive(Clone)]
pub struct XhrPrototype {
    pub open: OpenFn,
    pub set_request_header: SetRequestHeaderFn,
    pub send: SendFn,
}

impl XhrPrototype {
    /// The built-in implementations
    pub fn native() -> Self {
        Self {
            open: Arc::new(native_open),
            set_request_header: Arc::new(native_set_request_header),
            send: Arc::new(native_send),
        }
    }
}

static PROTOTYPE: Lazy<RwLock<XhrPrototype>> = Lazy::new(|| RwLock::new(XhrPrototype::native()));

/// Current method table
pub fn prototype() -> XhrPrototype {
    PROTOTYPE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the method table, returning the previous one
pub fn install_prototype(prototype: XhrPrototype) -> XhrPrototype {
    let mut slot = PROTOTYPE.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, prototype)
}

#[derive(Default)]
struct XhrState {
    method: Option<Method>,
    url: String,
    request_headers: Vec<(String, String)>,
    ready_state: u8,
    /// Set by `send`, cleared by `open` and on completion
    sent: bool,
    status: u16,
    response_type: ResponseType,
    response_headers: HeaderMap,
    response_body: Bytes,
    network_error: Option<String>,
    on_ready_state_change: Option<ReadyStateHandler>,
}

struct XhrInner {
    id: u64,
    transport: Arc<dyn Transport>,
    state: Mutex<XhrState>,
}

/// A single XHR instance. Clones share the same underlying request.
#[derive(Clone)]
pub struct XmlHttpRequest {
    inner: Arc<XhrInner>,
}

impl Default for XmlHttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlHttpRequest {
    pub fn new() -> Self {
        Self::with_transport(default_transport())
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(XhrInner {
                id: next_instance_id(),
                transport,
                state: Mutex::new(XhrState::default()),
            }),
        }
    }

    /// Process-unique identity of this instance
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A handle that does not keep the instance alive
    pub fn downgrade(&self) -> WeakXmlHttpRequest {
        WeakXmlHttpRequest(Arc::downgrade(&self.inner))
    }

    fn state(&self) -> MutexGuard<'_, XhrState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, method: &str, url: &str) {
        let open = prototype().open;
        open(self, method, url);
    }

    pub fn set_request_header(&self, name: &str, value: &str) {
        let set_request_header = prototype().set_request_header;
        set_request_header(self, name, value);
    }

    pub fn send(&self, body: Option<RequestBody>) {
        let send = prototype().send;
        send(self, body);
    }

    pub fn ready_state(&self) -> u8 {
        self.state().ready_state
    }

    /// HTTP status; 0 until headers arrive or after a network failure
    pub fn status(&self) -> u16 {
        self.state().status
    }

    pub fn response_type(&self) -> ResponseType {
        self.state().response_type
    }

    pub fn set_response_type(&self, response_type: ResponseType) {
        self.state().response_type = response_type;
    }

    /// Transport failure message, if the request failed below HTTP
    pub fn network_error(&self) -> Option<String> {
        self.state().network_error.clone()
    }

    pub fn on_ready_state_change(&self) -> Option<ReadyStateHandler> {
        self.state().on_ready_state_change.clone()
    }

    pub fn set_on_ready_state_change<F>(&self, handler: F)
    where
        F: Fn(&XmlHttpRequest) + Send + Sync + 'static,
    {
        self.state().on_ready_state_change = Some(Arc::new(handler));
    }

    /// Response body as text; only available for the text response type
    pub fn response_text(&self) -> Option<String> {
        let state = self.state();
        if state.ready_state < LOADING || state.response_type != ResponseType::Text {
            return None;
        }
        Some(String::from_utf8_lossy(&state.response_body).into_owned())
    }

    /// Response body shaped by the response type, once the request is done
    pub fn response(&self) -> Option<XhrResponse> {
        let state = self.state();
        if state.ready_state != DONE || state.network_error.is_some() {
            return None;
        }
        let body = state.response_body.clone();
        let response = match state.response_type {
            ResponseType::Text => XhrResponse::Text(String::from_utf8_lossy(&body).into_owned()),
            ResponseType::Json => XhrResponse::Json(serde_json::from_slice(&body).ok()),
            ResponseType::Blob => {
                let mime = state
                    .response_headers
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                XhrResponse::Blob(Blob::new(body, mime))
            }
            ResponseType::ArrayBuffer => XhrResponse::ArrayBuffer(body),
            ResponseType::Document => {
                XhrResponse::Document(String::from_utf8_lossy(&body).into_owned())
            }
        };
        Some(response)
    }

    /// Raw response header block, one `name: value` per CRLF-terminated line
    pub fn all_response_headers(&self) -> String {
        let state = self.state();
        if state.ready_state < HEADERS_RECEIVED {
            return String::new();
        }
        state
            .response_headers
            .iter()
            .map(|(name, value)| {
                format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()))
            })
            .collect()
    }

    fn set_ready_state(&self, ready_state: u8) {
        let handler = {
            let mut state = self.state();
            state.ready_state = ready_state;
            state.on_ready_state_change.clone()
        };
        if let Some(handler) = handler {
            handler(self);
        }
    }

    fn finish(&self, result: Result<HttpResponse, TransportError>) {
        match result {
            Ok(response) => {
                {
                    let mut state = self.state();
                    state.sent = false;
                    state.status = response.status;
                    state.response_headers = response.headers;
                    state.response_body = response.body;
                }
                self.set_ready_state(HEADERS_RECEIVED);
                self.set_ready_state(DONE);
            }
            Err(e) => {
                {
                    let mut state = self.state();
                    state.sent = false;
                    state.status = 0;
                    state.network_error = Some(e.to_string());
                }
                self.set_ready_state(DONE);
            }
        }
    }
}

/// Weak counterpart of [`XmlHttpRequest`]
#[derive(Clone)]
pub struct WeakXmlHttpRequest(Weak<XhrInner>);

impl WeakXmlHttpRequest {
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<XmlHttpRequest> {
        self.0.upgrade().map(|inner| XmlHttpRequest { inner })
    }
}

impl std::fmt::Debug for WeakXmlHttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakXmlHttpRequest")
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn native_open(xhr: &XmlHttpRequest, method: &str, url: &str) {
    {
        let mut state = xhr.state();
        state.method = Method::from_bytes(method.to_uppercase().as_bytes()).ok();
        state.url = url.to_string();
        state.request_headers.clear();
        state.sent = false;
        state.status = 0;
        state.response_headers = HeaderMap::new();
        state.response_body = Bytes::new();
        state.network_error = None;
    }
    xhr.set_ready_state(OPENED);
}

fn native_set_request_header(xhr: &XmlHttpRequest, name: &str, value: &str) {
    let mut state = xhr.state();
    if state.ready_state != OPENED || state.sent {
        tracing::warn!(name, "set_request_header called outside the OPENED state");
        return;
    }
    state.request_headers.push((name.to_string(), value.to_string()));
}

fn native_send(xhr: &XmlHttpRequest, body: Option<RequestBody>) {
    let prepared = {
        let mut state = xhr.state();
        if state.ready_state != OPENED || state.sent {
            tracing::warn!("send called outside the OPENED state or twice");
            return;
        }
        state.sent = true;
        build_request(&state, body)
    };

    let request = match prepared {
        Ok(request) => request,
        Err(e) => {
            xhr.finish(Err(e));
            return;
        }
    };

    let transport = Arc::clone(&xhr.inner.transport);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let xhr = xhr.clone();
            handle.spawn(async move {
                let result = transport.execute(request).await;
                xhr.finish(result);
            });
        }
        Err(_) => xhr.finish(Err(TransportError::Network(
            "no async runtime available to send the request".to_string(),
        ))),
    }
}

fn build_request(state: &XhrState, body: Option<RequestBody>) -> Result<HttpRequest, TransportError> {
    let method = state
        .method
        .clone()
        .ok_or_else(|| TransportError::InvalidRequest("invalid HTTP method".to_string()))?;
    let headers = state.request_headers.clone();
    let (headers, body) = match body {
        // Bodies are ignored for GET/HEAD, as browsers do
        Some(body) if method != Method::GET && method != Method::HEAD => {
            let (bytes, content_type) = body.encode()?;
            (with_content_type(headers, content_type), Some(bytes))
        }
        _ => (headers, None),
    };
    Ok(HttpRequest {
        method,
        url: state.url.clone(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serial_test::serial;
    use tokio::sync::mpsc;

    fn echo_transport(status: u16, content_type: &'static str, body: &'static [u8]) -> Arc<dyn Transport> {
        Arc::new(move |request: HttpRequest| async move {
            let mut headers = HeaderMap::new();
            headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            Ok::<_, TransportError>(HttpResponse {
                status,
                url: request.url,
                headers,
                body: Bytes::from_static(body),
            })
        })
    }

    async fn run(xhr: &XmlHttpRequest, body: Option<RequestBody>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(body);
        rx.recv().await.expect("request completes");
    }

    #[tokio::test]
    #[serial]
    async fn native_xhr_reaches_done_with_text_response() {
        let xhr = XmlHttpRequest::with_transport(echo_transport(200, "application/json", b"{\"ok\":true}"));
        xhr.open("get", "https://api.example.com/status");
        assert_eq!(xhr.ready_state(), OPENED);
        xhr.set_request_header("Accept", "application/json");

        run(&xhr, None).await;

        assert_eq!(xhr.status(), 200);
        assert_eq!(xhr.response_text().as_deref(), Some("{\"ok\":true}"));
        assert_eq!(
            xhr.all_response_headers(),
            "content-type: application/json\r\n"
        );
        assert!(xhr.network_error().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn blob_response_type_exposes_blob() {
        let xhr = XmlHttpRequest::with_transport(echo_transport(200, "image/png", b"\x89PNG"));
        xhr.open("GET", "https://cdn.example.com/logo.png");
        xhr.set_response_type(ResponseType::Blob);
        run(&xhr, None).await;

        assert_eq!(xhr.response_text(), None);
        match xhr.response() {
            Some(XhrResponse::Blob(blob)) => {
                assert_eq!(blob.size(), 4);
                assert_eq!(blob.mime(), "image/png");
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn network_failure_finishes_with_status_zero() {
        let transport: Arc<dyn Transport> = Arc::new(|_request: HttpRequest| async {
            Err::<HttpResponse, _>(TransportError::Network("Network request failed".into()))
        });
        let xhr = XmlHttpRequest::with_transport(transport);
        xhr.open("POST", "https://api.example.com/users");
        run(&xhr, Some(RequestBody::from("{}"))).await;

        assert_eq!(xhr.ready_state(), DONE);
        assert_eq!(xhr.status(), 0);
        assert_eq!(xhr.network_error().as_deref(), Some("Network request failed"));
        assert!(xhr.response().is_none());
    }

    #[test]
    #[serial]
    fn send_before_open_is_ignored() {
        let xhr = XmlHttpRequest::with_transport(echo_transport(200, "text/plain", b""));
        xhr.send(None);
        assert_eq!(xhr.ready_state(), UNSENT);
    }

    #[tokio::test]
    #[serial]
    async fn second_send_before_completion_is_refused() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport: Arc<dyn Transport> = Arc::new(move |request: HttpRequest| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok::<_, TransportError>(HttpResponse {
                    status: 200,
                    url: request.url,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                })
            }
        });
        let xhr = XmlHttpRequest::with_transport(transport);
        xhr.open("GET", "https://api.example.com/once");
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(None);
        xhr.send(None);
        xhr.set_request_header("X-Late", "1");
        rx.recv().await.expect("request completes");

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(xhr.status(), 200);

        // A fresh open allows another send
        xhr.open("GET", "https://api.example.com/again");
        xhr.send(None);
        rx.recv().await.expect("second request completes");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn weak_handles_track_liveness() {
        let xhr = XmlHttpRequest::new();
        let weak = xhr.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade().map(|x| x.id()), Some(xhr.id()));
        drop(xhr);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn instances_have_distinct_ids() {
        let a = XmlHttpRequest::new();
        let b = XmlHttpRequest::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }
}
