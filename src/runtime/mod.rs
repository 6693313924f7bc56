//! Host HTTP primitives
//!
//! Three ways for application code to make requests, each reachable through a
//! replaceable, process-wide entry point:
//!
//! - [`fetch`]: promise-style, backed by the global fetch slot
//! - [`XmlHttpRequest`]: event-driven, dispatching through [`XhrPrototype`]
//! - [`ApiClient`]: axios-style client with interceptor chains

pub mod body;
pub mod client;
pub mod fetch;
pub mod transport;
pub mod xhr;

use std::sync::atomic::{AtomicU64, Ordering};

pub use body::{Blob, FormData, RequestBody};
pub use client::{
    combine_urls, ApiClient, ClientError, ClientResponse, InterceptorHost, Interceptors,
    RequestConfig,
};
pub use fetch::{
    fetch, install_fetch, installed_fetch, FetchPrimitive, FetchRequest, FetchResponse,
    NativeFetch,
};
pub use transport::{
    default_transport, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
};
pub use xhr::{
    install_prototype, prototype, ResponseType, WeakXmlHttpRequest, XhrPrototype, XhrResponse,
    XmlHttpRequest,
};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity for XHR instances and clients, unique within the process
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}
