//! Tracing wrapper around the global fetch primitive

use crate::intercept::normalize::{header_map_to_headers, normalize_headers, parse_body, parse_response};
use crate::models::{generate_id, now_millis, NetworkRecord, RecordKind, RecordUpdate};
use crate::runtime::{FetchPrimitive, FetchRequest, FetchResponse, TransportError};
use crate::storage;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// Records every call, then delegates to the fetch that was installed before
/// interception started. Results and errors reach the caller unchanged.
pub(crate) struct TracedFetch {
    original: Arc<dyn FetchPrimitive>,
}

impl TracedFetch {
    pub(crate) fn new(original: Arc<dyn FetchPrimitive>) -> Self {
        Self { original }
    }
}

impl FetchPrimitive for TracedFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, TransportError>> {
        let original = Arc::clone(&self.original);
        async move {
            let start = now_millis();
            let mut record = NetworkRecord::started_at(
                generate_id(),
                RecordKind::Fetch,
                &request.effective_method(),
                &request.url,
                start,
            );
            record.headers = normalize_headers(Some(
                request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            ));
            if storage::config().capture_request_body {
                if let Some(body) = &request.body {
                    record.body = parse_body(body).await;
                }
            }

            let id = record.id.clone();
            let tracked = storage::add_request(record);

            let result = original.fetch(request).await;
            if !tracked {
                return result;
            }

            match &result {
                Ok(response) => {
                    let capture = storage::config().capture_response_body;
                    let update = RecordUpdate {
                        status: Some(response.status()),
                        response: parse_response(response, capture).await,
                        response_headers: Some(header_map_to_headers(response.headers())),
                        ..RecordUpdate::settled(start)
                    };
                    storage::update_request(&id, update);
                }
                Err(e) => {
                    let update = RecordUpdate {
                        error: Some(e.to_string()),
                        ..RecordUpdate::settled(start)
                    };
                    storage::update_request(&id, update);
                }
            }
            result
        }
        .boxed()
    }
}
