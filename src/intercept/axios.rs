//! Interceptor-based instrumentation for axios-style clients
//!
//! The request interceptor drops a [`TraceTicket`] into the config's
//! extensions; the paired response/error interceptor claims the matching
//! start time from an in-flight table owned by this module. A response whose
//! ticket is missing or already claimed is ignored. Requests that never
//! answer (cancelled futures, rejected configs) keep their entry only while
//! their record is still in the store.

use crate::intercept::is_active;
use crate::intercept::normalize::{
    header_map_to_headers, normalize_headers, parse_body_sync, payload_from_json,
};
use crate::models::{generate_id, now_millis, NetworkRecord, RecordKind, RecordUpdate};
use crate::runtime::{combine_urls, ClientError, ClientResponse, InterceptorHost, RequestConfig};
use crate::storage;
use dashmap::{DashMap, DashSet};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;

/// Correlation marker carried from the request chain to the response chain
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceTicket(String);

static INSTRUMENTED: Lazy<DashSet<u64>> = Lazy::new(DashSet::new);

/// Record id -> start time of requests awaiting their response
static IN_FLIGHT: Lazy<DashMap<String, i64>> = Lazy::new(DashMap::new);

/// Install the tracing interceptors on `host`.
///
/// Returns `false` when the host exposes no interceptors or was already
/// instrumented; neither is an error.
pub fn attach<H: InterceptorHost + ?Sized>(host: &H) -> bool {
    let Some(interceptors) = host.interceptors() else {
        tracing::debug!("client exposes no interceptors, not instrumenting");
        return false;
    };
    if !INSTRUMENTED.insert(host.instance_id()) {
        return false;
    }

    let host_base_url = host.base_url().map(str::to_string);
    interceptors
        .request
        .use_interceptor(move |config| Ok(on_request(config, host_base_url.as_deref())));
    interceptors.response.use_interceptor(
        Some(Arc::new(|response: ClientResponse| {
            on_response(&response);
            Ok(response)
        })),
        Some(Arc::new(|error: ClientError| {
            on_error(&error);
            Err::<ClientResponse, _>(error)
        })),
    );
    true
}

pub(crate) fn clear_in_flight() {
    IN_FLIGHT.clear();
}

/// Drop entries whose record has been evicted or cleared from the store
fn evict_unstored() {
    let snapshot = storage::snapshot();
    let stored: HashSet<&str> = snapshot.iter().map(|record| record.id.as_str()).collect();
    IN_FLIGHT.retain(|id, _| stored.contains(id.as_str()));
}

fn on_request(mut config: RequestConfig, host_base_url: Option<&str>) -> RequestConfig {
    if !is_active() {
        return config;
    }

    let logger = storage::config();
    let base_url = config
        .base_url
        .as_deref()
        .or(host_base_url)
        .or(logger.base_url.as_deref());
    let full_url = match base_url {
        Some(base) => combine_urls(base, &config.url),
        None => config.url.clone(),
    };

    let start = now_millis();
    let mut record = NetworkRecord::started_at(
        generate_id(),
        RecordKind::Axios,
        &config.effective_method(),
        &config.url,
        start,
    );
    record.full_url = full_url;
    record.headers = normalize_headers(Some(
        config.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ));
    if logger.capture_request_body {
        record.body = config.data.as_ref().and_then(parse_body_sync);
    }

    let id = record.id.clone();
    if storage::add_request(record) {
        evict_unstored();
        IN_FLIGHT.insert(id.clone(), start);
        config.extensions.insert(TraceTicket(id));
    }
    config
}

/// Take ownership of the in-flight entry for `config`, if any
fn claim(config: Option<&RequestConfig>) -> Option<(String, i64)> {
    let TraceTicket(id) = config?.extensions.get::<TraceTicket>()?;
    IN_FLIGHT.remove(id)
}

fn on_response(response: &ClientResponse) {
    let Some((id, start)) = claim(Some(&response.config)) else {
        return;
    };
    let capture = storage::config().capture_response_body;
    let update = RecordUpdate {
        status: Some(response.status),
        response: if capture {
            payload_from_json(&response.data)
        } else {
            None
        },
        response_headers: Some(header_map_to_headers(&response.headers)),
        ..RecordUpdate::settled(start)
    };
    storage::update_request(&id, update);
}

fn on_error(error: &ClientError) {
    let Some((id, start)) = claim(error.config.as_ref()) else {
        return;
    };
    let response = error.response.as_ref();
    // The server's error body wins over the generic message
    let message = match response.map(|r| &r.data) {
        Some(serde_json::Value::String(text)) if !text.is_empty() => text.clone(),
        Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
            error.message.clone()
        }
        Some(other) => other.to_string(),
    };
    let update = RecordUpdate {
        status: response.map(|r| r.status),
        response_headers: response.map(|r| header_map_to_headers(&r.headers)),
        error: Some(message),
        ..RecordUpdate::settled(start)
    };
    storage::update_request(&id, update);
}
