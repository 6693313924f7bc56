//! XHR instrumentation
//!
//! Bookkeeping for each instance lives in a side table keyed by the
//! instance's identity, filled at `open`, extended by `set_request_header`
//! and taken out at `send` to become a record. Entries hold only a weak
//! reference to their instance and are pruned once it is dropped.

use crate::intercept::normalize::{normalize_xhr_response, parse_body_sync, parse_raw_headers};
use crate::models::{generate_id, now_millis, Headers, NetworkRecord, RecordKind, RecordUpdate};
use crate::runtime::xhr::DONE;
use crate::runtime::{RequestBody, WeakXmlHttpRequest, XhrPrototype, XmlHttpRequest};
use crate::storage;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

#[derive(Debug)]
struct PendingXhr {
    owner: WeakXmlHttpRequest,
    record_id: String,
    method: String,
    url: String,
    start: i64,
    headers: Headers,
}

static PENDING: Lazy<DashMap<u64, PendingXhr>> = Lazy::new(DashMap::new);

/// Wrap `original` so every request made through it is recorded
pub(crate) fn instrument(original: &XhrPrototype) -> XhrPrototype {
    let open = Arc::clone(&original.open);
    let set_request_header = Arc::clone(&original.set_request_header);
    let send = Arc::clone(&original.send);

    XhrPrototype {
        open: Arc::new(move |xhr: &XmlHttpRequest, method: &str, url: &str| {
            prune_dropped();
            PENDING.insert(
                xhr.id(),
                PendingXhr {
                    owner: xhr.downgrade(),
                    record_id: generate_id(),
                    method: method.to_uppercase(),
                    url: url.to_string(),
                    start: now_millis(),
                    headers: Headers::new(),
                },
            );
            open(xhr, method, url);
        }),
        set_request_header: Arc::new(move |xhr: &XmlHttpRequest, name: &str, value: &str| {
            if let Some(mut pending) = PENDING.get_mut(&xhr.id()) {
                pending.headers.insert(name.to_lowercase(), value.to_string());
            }
            set_request_header(xhr, name, value);
        }),
        send: Arc::new(move |xhr: &XmlHttpRequest, body: Option<RequestBody>| {
            track_send(xhr, body.as_ref());
            send(xhr, body);
        }),
    }
}

/// Drop all per-instance bookkeeping
pub(crate) fn clear_pending() {
    PENDING.clear();
}

/// Forget instances that were opened and then dropped without a send
fn prune_dropped() {
    PENDING.retain(|_, pending| pending.owner.is_alive());
}

fn track_send(xhr: &XmlHttpRequest, body: Option<&RequestBody>) {
    // Untracked: opened before interception started, or already sent
    let Some((_, pending)) = PENDING.remove(&xhr.id()) else {
        return;
    };

    let mut record = NetworkRecord::started_at(
        pending.record_id.clone(),
        RecordKind::Xhr,
        &pending.method,
        &pending.url,
        pending.start,
    );
    record.headers = pending.headers;
    if storage::config().capture_request_body {
        record.body = body.and_then(parse_body_sync);
    }

    if !storage::add_request(record) {
        return;
    }

    let caller = xhr.on_ready_state_change();
    let record_id = pending.record_id;
    let start = pending.start;
    xhr.set_on_ready_state_change(move |this| {
        if this.ready_state() == DONE {
            settle(this, &record_id, start);
        }
        if let Some(handler) = &caller {
            handler(this);
        }
    });
}

fn settle(xhr: &XmlHttpRequest, record_id: &str, start: i64) {
    let update = match xhr.network_error() {
        Some(error) => RecordUpdate {
            error: Some(error),
            ..RecordUpdate::settled(start)
        },
        None => RecordUpdate {
            status: Some(xhr.status()),
            response: if storage::config().capture_response_body {
                normalize_xhr_response(xhr)
            } else {
                None
            },
            response_headers: Some(parse_raw_headers(&xhr.all_response_headers())),
            ..RecordUpdate::settled(start)
        },
    };
    storage::update_request(record_id, update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::{reset_for_tests, start, stop};
    use crate::models::{Payload, Placeholder};
    use crate::runtime::xhr::ResponseType;
    use crate::runtime::{HttpRequest, HttpResponse, Transport, TransportError};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};
    use serde_json::json;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn respond(status: u16, content_type: &'static str, body: &'static [u8]) -> Arc<dyn Transport> {
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

    /// Send and wait for DONE, counting how often the caller's handler ran
    async fn send_and_wait(xhr: &XmlHttpRequest, body: Option<RequestBody>) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            counter.fetch_add(1, Ordering::SeqCst);
            if this.ready_state() == DONE {
                // The record must already be settled when the caller hears about DONE
                let settled = storage::snapshot().iter().any(|r| r.end_time.is_some());
                let _ = tx.send(settled);
            }
        });
        xhr.send(body);
        let settled_first = rx.recv().await.expect("request completes");
        assert!(settled_first);
        calls
    }

    #[tokio::test]
    #[serial]
    async fn xhr_lifecycle_is_recorded_once() {
        storage::reset_store_for_tests();
        start();

        let xhr = XmlHttpRequest::with_transport(respond(201, "application/json", b"{\"id\":9}"));
        xhr.open("post", "https://api.example.com/users");
        xhr.set_request_header("Content-Type", "application/json");
        xhr.set_request_header("X-Request-Id", "abc");
        let calls = send_and_wait(&xhr, Some(RequestBody::from(json!({ "name": "a" })))).await;

        let records = storage::snapshot();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.kind, RecordKind::Xhr);
        assert_eq!(record.method, "POST");
        assert_eq!(record.headers["x-request-id"], "abc");
        assert_eq!(record.body, Some(Payload::SerializedJson(r#"{"name":"a"}"#.into())));
        assert_eq!(record.status, Some(201));
        assert_eq!(record.response, Some(Payload::Parsed(json!({ "id": 9 }))));
        assert_eq!(
            record.response_headers.as_ref().unwrap()["content-type"],
            "application/json"
        );
        // HEADERS_RECEIVED and DONE
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(PENDING.is_empty());

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn concurrent_instances_keep_separate_bookkeeping() {
        storage::reset_store_for_tests();
        start();

        let a = XmlHttpRequest::with_transport(respond(200, "text/plain", b"a"));
        let b = XmlHttpRequest::with_transport(respond(404, "text/plain", b"missing"));
        a.open("GET", "https://api.example.com/a");
        b.open("GET", "https://api.example.com/b");
        a.set_request_header("X-Which", "a");
        b.set_request_header("X-Which", "b");

        tokio::join!(send_and_wait(&a, None), send_and_wait(&b, None));

        let records = storage::snapshot();
        assert_eq!(records.len(), 2);
        let by_url = |url: &str| records.iter().find(|r| r.url == url).cloned().unwrap();
        let ra = by_url("https://api.example.com/a");
        let rb = by_url("https://api.example.com/b");
        assert_eq!(ra.headers["x-which"], "a");
        assert_eq!(rb.headers["x-which"], "b");
        assert_eq!(ra.status, Some(200));
        assert_eq!(rb.status, Some(404));
        assert_eq!(rb.response, Some(Payload::Text("missing".into())));

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn network_failure_records_error_without_status() {
        storage::reset_store_for_tests();
        start();

        let transport: Arc<dyn Transport> = Arc::new(|_request: HttpRequest| async {
            Err::<HttpResponse, _>(TransportError::Network("Network request failed".into()))
        });
        let xhr = XmlHttpRequest::with_transport(transport);
        xhr.open("GET", "https://api.example.com/down");
        send_and_wait(&xhr, None).await;

        let record = storage::snapshot()[0].clone();
        assert_eq!(record.error.as_deref(), Some("Network request failed"));
        assert_eq!(record.status, None);
        assert!(record.duration.is_some());

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn blob_response_is_described() {
        storage::reset_store_for_tests();
        start();

        let xhr = XmlHttpRequest::with_transport(respond(200, "image/png", b"\x89PNG"));
        xhr.open("GET", "https://cdn.example.com/logo.png");
        xhr.set_response_type(ResponseType::Blob);
        send_and_wait(&xhr, None).await;

        let record = storage::snapshot()[0].clone();
        assert!(matches!(
            record.response,
            Some(Payload::Placeholder(Placeholder::BinaryBlob { size: 4, .. }))
        ));

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn instances_opened_before_start_are_not_tracked() {
        storage::reset_store_for_tests();
        let xhr = XmlHttpRequest::with_transport(respond(200, "text/plain", b"ok"));
        xhr.open("GET", "https://api.example.com/early");
        start();

        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(None);
        rx.recv().await.unwrap();
        assert!(storage::snapshot().is_empty());

        reset_for_tests();
    }

    fn delayed(millis: u64) -> Arc<dyn Transport> {
        Arc::new(move |request: HttpRequest| async move {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            Ok::<_, TransportError>(HttpResponse {
                status: 200,
                url: request.url,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"ok"),
            })
        })
    }

    #[tokio::test]
    #[serial]
    async fn sending_twice_yields_a_single_settled_record() {
        storage::reset_store_for_tests();
        start();

        let xhr = XmlHttpRequest::with_transport(delayed(20));
        xhr.open("GET", "https://api.example.com/twice");
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(None);
        xhr.send(None);
        rx.recv().await.expect("request completes");
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let records = storage::snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Some(200));
        assert!(records[0].end_time.is_some());
        assert!(rx.try_recv().is_err());

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn headers_set_after_send_are_not_recorded() {
        storage::reset_store_for_tests();
        start();

        let xhr = XmlHttpRequest::with_transport(delayed(10));
        xhr.open("GET", "https://api.example.com/headers");
        xhr.set_request_header("X-Before", "1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(None);
        xhr.set_request_header("X-After", "2");
        rx.recv().await.expect("request completes");

        let record = storage::snapshot()[0].clone();
        assert_eq!(record.headers["x-before"], "1");
        assert!(!record.headers.contains_key("x-after"));

        reset_for_tests();
    }

    #[tokio::test]
    #[serial]
    async fn nothing_is_recorded_after_stop() {
        storage::reset_store_for_tests();
        start();
        stop();

        let xhr = XmlHttpRequest::with_transport(respond(200, "text/plain", b"ok"));
        xhr.open("GET", "https://api.example.com/quiet");
        let (tx, mut rx) = mpsc::unbounded_channel();
        xhr.set_on_ready_state_change(move |this| {
            if this.ready_state() == DONE {
                let _ = tx.send(());
            }
        });
        xhr.send(None);
        rx.recv().await.expect("request completes");

        assert_eq!(xhr.status(), 200);
        assert!(storage::snapshot().is_empty());
        assert!(PENDING.is_empty());

        reset_for_tests();
    }

    #[test]
    #[serial]
    fn dropped_instances_do_not_linger() {
        storage::reset_store_for_tests();
        start();

        for n in 0..100 {
            let xhr = XmlHttpRequest::with_transport(respond(200, "text/plain", b""));
            xhr.open("GET", &format!("https://api.example.com/{}", n));
        }
        let live = XmlHttpRequest::with_transport(respond(200, "text/plain", b""));
        live.open("GET", "https://api.example.com/live");
        live.open("GET", "https://api.example.com/reopened");

        assert_eq!(PENDING.len(), 1);
        assert_eq!(
            PENDING.get(&live.id()).map(|p| p.url.clone()).as_deref(),
            Some("https://api.example.com/reopened")
        );
        assert!(storage::snapshot().is_empty());

        reset_for_tests();
    }
}
