//! Conversion of host headers and bodies into record fields
//!
//! Nothing in here fails: anything that cannot be decoded degrades to a
//! [`Placeholder`].

use crate::models::{Headers, Payload, Placeholder};
use crate::runtime::xhr::{ResponseType, XhrResponse};
use crate::runtime::{Blob, FetchResponse, RequestBody, XmlHttpRequest};
use base64::Engine;
use http::HeaderMap;

/// Blobs up to this size are described with their content
pub const SMALL_BLOB_BYTES: usize = 10 * 1024;

/// Leading bytes of a binary blob kept in its base64 preview
const BLOB_PREVIEW_BYTES: usize = 48;

/// Lower-case header names and stringify values. `None` yields an empty map.
pub fn normalize_headers<I, K, V>(raw: Option<I>) -> Headers
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: ToString,
{
    raw.into_iter()
        .flatten()
        .map(|(name, value)| (name.as_ref().to_lowercase(), value.to_string()))
        .collect()
}

/// Flatten an `http` header map; repeated headers are joined with `", "`.
pub fn header_map_to_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_lowercase())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

/// Parse an XHR-style raw header block (`name: value` per CRLF line)
pub fn parse_raw_headers(raw: &str) -> Headers {
    raw.split(['\r', '\n'])
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Normalise an outgoing body without suspending.
///
/// Blobs become a bare `[Blob]` marker here since their content cannot be read
/// synchronously.
pub fn parse_body_sync(body: &RequestBody) -> Option<Payload> {
    match body {
        RequestBody::Text(text) => text_payload(text),
        RequestBody::Json(serde_json::Value::Null) => None,
        RequestBody::Json(value) => Some(Payload::SerializedJson(value.to_string())),
        RequestBody::FormData(_) => Some(Payload::Placeholder(Placeholder::FormData)),
        RequestBody::ArrayBuffer(_) => Some(Payload::Placeholder(Placeholder::ArrayBuffer)),
        RequestBody::Blob(_) => Some(Payload::Placeholder(Placeholder::Blob)),
    }
}

/// Normalise an outgoing body, reading blob text when possible
pub async fn parse_body(body: &RequestBody) -> Option<Payload> {
    match body {
        RequestBody::Blob(blob) => match blob.text().await {
            Ok(text) => text_payload(&text),
            Err(_) => Some(Payload::Placeholder(Placeholder::Blob)),
        },
        other => parse_body_sync(other),
    }
}

/// Capture a fetch response body. Reads from a clone, so the caller's copy
/// is untouched.
pub async fn parse_response(response: &FetchResponse, capture: bool) -> Option<Payload> {
    if !capture {
        return None;
    }
    match response.clone().text().await {
        Ok(text) => Some(text_or_json(text)),
        Err(_) => Some(Payload::Placeholder(Placeholder::Unparseable)),
    }
}

/// Capture the response of a finished XHR according to its response type
pub fn normalize_xhr_response(xhr: &XmlHttpRequest) -> Option<Payload> {
    let payload = match xhr.response()? {
        XhrResponse::Text(text) => text_or_json(text),
        XhrResponse::Json(Some(value)) => Payload::Parsed(value),
        XhrResponse::Json(None) => Payload::Placeholder(Placeholder::Unparseable),
        XhrResponse::Blob(blob) => describe_blob(&blob),
        XhrResponse::ArrayBuffer(_) => {
            Payload::Placeholder(Placeholder::Opaque(ResponseType::ArrayBuffer.as_str().into()))
        }
        XhrResponse::Document(_) => {
            Payload::Placeholder(Placeholder::Opaque(ResponseType::Document.as_str().into()))
        }
    };
    Some(payload)
}

/// Size- and type-aware description of a blob response
pub fn describe_blob(blob: &Blob) -> Payload {
    let size = blob.size();
    let mime = if blob.mime().is_empty() {
        "application/octet-stream".to_string()
    } else {
        blob.mime().to_string()
    };

    let placeholder = if size == 0 {
        Placeholder::EmptyBlob
    } else if size > SMALL_BLOB_BYTES {
        Placeholder::LargeBlob { size, mime }
    } else {
        let bytes = blob.bytes();
        match std::str::from_utf8(&bytes) {
            Ok(text) if is_textual(&mime) => Placeholder::TextBlob {
                size,
                mime,
                text: text.to_string(),
            },
            _ => {
                let end = size.min(BLOB_PREVIEW_BYTES);
                Placeholder::BinaryBlob {
                    size,
                    mime,
                    preview: base64::engine::general_purpose::STANDARD.encode(&bytes[..end]),
                }
            }
        }
    };
    Payload::Placeholder(placeholder)
}

/// Payload for an already-decoded JSON value (axios response data)
pub fn payload_from_json(value: &serde_json::Value) -> Option<Payload> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(Payload::Text(text.clone())),
        other => Some(Payload::Parsed(other.clone())),
    }
}

fn text_payload(text: &str) -> Option<Payload> {
    if text.trim().is_empty() {
        None
    } else {
        Some(Payload::Text(text.to_string()))
    }
}

fn text_or_json(text: String) -> Payload {
    match serde_json::from_str(&text) {
        Ok(value) => Payload::Parsed(value),
        Err(_) => Payload::Text(text),
    }
}

fn is_textual(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.contains("json")
        || mime.contains("xml")
        || mime.contains("javascript")
}
