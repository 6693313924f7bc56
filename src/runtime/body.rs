//! Request body shapes accepted by the HTTP primitives.

use crate::runtime::transport::TransportError;
use bytes::Bytes;

/// Binary payload with a content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Bytes,
    mime: String,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Read the blob as UTF-8 text
    pub async fn text(&self) -> Result<String, TransportError> {
        String::from_utf8(self.data.to_vec())
            .map_err(|e| TransportError::Body(format!("blob is not valid UTF-8: {}", e)))
    }
}

/// Ordered form fields, sent URL-encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Outgoing body as handed to `fetch`, `XmlHttpRequest::send` or the client
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
    FormData(FormData),
    ArrayBuffer(Bytes),
    Blob(Blob),
}

impl RequestBody {
    /// Wire bytes plus the content type implied by the body shape
    pub(crate) fn encode(&self) -> Result<(Bytes, String), TransportError> {
        match self {
            RequestBody::Text(text) => Ok((
                Bytes::from(text.clone()),
                "text/plain;charset=UTF-8".to_string(),
            )),
            RequestBody::Json(value) => serde_json::to_vec(value)
                .map(|bytes| (Bytes::from(bytes), "application/json".to_string()))
                .map_err(|e| TransportError::Body(e.to_string())),
            RequestBody::FormData(form) => serde_urlencoded::to_string(form.fields())
                .map(|encoded| {
                    (
                        Bytes::from(encoded),
                        "application/x-www-form-urlencoded".to_string(),
                    )
                })
                .map_err(|e| TransportError::Body(e.to_string())),
            RequestBody::ArrayBuffer(bytes) => {
                Ok((bytes.clone(), "application/octet-stream".to_string()))
            }
            RequestBody::Blob(blob) => Ok((blob.bytes(), blob.mime().to_string())),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<FormData> for RequestBody {
    fn from(form: FormData) -> Self {
        RequestBody::FormData(form)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::ArrayBuffer(bytes)
    }
}

impl From<Blob> for RequestBody {
    fn from(blob: Blob) -> Self {
        RequestBody::Blob(blob)
    }
}

/// Attach `content_type` unless the caller already set one
pub(crate) fn with_content_type(
    mut headers: Vec<(String, String)>,
    content_type: String,
) -> Vec<(String, String)> {
    if !headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    {
        headers.push(("content-type".to_string(), content_type));
    }
    headers
}
