//! Captured request/response payloads
//!
//! Bodies arrive in many shapes (plain strings, form data, binary buffers,
//! blobs, JSON values). Everything is normalised into a [`Payload`] before it
//! lands in a record, so consumers never have to deal with raw host types.

use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// A normalised request or response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A string body passed through unchanged
    Text(String),
    /// A structured request body serialised to JSON text
    SerializedJson(String),
    /// A response body that parsed as JSON
    Parsed(serde_json::Value),
    /// A binary or opaque body replaced by a descriptive marker
    Placeholder(Placeholder),
}

/// Descriptive stand-ins for bodies that cannot be shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    FormData,
    ArrayBuffer,
    Blob,
    EmptyBlob,
    /// Small blob with a textual content type; the text is kept
    TextBlob {
        size: usize,
        mime: String,
        text: String,
    },
    /// Small binary blob; a base64 preview of the leading bytes is kept
    BinaryBlob {
        size: usize,
        mime: String,
        preview: String,
    },
    LargeBlob {
        size: usize,
        mime: String,
    },
    /// A response type the capture layer does not decode (e.g. documents)
    Opaque(String),
    Unparseable,
}

impl Payload {
    /// Render the payload as display text.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) | Payload::SerializedJson(text) => Cow::Borrowed(text),
            Payload::Parsed(value) => Cow::Owned(value.to_string()),
            Payload::Placeholder(placeholder) => Cow::Owned(placeholder.to_string()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Payload::Placeholder(_))
    }

    /// Parsed JSON view of the payload, if it holds JSON.
    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            Payload::Parsed(value) => Some(value.clone()),
            Payload::SerializedJson(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Parsed(value) => value.serialize(serializer),
            other => serializer.serialize_str(&other.as_text()),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::FormData => f.write_str("[FormData]"),
            Placeholder::ArrayBuffer => f.write_str("[ArrayBuffer]"),
            Placeholder::Blob => f.write_str("[Blob]"),
            Placeholder::EmptyBlob => f.write_str("[Blob: empty]"),
            Placeholder::TextBlob { size, mime, text } => {
                write!(f, "[Blob: {}, {}] {}", mime, size_str(*size), text)
            }
            Placeholder::BinaryBlob {
                size,
                mime,
                preview,
            } => write!(f, "[Blob: {}, {}, base64] {}", mime, size_str(*size), preview),
            Placeholder::LargeBlob { size, mime } => {
                write!(f, "[Blob: {}, {}]", mime, size_str(*size))
            }
            Placeholder::Opaque(kind) => write!(f, "[{} response]", kind),
            Placeholder::Unparseable => f.write_str("[Unable to parse response]"),
        }
    }
}

fn size_str(size: usize) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}
