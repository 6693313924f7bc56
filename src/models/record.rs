//! Network record model
//!
//! Represents a single HTTP call captured by one of the interceptors, from
//! the moment it is issued until it settles (or forever, if it never does).

use crate::models::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Header mapping with lower-cased names.
pub type Headers = BTreeMap<String, String>;

/// Which interceptor produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Fetch,
    Xhr,
    Axios,
}

/// Coarse outcome of a record, used for colouring and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
    /// Transport failure with no HTTP status
    Failed,
}

/// One captured network call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    /// Unique identifier, also the join key for the terminal update
    pub id: String,
    /// Upper-case HTTP verb
    pub method: String,
    /// Target as issued by the caller
    pub url: String,
    /// Target resolved against a base URL when the interceptor knows one
    pub full_url: String,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since epoch
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// `end_time - start_time` in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: RecordKind,
}

/// Terminal fields merged into a record when its call settles or fails.
///
/// Only `Some` fields overwrite the stored record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub status: Option<u16>,
    pub response: Option<Payload>,
    pub response_headers: Option<Headers>,
    pub error: Option<String>,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
}

/// Generate a record id: a v7 UUID, i.e. a millisecond timestamp followed by
/// random bits.
pub fn generate_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl NetworkRecord {
    /// Create a pending record for a call starting now
    pub fn new(kind: RecordKind, method: &str, url: &str) -> Self {
        Self::started_at(generate_id(), kind, method, url, now_millis())
    }

    /// Create a pending record whose id and start time were fixed earlier
    /// (e.g. at XHR `open`, before the body is known).
    pub fn started_at(id: String, kind: RecordKind, method: &str, url: &str, start: i64) -> Self {
        Self {
            id,
            method: method.to_uppercase(),
            url: url.to_string(),
            full_url: url.to_string(),
            headers: Headers::new(),
            response_headers: None,
            body: None,
            status: None,
            response: None,
            error: None,
            start_time: start,
            end_time: None,
            duration: None,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Copy of this record with the given update merged in
    pub fn merged(&self, update: RecordUpdate) -> Self {
        let mut next = self.clone();
        if let Some(status) = update.status {
            next.status = Some(status);
        }
        if let Some(response) = update.response {
            next.response = Some(response);
        }
        if let Some(headers) = update.response_headers {
            next.response_headers = Some(headers);
        }
        if let Some(error) = update.error {
            next.error = Some(error);
        }
        if let Some(end_time) = update.end_time {
            next.end_time = Some(end_time);
        }
        if let Some(duration) = update.duration {
            next.duration = Some(duration);
        }
        next
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_none() && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|s| s >= 400)
    }

    pub fn status_class(&self) -> StatusClass {
        match self.status {
            None if self.error.is_some() => StatusClass::Failed,
            None => StatusClass::Pending,
            Some(s) if s < 200 => StatusClass::Informational,
            Some(s) if s < 300 => StatusClass::Success,
            Some(s) if s < 400 => StatusClass::Redirect,
            Some(s) if s < 500 => StatusClass::ClientError,
            Some(_) => StatusClass::ServerError,
        }
    }

    /// Get duration as formatted string
    pub fn duration_str(&self) -> String {
        match self.duration {
            Some(ms) if ms < 1000 => format!("{}ms", ms),
            Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
            None => "-".to_string(),
        }
    }

    /// Render the request as a cURL command
    pub fn to_curl(&self) -> String {
        let mut curl = format!("curl -X {} \"{}\"", self.method, self.full_url);
        for (name, value) in &self.headers {
            curl.push_str(&format!(" \\\n  -H \"{}: {}\"", name, value));
        }
        if let Some(body) = &self.body {
            curl.push_str(&format!(" \\\n  -d '{}'", body));
        }
        curl
    }
}

impl RecordUpdate {
    /// Update carrying only the settle timestamps for a call that started at `start_time`
    pub fn settled(start_time: i64) -> Self {
        let end = now_millis();
        Self {
            end_time: Some(end),
            duration: Some((end - start_time).max(0)),
            ..Default::default()
        }
    }
}
