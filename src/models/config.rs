//! Logger configuration

use serde::{Deserialize, Serialize};

/// Buffer capacity used when none (or zero) is configured
pub const DEFAULT_MAX_REQUESTS: usize = 1000;

/// Current logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Capacity of the record buffer
    pub max_requests: usize,
    /// Normalise and keep outgoing bodies
    pub capture_request_body: bool,
    /// Normalise and keep response bodies
    pub capture_response_body: bool,
    /// Emit capture diagnostics through `tracing`
    pub enable_console_logs: bool,
    /// Fallback base for resolving relative client URLs into `full_url`
    pub base_url: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            capture_request_body: true,
            capture_response_body: true,
            enable_console_logs: true,
            base_url: None,
        }
    }
}

/// Partial configuration; absent fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub max_requests: Option<usize>,
    pub capture_request_body: Option<bool>,
    pub capture_response_body: Option<bool>,
    pub enable_console_logs: Option<bool>,
    pub base_url: Option<String>,
}

impl LoggerConfig {
    /// Shallow-merge an update into this configuration
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(max) = update.max_requests {
            self.max_requests = max;
        }
        if let Some(capture) = update.capture_request_body {
            self.capture_request_body = capture;
        }
        if let Some(capture) = update.capture_response_body {
            self.capture_response_body = capture;
        }
        if let Some(enabled) = update.enable_console_logs {
            self.enable_console_logs = enabled;
        }
        if let Some(base) = update.base_url {
            self.base_url = Some(base);
        }
    }

    /// Capacity actually enforced; zero falls back to the default
    pub fn effective_max_requests(&self) -> usize {
        if self.max_requests == 0 {
            DEFAULT_MAX_REQUESTS
        } else {
            self.max_requests
        }
    }
}

impl ConfigUpdate {
    /// Parse a partial configuration from a JSON object such as `{"maxRequests": 50}`
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
