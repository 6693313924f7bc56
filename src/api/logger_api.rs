//! Logger control API
//!
//! The surface UI layers call: lifecycle control, the subscription feed and
//! a few read-only views over the current snapshot.

use crate::intercept;
use crate::models::{self, ConfigUpdate, LoggerConfig, NetworkRecord, RequestStats};
use crate::runtime::InterceptorHost;
use crate::storage::{self, Snapshot, Subscription};
use anyhow::Context;

/// Get the version of the HttpTrace core library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Install a console `tracing` subscriber (call once at startup).
///
/// Returns `false` when a global subscriber was already installed, which is
/// harmless.
pub fn init_logging() -> bool {
    let level = resolve_log_level();
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!("HttpTrace core initialized v{}", env!("CARGO_PKG_VERSION"));
    }
    installed
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// Start capturing fetch and XHR traffic. No-op if already running.
pub fn start_logging() -> bool {
    intercept::start()
}

/// Stop capturing and restore the original primitives. No-op if not running.
pub fn stop_logging() -> bool {
    intercept::stop()
}

pub fn is_logging() -> bool {
    intercept::is_active()
}

/// Instrument an axios-style client. Clients without interceptors are ignored.
pub fn attach_client<H: InterceptorHost + ?Sized>(client: &H) -> bool {
    intercept::attach(client)
}

pub fn clear_requests() {
    storage::clear_requests();
}

/// Receive every snapshot from now on, starting with the current one
pub fn subscribe<F>(callback: F) -> Subscription
where
    F: Fn(Snapshot) + Send + Sync + 'static,
{
    storage::subscribe(callback)
}

pub fn configure(update: ConfigUpdate) {
    storage::configure(update);
}

/// Apply a partial configuration given as JSON, e.g. `{"maxRequests": 50}`
pub fn configure_json(json: &str) -> anyhow::Result<()> {
    let update = ConfigUpdate::from_json(json)?;
    storage::configure(update);
    Ok(())
}

pub fn current_config() -> LoggerConfig {
    storage::config()
}

pub fn current_requests() -> Snapshot {
    storage::snapshot()
}

/// Counters for badges and status indicators
pub fn request_stats() -> RequestStats {
    RequestStats::from_snapshot(&storage::snapshot())
}

/// Newest record with an HTTP error status
pub fn latest_error() -> Option<NetworkRecord> {
    models::latest_error(&storage::snapshot()).cloned()
}

/// The current snapshot in its exported JSON shape
pub fn export_json() -> anyhow::Result<String> {
    let snapshot = storage::snapshot();
    serde_json::to_string_pretty(&*snapshot).context("serializing captured requests")
}

/// cURL command for a captured request
pub fn export_curl(id: &str) -> Option<String> {
    storage::snapshot()
        .iter()
        .find(|record| record.id == id)
        .map(NetworkRecord::to_curl)
}
