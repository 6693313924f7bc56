//! Process-wide record store
//!
//! A single [`RequestStore`] lives for the whole process. Interceptors feed it
//! through [`add_request`] / [`update_request`]; UI consumers read it through
//! [`subscribe`].

mod filters;
mod request_store;

pub use filters::{FilterChain, RecordFilter, SkipHeadRequests, SkipLocalTraffic};
pub use request_store::{RequestStore, Snapshot, SubscriberFn, SubscriptionId};

use crate::models::{ConfigUpdate, LoggerConfig, NetworkRecord, RecordUpdate};
use once_cell::sync::Lazy;

static STORE: Lazy<RequestStore> = Lazy::new(RequestStore::default);

/// The process-wide store
pub fn store() -> &'static RequestStore {
    &STORE
}

/// Handle returned by [`subscribe`]; each handle removes only its own registration.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop delivering snapshots to this subscription
    pub fn unsubscribe(&self) -> bool {
        STORE.unsubscribe(self.id)
    }
}

/// Register a snapshot callback; it is invoked once right away.
pub fn subscribe<F>(callback: F) -> Subscription
where
    F: Fn(Snapshot) + Send + Sync + 'static,
{
    Subscription {
        id: STORE.subscribe(callback),
    }
}

pub(crate) fn add_request(record: NetworkRecord) -> bool {
    STORE.add_request(record)
}

pub(crate) fn update_request(id: &str, update: RecordUpdate) -> bool {
    STORE.update_request(id, update)
}

pub fn clear_requests() {
    STORE.clear();
}

pub fn snapshot() -> Snapshot {
    STORE.snapshot()
}

pub fn config() -> LoggerConfig {
    STORE.config()
}

pub fn configure(update: ConfigUpdate) {
    STORE.configure(update);
}

/// Reset the global store between tests: records, subscribers and config.
#[cfg(test)]
pub(crate) fn reset_store_for_tests() {
    STORE.reset();
}
