use crate::models::{ConfigUpdate, LoggerConfig, NetworkRecord, RecordUpdate};
use crate::storage::filters::FilterChain;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Immutable, newest-first copy of the buffer handed to subscribers.
///
/// One snapshot is built per mutation and shared by every subscriber.
pub type Snapshot = Arc<[NetworkRecord]>;

pub type SubscriberFn = dyn Fn(Snapshot) + Send + Sync;

/// Handle identifying one `subscribe` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct StoreState {
    requests: VecDeque<NetworkRecord>,
    config: LoggerConfig,
    subscribers: Vec<(SubscriptionId, Arc<SubscriberFn>)>,
    next_subscription: u64,
}

/// Bounded record buffer plus its subscriber registry and configuration
pub struct RequestStore {
    state: Mutex<StoreState>,
    filters: FilterChain,
}

impl RequestStore {
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_filters(config, FilterChain::default())
    }

    pub fn with_filters(config: LoggerConfig, filters: FilterChain) -> Self {
        Self {
            state: Mutex::new(StoreState {
                requests: VecDeque::new(),
                config,
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
            filters,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panic while the lock was held must not wedge capture for the rest of the process
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> LoggerConfig {
        self.lock().config.clone()
    }

    pub fn configure(&self, update: ConfigUpdate) {
        self.lock().config.merge(update);
    }

    pub fn snapshot(&self) -> Snapshot {
        Self::build_snapshot(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().requests.is_empty()
    }

    /// Store a freshly started record. Returns `false` when a filter rejected it,
    /// in which case nothing changes and nobody is notified.
    pub fn add_request(&self, record: NetworkRecord) -> bool {
        if !self.filters.allows(&record) {
            tracing::trace!(url = %record.url, method = %record.method, "request filtered out");
            return false;
        }

        let mut state = self.lock();
        if state.config.enable_console_logs {
            tracing::debug!(id = %record.id, method = %record.method, url = %record.full_url, "request started");
        }
        let capacity = state.config.effective_max_requests();
        state.requests.push_front(record);
        state.requests.truncate(capacity);
        self.notify(state);
        true
    }

    /// Merge terminal fields into the record with `id`.
    ///
    /// Subscribers are notified even when the id is no longer buffered.
    /// Returns whether a record matched.
    pub fn update_request(&self, id: &str, update: RecordUpdate) -> bool {
        let mut state = self.lock();
        let matched = match state.requests.iter().position(|r| r.id == id) {
            Some(index) => {
                let next = state.requests[index].merged(update);
                if state.config.enable_console_logs {
                    tracing::debug!(
                        id = %next.id,
                        status = ?next.status,
                        error = ?next.error,
                        duration_ms = ?next.duration,
                        "request settled"
                    );
                }
                state.requests[index] = next;
                true
            }
            None => {
                tracing::debug!(id, "update for a record no longer buffered");
                false
            }
        };
        self.notify(state);
        matched
    }

    /// Drop every record; subscribers and configuration are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.requests.clear();
        self.notify(state);
    }

    /// Register a callback and immediately hand it the current snapshot.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let callback: Arc<SubscriberFn> = Arc::new(callback);
        let (id, snapshot) = {
            let mut state = self.lock();
            let id = SubscriptionId(state.next_subscription);
            state.next_subscription += 1;
            state.subscribers.push((id, Arc::clone(&callback)));
            (id, Self::build_snapshot(&state))
        };
        callback(snapshot);
        id
    }

    /// Remove exactly the subscription `id`. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sub, _)| *sub != id);
        before != state.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    #[cfg(test)]
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.requests.clear();
        state.subscribers.clear();
        state.config = LoggerConfig::default();
    }

    fn build_snapshot(state: &StoreState) -> Snapshot {
        state.requests.iter().cloned().collect()
    }

    /// Fan out one snapshot. The lock is released before callbacks run so a
    /// subscriber may call back into the store.
    fn notify(&self, state: MutexGuard<'_, StoreState>) {
        let snapshot = Self::build_snapshot(&state);
        let subscribers: Vec<Arc<SubscriberFn>> = state
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        drop(state);

        for callback in subscribers {
            callback(Arc::clone(&snapshot));
        }
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}
