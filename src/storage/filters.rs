//! Admission filters applied when a record is first added.

use crate::models::NetworkRecord;

/// Substrings that mark loopback, private-network and local-file targets
const LOCAL_TARGETS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "192.168.",
    "10.0.",
    "172.16.",
    "file://",
];

/// A predicate deciding whether a record is kept
pub trait RecordFilter: Send + Sync {
    fn allows(&self, record: &NetworkRecord) -> bool;
}

impl<F> RecordFilter for F
where
    F: Fn(&NetworkRecord) -> bool + Send + Sync,
{
    fn allows(&self, record: &NetworkRecord) -> bool {
        self(record)
    }
}

/// Drops `HEAD` calls
pub struct SkipHeadRequests;

impl RecordFilter for SkipHeadRequests {
    fn allows(&self, record: &NetworkRecord) -> bool {
        !record.method.eq_ignore_ascii_case("HEAD")
    }
}

/// Drops calls to loopback/private hosts and `file://` URLs
pub struct SkipLocalTraffic;

impl SkipLocalTraffic {
    fn is_local(url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        LOCAL_TARGETS.iter().any(|pattern| url.contains(pattern))
    }
}

impl RecordFilter for SkipLocalTraffic {
    fn allows(&self, record: &NetworkRecord) -> bool {
        !(Self::is_local(&record.url) || Self::is_local(&record.full_url))
    }
}

/// Ordered list of filters; a record is kept iff every filter allows it.
pub struct FilterChain {
    filters: Vec<Box<dyn RecordFilter>>,
}

impl FilterChain {
    /// A chain that keeps everything
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Append a filter to the end of the chain
    pub fn with<F: RecordFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn allows(&self, record: &NetworkRecord) -> bool {
        self.filters.iter().all(|filter| filter.allows(record))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::empty().with(SkipHeadRequests).with(SkipLocalTraffic)
    }
}
