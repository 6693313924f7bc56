//! Aggregates over a snapshot, as shown by badges and status indicators.

use crate::models::NetworkRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub total: usize,
    /// Records with neither a status nor an error yet
    pub pending: usize,
    /// Records with a 4xx/5xx status or a transport error
    pub errors: usize,
}

impl RequestStats {
    pub fn from_snapshot(records: &[NetworkRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Default::default()
            },
            |mut stats, record| {
                if record.is_pending() {
                    stats.pending += 1;
                }
                if record.is_error() {
                    stats.errors += 1;
                }
                stats
            },
        )
    }
}

/// Newest record that settled with an HTTP error status.
///
/// Snapshots are ordered newest first, so this is the first match.
pub fn latest_error(records: &[NetworkRecord]) -> Option<&NetworkRecord> {
    records
        .iter()
        .find(|record| record.status.is_some_and(|s| s >= 400))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordKind, RecordUpdate};

    fn with_status(url: &str, status: Option<u16>, error: Option<&str>) -> NetworkRecord {
        NetworkRecord::new(RecordKind::Fetch, "GET", url).merged(RecordUpdate {
            status,
            error: error.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn counts_pending_and_errors() {
        let records = vec![
            with_status("https://a.example.com", None, None),
            with_status("https://b.example.com", Some(200), None),
            with_status("https://c.example.com", Some(503), None),
            with_status("https://d.example.com", None, Some("offline")),
        ];
        let stats = RequestStats::from_snapshot(&records);
        assert_eq!(
            stats,
            RequestStats {
                total: 4,
                pending: 1,
                errors: 2
            }
        );
    }

    #[test]
    fn latest_error_picks_newest_http_failure() {
        let records = vec![
            with_status("https://new.example.com", Some(404), None),
            with_status("https://old.example.com", Some(500), None),
        ];
        assert_eq!(
            latest_error(&records).map(|r| r.url.as_str()),
            Some("https://new.example.com")
        );
        assert!(latest_error(&records[..0]).is_none());
    }
}
