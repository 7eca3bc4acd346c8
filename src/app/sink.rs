// LogPulse - app/sink.rs
//
// Persistent record sink contract, plus an in-memory implementation used by
// tests and demo setups. The file-backed sink lives in
// `platform::jsonl_sink`.

use crate::core::model::LogRecord;
use crate::core::record::retention_cutoff;
use crate::util::error::SinkError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// Destination for normalised records, keyed by site.
pub trait RecordSink: Send + Sync {
    /// Append a batch of records for `site_id`.
    fn insert_batch(&self, site_id: &str, records: &[LogRecord]) -> Result<(), SinkError>;

    /// Delete every stored record of one site.
    fn clear_site(&self, site_id: &str) -> Result<(), SinkError>;

    /// Delete every stored record of every site.
    fn clear_all(&self) -> Result<(), SinkError>;

    /// Delete records older than the retention window. Returns the number
    /// of records removed.
    fn clean_expired(&self, retention_days: u32) -> Result<usize, SinkError>;
}

/// Thread-safe in-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<HashMap<String, Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records stored for `site_id`.
    pub fn records(&self, site_id: &str) -> Vec<LogRecord> {
        self.lock().get(site_id).cloned().unwrap_or_default()
    }

    pub fn count(&self, site_id: &str) -> usize {
        self.lock().get(site_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<LogRecord>>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RecordSink for MemorySink {
    fn insert_batch(&self, site_id: &str, records: &[LogRecord]) -> Result<(), SinkError> {
        self.lock()
            .entry(site_id.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    fn clear_site(&self, site_id: &str) -> Result<(), SinkError> {
        self.lock().remove(site_id);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), SinkError> {
        self.lock().clear();
        Ok(())
    }

    fn clean_expired(&self, retention_days: u32) -> Result<usize, SinkError> {
        let cutoff = retention_cutoff(Utc::now(), retention_days);
        let mut removed = 0;
        for records in self.lock().values_mut() {
            let before = records.len();
            records.retain(|r| r.timestamp >= cutoff);
            removed += before - records.len();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn record(ts: DateTime<Utc>) -> LogRecord {
        LogRecord {
            ip: "10.0.0.1".to_string(),
            pageview: true,
            timestamp: ts,
            method: "GET".to_string(),
            url: "/".to_string(),
            status: 200,
            bytes_sent: 0,
            referer: String::new(),
            browser: String::new(),
            os: String::new(),
            device: String::new(),
            domestic_location: String::new(),
            global_location: String::new(),
        }
    }

    #[test]
    fn test_clear_site_is_scoped() {
        let sink = MemorySink::new();
        sink.insert_batch("a", &[record(Utc::now())]).unwrap();
        sink.insert_batch("b", &[record(Utc::now())]).unwrap();
        sink.clear_site("a").unwrap();
        assert_eq!(sink.count("a"), 0);
        assert_eq!(sink.count("b"), 1);
    }

    #[test]
    fn test_clean_expired_drops_old_records() {
        let sink = MemorySink::new();
        let old = Utc::now() - Duration::days(40);
        sink.insert_batch("a", &[record(old), record(Utc::now())]).unwrap();
        assert_eq!(sink.clean_expired(30).unwrap(), 1);
        assert_eq!(sink.count("a"), 1);
        assert_eq!(sink.clean_expired(u32::MAX).unwrap(), 0);
        assert_eq!(sink.count("a"), 1);
    }
}
