// LogPulse - platform/jsonl_sink.rs
//
// File-backed record sink: one JSON-lines file per site,
// `<data_dir>/records/<site>.jsonl`, one `LogRecord` per line.
//
// Appends are serialised through a mutex so batches from concurrent callers
// never interleave. Retention cleanup rewrites each file through a temp file
// and rename, the same way scan state is saved.

use crate::app::sink::RecordSink;
use crate::core::model::LogRecord;
use crate::core::record::retention_cutoff;
use crate::util::constants::RECORDS_DIR_NAME;
use crate::util::error::SinkError;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const RECORD_FILE_EXTENSION: &str = "jsonl";

/// JSON-lines record store rooted at a directory.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Sink writing under `<data_dir>/records/`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(RECORDS_DIR_NAME))
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the record file for `site_id`.
    pub fn site_file(&self, site_id: &str) -> PathBuf {
        let safe: String = site_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.{RECORD_FILE_EXTENSION}"))
    }

    /// Read every record stored for `site_id`. Malformed lines are skipped.
    pub fn read_site(&self, site_id: &str) -> Result<Vec<LogRecord>, SinkError> {
        let path = self.site_file(site_id);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SinkError::Io { path, source }),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
            if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, SinkError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        Ok(entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == RECORD_FILE_EXTENSION))
            .collect())
    }

    /// Rewrite `path` keeping only records at or after `cutoff`. Lines that
    /// do not decode are kept verbatim.
    fn prune_file(&self, path: &Path, cutoff: chrono::DateTime<Utc>) -> Result<usize, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(io_err)?;
        let mut kept: Vec<String> = Vec::new();
        let mut removed = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) if record.timestamp < cutoff => removed += 1,
                _ => kept.push(line),
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp).map_err(io_err)?);
            for line in &kept {
                writer.write_all(line.as_bytes()).map_err(io_err)?;
                writer.write_all(b"\n").map_err(io_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            io_err(source)
        })?;
        Ok(removed)
    }
}

impl RecordSink for JsonLinesSink {
    fn insert_batch(&self, site_id: &str, records: &[LogRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.site_file(site_id);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };

        let _guard = self.lock();
        fs::create_dir_all(&self.dir).map_err(|source| SinkError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record).map_err(|source| SinkError::Json {
                path: path.clone(),
                source,
            })?;
            writer.write_all(b"\n").map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;

        tracing::trace!(site = %site_id, records = records.len(), "Records appended");
        Ok(())
    }

    fn clear_site(&self, site_id: &str) -> Result<(), SinkError> {
        let path = self.site_file(site_id);
        let _guard = self.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(site = %site_id, "Stored records cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SinkError::Io { path, source }),
        }
    }

    fn clear_all(&self) -> Result<(), SinkError> {
        let _guard = self.lock();
        for path in self.record_files()? {
            fs::remove_file(&path).map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        }
        tracing::info!(dir = %self.dir.display(), "All stored records cleared");
        Ok(())
    }

    fn clean_expired(&self, retention_days: u32) -> Result<usize, SinkError> {
        let cutoff = retention_cutoff(Utc::now(), retention_days);
        let _guard = self.lock();
        let mut removed = 0;
        for path in self.record_files()? {
            removed += self.prune_file(&path, cutoff)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use tempfile::TempDir;

    fn record(ip: &str, ts: DateTime<Utc>) -> LogRecord {
        LogRecord {
            ip: ip.to_string(),
            pageview: false,
            timestamp: ts,
            method: "GET".to_string(),
            url: "/".to_string(),
            status: 200,
            bytes_sent: 10,
            referer: "-".to_string(),
            browser: "Unknown".to_string(),
            os: "Unknown".to_string(),
            device: "Other".to_string(),
            domestic_location: "unknown".to_string(),
            global_location: "unknown".to_string(),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesSink::in_data_dir(dir.path());
        let now = Utc::now();
        sink.insert_batch("main", &[record("1.1.1.1", now)]).unwrap();
        sink.insert_batch("main", &[record("2.2.2.2", now)]).unwrap();

        let stored = sink.read_site("main").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].ip, "2.2.2.2");
        assert!(sink.read_site("other").unwrap().is_empty());
    }

    #[test]
    fn test_clear_scopes() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("records"));
        let now = Utc::now();
        sink.insert_batch("a", &[record("1.1.1.1", now)]).unwrap();
        sink.insert_batch("b", &[record("1.1.1.1", now)]).unwrap();

        sink.clear_site("a").unwrap();
        sink.clear_site("a").unwrap();
        assert!(sink.read_site("a").unwrap().is_empty());
        assert_eq!(sink.read_site("b").unwrap().len(), 1);

        sink.clear_all().unwrap();
        assert!(sink.read_site("b").unwrap().is_empty());
    }

    #[test]
    fn test_clean_expired_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesSink::in_data_dir(dir.path());
        let now = Utc::now();
        sink.insert_batch(
            "main",
            &[record("old", now - Duration::days(45)), record("new", now)],
        )
        .unwrap();

        assert_eq!(sink.clean_expired(30).unwrap(), 1);
        let stored = sink.read_site("main").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].ip, "new");
    }

    #[test]
    fn test_site_file_name_is_sanitised() {
        let sink = JsonLinesSink::new("/data/records");
        assert_eq!(
            sink.site_file("../etc/passwd"),
            PathBuf::from("/data/records/.._etc_passwd.jsonl")
        );
    }
}
