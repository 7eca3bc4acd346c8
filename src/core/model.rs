// LogPulse - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
//
// Scan state, per-pass results, normalised records, and website
// configuration.
//
// These types are the shared vocabulary across all layers.

use crate::util::constants::{CADDY_LOG_TYPE, DEFAULT_LOG_TYPE};
use crate::util::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Scan state (persisted)
// =============================================================================

/// Offsets of one log file as of the end of the previous scan pass.
///
/// `last_offset` counts bytes already consumed from the *logical* stream:
/// the file itself for plain logs, the decompressed content for gzip logs.
/// `last_size` is the physical size seen at the end of the previous pass and
/// is used only to detect rotation (and, for gzip, "nothing changed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileState {
    pub last_offset: u64,
    pub last_size: u64,
}

/// Per-site map of file path to `FileState`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteScanState {
    #[serde(default)]
    pub files: HashMap<PathBuf, FileState>,
}

/// Scan state for every monitored site, keyed by site id.
///
/// Serialised as `{"<site>": {"files": {"<path>": {...}}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanState {
    sites: HashMap<String, SiteScanState>,
}

impl ScanState {
    /// Prior state of `path` for `site_id`, if it was ever scanned.
    pub fn file(&self, site_id: &str, path: &Path) -> Option<&FileState> {
        self.sites.get(site_id).and_then(|s| s.files.get(path))
    }

    /// Record the state of `path` after a completed scan.
    pub fn record_file(&mut self, site_id: &str, path: &Path, state: FileState) {
        self.sites
            .entry(site_id.to_string())
            .or_default()
            .files
            .insert(path.to_path_buf(), state);
    }

    /// All file states of one site.
    pub fn site(&self, site_id: &str) -> Option<&SiteScanState> {
        self.sites.get(site_id)
    }

    /// Forget files of `site_id` that are not in `current`. Returns how
    /// many entries were dropped.
    pub fn retain_files(&mut self, site_id: &str, current: &[PathBuf]) -> usize {
        let Some(site) = self.sites.get_mut(site_id) else {
            return 0;
        };
        let before = site.files.len();
        site.files.retain(|path, _| current.contains(path));
        before - site.files.len()
    }

    /// Drop every offset of one site.
    pub fn clear_site(&mut self, site_id: &str) {
        self.sites.remove(site_id);
    }

    /// Drop every offset of every site.
    pub fn clear_all(&mut self) {
        self.sites.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

// =============================================================================
// Parser result (per site, per pass)
// =============================================================================

/// Outcome of scanning one site during a pass. Not persisted.
#[derive(Debug)]
pub struct ParserResult {
    /// Display name of the site (empty if the site is unknown).
    pub site_name: String,
    pub site_id: String,
    /// Records accepted across every file of the site in this pass.
    pub total_entries: usize,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<ScanError>,
}

impl ParserResult {
    /// A successful result with no entries yet.
    pub fn empty(site_name: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            site_id: site_id.into(),
            total_entries: 0,
            duration: Duration::ZERO,
            success: true,
            error: None,
        }
    }

    /// Mark the result failed. A later failure replaces an earlier one.
    pub fn fail(&mut self, error: ScanError) {
        self.success = false;
        self.error = Some(error);
    }
}

// =============================================================================
// Normalised log record (handed to the record sink)
// =============================================================================

/// One access-log request, normalised across dialects and enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ip: String,
    /// Whether the request counts as a page view.
    pub pageview: bool,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// URL-decoded request path.
    pub url: String,
    pub status: u16,
    pub bytes_sent: u64,
    /// URL-decoded referer (may be empty or `-`).
    pub referer: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub domestic_location: String,
    pub global_location: String,
}

// =============================================================================
// Parsed line (output of a line parser, input to the record builder)
// =============================================================================

/// Raw fields of one matched line with its time already resolved.
///
/// Strings are as they appeared in the line (not yet URL-decoded); empty
/// means the field was not present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub referer: String,
    pub user_agent: String,
}

// =============================================================================
// Website configuration
// =============================================================================

/// Dialect family declared by a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogType {
    /// nginx access log; combined format unless a regex or template is set.
    Nginx,
    /// Caddy structured JSON access log.
    Caddy,
    /// Anything else. Only usable with an explicit regex or template.
    Other(String),
}

impl LogType {
    /// Interpret a configured log type; empty means nginx.
    pub fn from_config(raw: &str) -> Self {
        let normalised = raw.trim().to_ascii_lowercase();
        match normalised.as_str() {
            "" | DEFAULT_LOG_TYPE => LogType::Nginx,
            CADDY_LOG_TYPE => LogType::Caddy,
            _ => LogType::Other(normalised),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LogType::Nginx => DEFAULT_LOG_TYPE,
            LogType::Caddy => CADDY_LOG_TYPE,
            LogType::Other(s) => s,
        }
    }
}

/// One monitored website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub id: String,
    pub name: String,
    /// Log file path; may be a glob pattern.
    pub log_path: String,
    pub log_type: LogType,
    /// Custom regex with named groups. Highest priority.
    pub log_regex: Option<String>,
    /// nginx-style `log_format` template.
    pub log_format: Option<String>,
    /// strftime layout tried before the built-in time layouts.
    pub time_layout: Option<String>,
}

impl SiteConfig {
    /// Minimal nginx site with the default format.
    pub fn nginx(id: impl Into<String>, log_path: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            log_path: log_path.into(),
            log_type: LogType::Nginx,
            log_regex: None,
            log_format: None,
            time_layout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_type_from_config() {
        assert_eq!(LogType::from_config(""), LogType::Nginx);
        assert_eq!(LogType::from_config(" Caddy "), LogType::Caddy);
        assert_eq!(
            LogType::from_config("apache"),
            LogType::Other("apache".to_string())
        );
        assert_eq!(LogType::from_config("NGINX").as_str(), DEFAULT_LOG_TYPE);
        assert_eq!(LogType::Other("apache".to_string()).as_str(), "apache");
    }

    #[test]
    fn test_retain_files_drops_stale_paths() {
        let mut state = ScanState::default();
        let kept = PathBuf::from("/var/log/access.log");
        let stale = PathBuf::from("/var/log/access-20240101.log");
        state.record_file("main", &kept, FileState::default());
        state.record_file("main", &stale, FileState::default());

        assert_eq!(state.retain_files("main", &[kept.clone()]), 1);
        assert!(state.file("main", &kept).is_some());
        assert!(state.file("main", &stale).is_none());
        assert_eq!(state.retain_files("ghost", &[]), 0);
    }

    #[test]
    fn test_scan_state_json_shape() {
        let mut state = ScanState::default();
        state.record_file(
            "main",
            Path::new("/var/log/nginx/access.log"),
            FileState {
                last_offset: 10,
                last_size: 10,
            },
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json["main"]["files"]["/var/log/nginx/access.log"]["last_offset"],
            10
        );
    }

    #[test]
    fn test_clear_site_leaves_others() {
        let mut state = ScanState::default();
        let fs = FileState {
            last_offset: 1,
            last_size: 1,
        };
        state.record_file("a", Path::new("/a.log"), fs);
        state.record_file("b", Path::new("/b.log"), fs);
        state.clear_site("a");
        assert!(state.file("a", Path::new("/a.log")).is_none());
        assert_eq!(state.file("b", Path::new("/b.log")), Some(&fs));
    }

    #[test]
    fn test_parser_result_fail_sets_flags() {
        let mut r = ParserResult::empty("Main", "main");
        assert!(r.success);
        r.fail(ScanError::InProgress);
        assert!(!r.success);
        assert!(matches!(r.error, Some(ScanError::InProgress)));
    }
}
