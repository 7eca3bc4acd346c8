// LogPulse - app/coordinator.rs
//
// Scan coordination: single-flight passes over configured sites, reparse,
// state reset, progress, and the daily retention cleanup trigger.
//
// Architecture:
//   - `ScanCoordinator` is a cheap `Arc` handle; clones share one state.
//   - A pass runs on the caller's thread while holding a `FlightGuard`.
//     Reparse moves its guard into a background thread, so no other pass
//     can start until that rescan finishes.
//   - Per-site failures are captured in that site's `ParserResult`; they
//     never abort the other sites.
//   - Scan state is persisted after every pass, reset, and reparse.
//     Persistence failures are logged and the results still returned.

use crate::app::file_scan::{expand_log_path, scannable_bytes, FileScanner};
use crate::app::flight::{FlightGuard, ProgressSnapshot, ScanFlight};
use crate::app::sink::RecordSink;
use crate::app::state_store::ScanStateStore;
use crate::core::enrich::Enricher;
use crate::core::model::{FileState, ParserResult, ScanState, SiteConfig};
use crate::core::parser::LineParser;
use crate::core::record::RecordBuilder;
use crate::core::sites::SiteDirectory;
use crate::util::constants::{CLEANUP_HOUR, DEFAULT_RETENTION_DAYS};
use crate::util::error::{FormatError, ScanError, SinkError};
use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

/// Behavioural settings of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub retention_days: u32,
    /// Read-only showcase mode: scans do nothing.
    pub demo_mode: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            demo_mode: false,
        }
    }
}

/// Handle to a reparse running in the background.
#[derive(Debug)]
pub struct ReparseHandle {
    thread: Option<JoinHandle<Vec<ParserResult>>>,
}

impl ReparseHandle {
    fn completed() -> Self {
        Self { thread: None }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the rescan and return its results.
    pub fn join(self) -> Vec<ParserResult> {
        let Some(thread) = self.thread else {
            return Vec::new();
        };
        match thread.join() {
            Ok(results) => results,
            Err(_) => {
                tracing::error!("Reparse thread panicked");
                Vec::new()
            }
        }
    }
}

struct Inner {
    sites: Arc<dyn SiteDirectory>,
    sink: Arc<dyn RecordSink>,
    enricher: Arc<dyn Enricher>,
    store: ScanStateStore,
    settings: CoordinatorSettings,
    state: Mutex<ScanState>,
    parsers: Mutex<HashMap<String, Arc<LineParser>>>,
    flight: ScanFlight,
    last_cleanup: Mutex<Option<NaiveDate>>,
}

/// Process-wide scan coordinator.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

impl ScanCoordinator {
    /// Build a coordinator, loading persisted scan state and initialising
    /// the enricher's filters.
    pub fn new(
        sites: Arc<dyn SiteDirectory>,
        sink: Arc<dyn RecordSink>,
        enricher: Arc<dyn Enricher>,
        store: ScanStateStore,
        settings: CoordinatorSettings,
    ) -> Self {
        let state = store.load();
        enricher.init_filters();
        tracing::info!(
            state_file = %store.path().display(),
            retention_days = settings.retention_days,
            demo_mode = settings.demo_mode,
            "Scan coordinator ready"
        );
        Self {
            inner: Arc::new(Inner {
                sites,
                sink,
                enricher,
                store,
                settings,
                state: Mutex::new(state),
                parsers: Mutex::new(HashMap::new()),
                flight: ScanFlight::new(),
                last_cleanup: Mutex::new(None),
            }),
        }
    }

    /// Scan every configured site. Empty when another pass is running or in
    /// demo mode.
    pub fn scan_all(&self) -> Vec<ParserResult> {
        match self.try_scan_all() {
            Ok(results) => results,
            Err(e) => {
                tracing::debug!(error = %e, "Scan pass not started");
                Vec::new()
            }
        }
    }

    /// Like `scan_all` but reports a running pass as `ScanError::InProgress`.
    pub fn try_scan_all(&self) -> Result<Vec<ParserResult>, ScanError> {
        if self.inner.settings.demo_mode {
            return Ok(Vec::new());
        }
        let guard = self.inner.flight.try_acquire().ok_or(ScanError::InProgress)?;
        let ids = self.inner.sites.site_ids();
        Ok(self.inner.run_pass(&guard, &ids))
    }

    /// Scan one site.
    pub fn scan_site(&self, site_id: &str) -> Result<Vec<ParserResult>, ScanError> {
        if self.inner.settings.demo_mode {
            return Ok(Vec::new());
        }
        let guard = self.inner.flight.try_acquire().ok_or(ScanError::InProgress)?;
        Ok(self.inner.run_pass(&guard, &[site_id.to_string()]))
    }

    /// Clear stored records and offsets for one site (or all), then rescan
    /// in the background while still holding the scan lock.
    pub fn trigger_reparse(&self, site_id: Option<&str>) -> Result<ReparseHandle, ScanError> {
        if self.inner.settings.demo_mode {
            self.inner.clear_records(site_id)?;
            self.reset_scan_state(site_id);
            return Ok(ReparseHandle::completed());
        }

        let guard = self.inner.flight.try_acquire().ok_or(ScanError::InProgress)?;
        let ids = match site_id {
            Some(id) => vec![id.to_string()],
            None => self.inner.sites.site_ids(),
        };

        // Dropping the guard on this early return releases the lock.
        self.inner.clear_records(site_id)?;
        self.reset_scan_state(site_id);
        self.invalidate_parser(site_id);

        tracing::info!(scope = site_id.unwrap_or("all"), "Reparse started");
        let inner = Arc::clone(&self.inner);
        let thread = std::thread::spawn(move || {
            let results = inner.run_pass(&guard, &ids);
            drop(guard);
            tracing::info!(sites = results.len(), "Reparse finished");
            results
        });
        Ok(ReparseHandle {
            thread: Some(thread),
        })
    }

    /// Drop stored offsets for one site (or all) and persist. Stored
    /// records are left alone.
    pub fn reset_scan_state(&self, site_id: Option<&str>) {
        {
            let mut state = self.inner.lock_state();
            match site_id {
                Some(id) => state.clear_site(id),
                None => state.clear_all(),
            }
        }
        tracing::info!(scope = site_id.unwrap_or("all"), "Scan state reset");
        self.inner.persist_state();
    }

    /// Forget the compiled parser of one site (or all) so the next pass
    /// recompiles it from the current configuration.
    pub fn invalidate_parser(&self, site_id: Option<&str>) {
        let mut parsers = self.inner.lock_parsers();
        match site_id {
            Some(id) => {
                parsers.remove(id);
            }
            None => parsers.clear(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.flight.is_active()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.flight.progress()
    }

    /// Copy of the current in-memory scan state.
    pub fn scan_state(&self) -> ScanState {
        self.inner.lock_state().clone()
    }

    /// Run the sink's retention cleanup when due: on the first call of the
    /// process, then once per local day during `CLEANUP_HOUR`.
    ///
    /// Returns whether the cleanup ran.
    pub fn clean_expired_records(&self, now: DateTime<Local>) -> Result<bool, SinkError> {
        let today = now.date_naive();
        let mut last = self
            .inner
            .last_cleanup
            .lock()
            .unwrap_or_else(|p| p.into_inner());

        let due = match *last {
            None => true,
            Some(day) => now.hour() == CLEANUP_HOUR && day != today,
        };
        if !due {
            return Ok(false);
        }

        let removed = self
            .inner
            .sink
            .clean_expired(self.inner.settings.retention_days)?;
        *last = Some(today);
        tracing::info!(
            removed,
            retention_days = self.inner.settings.retention_days,
            "Expired records cleaned"
        );
        Ok(true)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_parsers(&self) -> MutexGuard<'_, HashMap<String, Arc<LineParser>>> {
        self.parsers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn prior_state(&self, site_id: &str, path: &Path) -> Option<FileState> {
        self.lock_state().file(site_id, path).copied()
    }

    fn persist_state(&self) {
        let snapshot = self.lock_state().clone();
        if let Err(e) = self.store.save(&snapshot) {
            tracing::error!(error = %e, "Failed to persist scan state");
        }
    }

    fn clear_records(&self, site_id: Option<&str>) -> Result<(), SinkError> {
        match site_id {
            Some(id) => self.sink.clear_site(id),
            None => self.sink.clear_all(),
        }
    }

    /// Cached parser for `site`, compiled on first use.
    fn parser_for(&self, site: &SiteConfig) -> Result<Arc<LineParser>, FormatError> {
        let mut parsers = self.lock_parsers();
        if let Some(parser) = parsers.get(&site.id) {
            return Ok(Arc::clone(parser));
        }
        let parser = Arc::new(LineParser::compile(site)?);
        tracing::debug!(
            site = %site.id,
            log_type = site.log_type.as_str(),
            source = %parser.source(),
            "Line parser compiled"
        );
        parsers.insert(site.id.clone(), Arc::clone(&parser));
        Ok(parser)
    }

    /// One guarded pass over `ids`, in order.
    fn run_pass(&self, guard: &FlightGuard, ids: &[String]) -> Vec<ParserResult> {
        let started = Instant::now();
        guard.set_total(self.total_scannable_bytes(ids));

        let now = Utc::now();
        let results: Vec<ParserResult> = ids
            .iter()
            .map(|id| self.scan_one_site(id, guard, now))
            .collect();

        self.persist_state();

        tracing::info!(
            sites = results.len(),
            entries = results.iter().map(|r| r.total_entries).sum::<usize>(),
            failed = results.iter().filter(|r| !r.success).count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Scan pass complete"
        );
        results
    }

    fn total_scannable_bytes(&self, ids: &[String]) -> u64 {
        let mut total = 0u64;
        for id in ids {
            let Some(site) = self.sites.site(id) else {
                continue;
            };
            let paths = match expand_log_path(&site.log_path) {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::warn!(site = %id, error = %e, "Cannot size log path");
                    continue;
                }
            };
            for path in paths {
                let prior = self.prior_state(id, &path);
                total += scannable_bytes(&path, prior.as_ref());
            }
        }
        total
    }

    fn scan_one_site(&self, site_id: &str, guard: &FlightGuard, now: DateTime<Utc>) -> ParserResult {
        let started = Instant::now();

        let Some(site) = self.sites.site(site_id) else {
            tracing::warn!(site = %site_id, "Unknown site requested");
            let mut result = ParserResult::empty("", site_id);
            result.fail(
                FormatError::SiteNotFound {
                    site_id: site_id.to_string(),
                }
                .into(),
            );
            return result;
        };

        let mut result = ParserResult::empty(site.name.clone(), site_id);

        let parser = match self.parser_for(&site) {
            Ok(parser) => parser,
            Err(e) => {
                tracing::error!(site = %site_id, error = %e, "Line parser unavailable");
                result.fail(e.into());
                result.duration = started.elapsed();
                return result;
            }
        };

        let paths = match expand_log_path(&site.log_path) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(site = %site_id, error = %e, "Log path unusable");
                result.fail(e);
                result.duration = started.elapsed();
                return result;
            }
        };

        let dropped = self.lock_state().retain_files(site_id, &paths);
        if dropped > 0 {
            tracing::debug!(site = %site_id, dropped, "Offsets of vanished files dropped");
        }

        let builder = RecordBuilder::new(self.settings.retention_days, self.enricher.as_ref());
        let scanner = FileScanner {
            site_id,
            parser: &parser,
            builder: &builder,
            enricher: self.enricher.as_ref(),
            sink: self.sink.as_ref(),
            progress: guard,
            now,
        };

        for path in paths {
            let prior = self.prior_state(site_id, &path);
            match scanner.scan_file(&path, prior) {
                Ok(outcome) => {
                    result.total_entries += outcome.entries;
                    if let Some(state) = outcome.state {
                        self.lock_state().record_file(site_id, &path, state);
                    }
                }
                Err(e) => {
                    tracing::error!(site = %site_id, error = %e, "Log file skipped for this pass");
                    result.fail(e);
                }
            }
        }

        result.duration = started.elapsed();
        tracing::debug!(
            site = %site_id,
            entries = result.total_entries,
            success = result.success,
            duration_ms = result.duration.as_millis() as u64,
            "Site scanned"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::sink::MemorySink;
    use crate::core::enrich::DefaultEnricher;
    use crate::core::model::LogType;
    use crate::core::sites::StaticSiteDirectory;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn line(ip: &str) -> String {
        let ts = Utc::now().format("%d/%b/%Y:%H:%M:%S %z");
        format!("{ip} - - [{ts}] \"GET / HTTP/1.1\" 200 1 \"-\" \"-\"\n")
    }

    fn coordinator(
        dir: &TempDir,
        sites: Vec<SiteConfig>,
        settings: CoordinatorSettings,
    ) -> (ScanCoordinator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let coord = ScanCoordinator::new(
            Arc::new(StaticSiteDirectory::new(sites)),
            sink.clone(),
            Arc::new(DefaultEnricher::new()),
            ScanStateStore::in_dir(dir.path()),
            settings,
        );
        (coord, sink)
    }

    #[test]
    fn test_scan_persists_state() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, line("1.1.1.1")).unwrap();
        let site = SiteConfig::nginx("main", log.to_string_lossy());

        let (coord, sink) = coordinator(&dir, vec![site.clone()], CoordinatorSettings::default());
        let results = coord.scan_all();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].total_entries, 1);
        assert_eq!(sink.count("main"), 1);

        // A fresh coordinator resumes from the persisted offset.
        let (again, _) = coordinator(&dir, vec![site], CoordinatorSettings::default());
        assert_eq!(again.scan_all()[0].total_entries, 0);
    }

    #[test]
    fn test_site_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, line("1.1.1.1")).unwrap();

        let mut bad = SiteConfig::nginx("bad", log.to_string_lossy());
        bad.log_type = LogType::Other("iis".to_string());
        let missing = SiteConfig::nginx("missing", dir.path().join("nope.log").to_string_lossy());
        let good = SiteConfig::nginx("good", log.to_string_lossy());

        let (coord, _) = coordinator(&dir, vec![bad, missing, good], CoordinatorSettings::default());
        let results = coord.scan_all();
        assert_eq!(results.len(), 3);
        assert!(matches!(
            results[0].error,
            Some(ScanError::Format(FormatError::UnsupportedLogType { .. }))
        ));
        assert!(matches!(results[1].error, Some(ScanError::Io { .. })));
        assert!(results[2].success);
        assert_eq!(results[2].total_entries, 1);
    }

    #[test]
    fn test_unknown_site() {
        let dir = TempDir::new().unwrap();
        let (coord, _) = coordinator(&dir, vec![], CoordinatorSettings::default());
        let results = coord.scan_site("ghost").unwrap();
        assert!(matches!(
            results[0].error,
            Some(ScanError::Format(FormatError::SiteNotFound { .. }))
        ));
    }

    #[test]
    fn test_busy_lock_reported() {
        let dir = TempDir::new().unwrap();
        let (coord, _) = coordinator(&dir, vec![], CoordinatorSettings::default());
        let _held = coord.inner.flight.try_acquire().unwrap();
        assert!(coord.scan_all().is_empty());
        assert!(matches!(coord.try_scan_all(), Err(ScanError::InProgress)));
        assert!(coord.scan_site("main").unwrap_err().is_in_progress());
        assert!(matches!(coord.trigger_reparse(None), Err(ScanError::InProgress)));
    }

    #[test]
    fn test_demo_mode_is_inert() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, line("1.1.1.1")).unwrap();
        let settings = CoordinatorSettings {
            demo_mode: true,
            ..CoordinatorSettings::default()
        };
        let (coord, sink) = coordinator(
            &dir,
            vec![SiteConfig::nginx("main", log.to_string_lossy())],
            settings,
        );
        assert!(coord.scan_all().is_empty());
        assert!(coord.scan_site("main").unwrap().is_empty());
        let handle = coord.trigger_reparse(None).unwrap();
        assert!(handle.is_finished());
        assert!(handle.join().is_empty());
        assert_eq!(sink.count("main"), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, line("1.1.1.1")).unwrap();
        let (coord, sink) = coordinator(
            &dir,
            vec![SiteConfig::nginx("main", log.to_string_lossy())],
            CoordinatorSettings::default(),
        );
        coord.scan_all();
        coord.reset_scan_state(Some("main"));
        coord.reset_scan_state(Some("main"));
        assert!(coord.scan_state().site("main").is_none());
        // Records are untouched; the next pass reads the file again.
        assert_eq!(sink.count("main"), 1);
        assert_eq!(coord.scan_all()[0].total_entries, 1);
        assert_eq!(sink.count("main"), 2);
    }

    #[test]
    fn test_reparse_holds_lock_until_done() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, format!("{}{}", line("1.1.1.1"), line("2.2.2.2"))).unwrap();
        let (coord, sink) = coordinator(
            &dir,
            vec![SiteConfig::nginx("main", log.to_string_lossy())],
            CoordinatorSettings::default(),
        );
        coord.scan_all();
        assert_eq!(sink.count("main"), 2);

        let handle = coord.trigger_reparse(Some("main")).unwrap();
        while !handle.is_finished() {
            std::thread::yield_now();
        }
        let results = handle.join();
        assert_eq!(results[0].total_entries, 2);
        assert_eq!(sink.count("main"), 2);
        assert!(!coord.is_scanning());
        assert_eq!(coord.progress().scanned_bytes, coord.progress().total_bytes);
    }

    #[test]
    fn test_offsets_of_vanished_files_are_dropped() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("access-1.log");
        let new = dir.path().join("access-2.log");
        std::fs::write(&old, line("1.1.1.1")).unwrap();
        std::fs::write(&new, line("2.2.2.2")).unwrap();
        let pattern = dir.path().join("access-*.log");
        let (coord, _) = coordinator(
            &dir,
            vec![SiteConfig::nginx("main", pattern.to_string_lossy())],
            CoordinatorSettings::default(),
        );

        coord.scan_all();
        assert_eq!(coord.scan_state().site("main").unwrap().files.len(), 2);

        std::fs::remove_file(&old).unwrap();
        assert!(coord.scan_all()[0].success);
        let state = coord.scan_state();
        assert!(state.file("main", &old).is_none());
        assert!(state.file("main", &new).is_some());
    }

    #[test]
    fn test_huge_retention_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        std::fs::write(&log, line("1.1.1.1")).unwrap();
        let settings = CoordinatorSettings {
            retention_days: u32::MAX,
            ..CoordinatorSettings::default()
        };
        let (coord, sink) = coordinator(
            &dir,
            vec![SiteConfig::nginx("main", log.to_string_lossy())],
            settings,
        );
        assert_eq!(coord.scan_all()[0].total_entries, 1);
        assert_eq!(sink.count("main"), 1);
        assert!(coord.clean_expired_records(Local::now()).unwrap());
    }

    #[test]
    fn test_cleanup_schedule() {
        let dir = TempDir::new().unwrap();
        let (coord, _) = coordinator(&dir, vec![], CoordinatorSettings::default());
        let at = |d: u32, h: u32| Local.with_ymd_and_hms(2024, 5, d, h, 30, 0).unwrap();

        assert!(coord.clean_expired_records(at(1, 14)).unwrap(), "first call always runs");
        assert!(!coord.clean_expired_records(at(1, 15)).unwrap());
        assert!(!coord.clean_expired_records(at(2, 14)).unwrap(), "outside cleanup hour");
        assert!(coord.clean_expired_records(at(2, CLEANUP_HOUR)).unwrap());
        assert!(!coord.clean_expired_records(at(2, CLEANUP_HOUR)).unwrap(), "once per day");
    }
}
