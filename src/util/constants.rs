// LogPulse - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogPulse";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogPulse";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Scanning
// =============================================================================

/// Number of normalised records accumulated before a batch is enriched and
/// handed to the record sink.
pub const BATCH_SIZE: usize = 100;

/// Consumed bytes are published to the progress counters in chunks of this
/// size rather than per line.
pub const PROGRESS_CHUNK_BYTES: u64 = 64 * 1024; // 64 KiB

/// Lines longer than this are counted as consumed and skipped without
/// being parsed. Guards against binary content with no newlines.
pub const MAX_LINE_BYTES: usize = 1024 * 1024; // 1 MiB

/// File-name suffix (case-insensitive) that marks a gzip-compressed log.
pub const GZIP_SUFFIX: &str = ".gz";

/// Characters that turn a configured log path into a glob pattern.
pub const GLOB_METACHARACTERS: &[char] = &['*', '?', '['];

// =============================================================================
// Retention
// =============================================================================

/// Default number of days a record is kept. Older lines are parsed but
/// discarded at ingest.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Smallest accepted retention window.
pub const MIN_RETENTION_DAYS: u32 = 1;

/// Largest accepted retention window (roughly ten years).
pub const MAX_RETENTION_DAYS: u32 = 3_650;

/// Local hour of day (0-23) during which the daily retention cleanup may run.
pub const CLEANUP_HOUR: u32 = 2;

// =============================================================================
// Line formats
// =============================================================================

/// Built-in pattern for the canonical nginx/Apache combined log format.
pub const DEFAULT_NGINX_PATTERN: &str = r#"^(?P<ip>\S+) - (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<url>[^"]+) HTTP/\d\.\d" (?P<status>\d+) (?P<bytes>\d+) "(?P<referer>[^"]*)" "(?P<ua>[^"]*)""#;

/// chrono layout of the canonical access-log timestamp
/// (e.g. `10/Oct/2023:13:55:36 -0700`).
pub const ACCESS_LOG_TIME_LAYOUT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Naive ISO-8601 layout tried last, interpreted as UTC.
pub const NAIVE_ISO_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Epoch values above this magnitude are treated as milliseconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Log type used when a site does not declare one.
pub const DEFAULT_LOG_TYPE: &str = "nginx";

/// Log type selecting the built-in Caddy JSON strategy.
pub const CADDY_LOG_TYPE: &str = "caddy";

// =============================================================================
// Record defaults
// =============================================================================

/// Location value used when enrichment has no match for an IP.
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Placeholder stored for requests that carried no user agent.
pub const EMPTY_USER_AGENT: &str = "-";

// =============================================================================
// Watch loop
// =============================================================================

/// Default seconds between scan passes in `logpulse watch`.
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

/// Smallest accepted watch interval.
pub const MIN_WATCH_INTERVAL_SECS: u64 = 1;

/// How often the CLI reports progress while waiting for a reparse.
pub const REPARSE_PROGRESS_POLL_MS: u64 = 500;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration and persistence
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Scan state file name (stored in the data directory).
pub const STATE_FILE_NAME: &str = "scan_state.json";

/// Subdirectory of the data directory holding the JSON-lines record files.
pub const RECORDS_DIR_NAME: &str = "records";
