// LogPulse - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; every error keeps its causal chain for
// diagnostic logging.
//
// Categories follow how the scanner reacts to them:
//   - FormatError: site configuration cannot produce a line parser (fatal for
//     that site's pass).
//   - ScanError: per-site or per-file failure, including the distinct
//     "already in progress" signal.
//   - LineError: a single line is discarded; never surfaced past the scanner.
//   - StateError / SinkError: persistence problems, logged by the coordinator.
//   - ConfigError: config.toml problems, reported as startup warnings.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogPulse operations.
#[derive(Debug)]
pub enum LogPulseError {
    /// A site's line format could not be compiled.
    Format(FormatError),

    /// A scan operation failed.
    Scan(ScanError),

    /// Scan state could not be persisted.
    State(StateError),

    /// The record sink rejected an operation.
    Sink(SinkError),

    /// Configuration loading or validation failed.
    Config(ConfigError),
}

impl fmt::Display for LogPulseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "Log format error: {e}"),
            Self::Scan(e) => write!(f, "Scan error: {e}"),
            Self::State(e) => write!(f, "Scan state error: {e}"),
            Self::Sink(e) => write!(f, "Record sink error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for LogPulseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::Scan(e) => Some(e),
            Self::State(e) => Some(e),
            Self::Sink(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Format errors
// ---------------------------------------------------------------------------

/// Errors raised while compiling a site's line parser.
#[derive(Debug)]
pub enum FormatError {
    /// The website configuration provider does not know this site.
    SiteNotFound { site_id: String },

    /// The site declares a log type with no built-in strategy and supplies
    /// neither a regex nor a format template.
    UnsupportedLogType { site_id: String, log_type: String },

    /// The format template is empty or whitespace.
    EmptyTemplate,

    /// The format template contains no `$variable` tokens.
    TemplateWithoutVariables { template: String },

    /// A pattern exceeds the maximum allowed length.
    RegexTooLong {
        origin: &'static str,
        length: usize,
        max_length: usize,
    },

    /// A pattern failed to compile.
    InvalidRegex {
        origin: &'static str,
        pattern: String,
        source: regex::Error,
    },

    /// The pattern has no named capture groups at all.
    NoNamedGroups { origin: &'static str },

    /// No capture group satisfies a mandatory semantic field.
    MissingField {
        origin: &'static str,
        field: &'static str,
        accepted: &'static [&'static str],
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SiteNotFound { site_id } => {
                write!(f, "no website configured with id '{site_id}'")
            }
            Self::UnsupportedLogType { site_id, log_type } => write!(
                f,
                "site '{site_id}': unsupported log type '{log_type}' \
                 (supply log_regex or log_format, or use nginx/caddy)"
            ),
            Self::EmptyTemplate => write!(f, "log_format must not be empty"),
            Self::TemplateWithoutVariables { template } => {
                write!(f, "log_format '{template}' contains no $variables")
            }
            Self::RegexTooLong {
                origin,
                length,
                max_length,
            } => write!(
                f,
                "{origin} pattern is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::InvalidRegex {
                origin,
                pattern,
                source,
            } => write!(f, "invalid {origin} pattern '{pattern}': {source}"),
            Self::NoNamedGroups { origin } => {
                write!(f, "{origin} pattern must contain named capture groups")
            }
            Self::MissingField {
                origin,
                field,
                accepted,
            } => write!(
                f,
                "{origin} pattern has no {field} field (expected one of: {})",
                accepted.join(", ")
            ),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FormatError> for LogPulseError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Errors produced by scan passes and scan-triggering operations.
#[derive(Debug)]
pub enum ScanError {
    /// Another scan pass holds the single-flight lock.
    InProgress,

    /// The site's line parser could not be built.
    Format(FormatError),

    /// The configured log path is not a valid glob pattern.
    GlobPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// The configured glob pattern matched no files.
    NoGlobMatches { pattern: String },

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// The record sink failed while clearing records for a reparse.
    Sink(SinkError),
}

impl ScanError {
    /// True for the "scan already running" signal, so callers can present a
    /// busy state instead of a generic failure.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "a log scan is already in progress, retry later"),
            Self::Format(e) => write!(f, "{e}"),
            Self::GlobPattern { pattern, source } => {
                write!(f, "invalid log path pattern '{pattern}': {source}")
            }
            Self::NoGlobMatches { pattern } => {
                write!(f, "log path pattern '{pattern}' matched no files")
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Sink(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::GlobPattern { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for ScanError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<SinkError> for ScanError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

impl From<ScanError> for LogPulseError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

// ---------------------------------------------------------------------------
// Line errors
// ---------------------------------------------------------------------------

/// Why a JSON field could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    /// The key is missing or null.
    Absent,
    /// The key is present but holds a value of another type.
    WrongType { expected: &'static str },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::WrongType { expected } => write!(f, "not a {expected}"),
        }
    }
}

/// Reasons a single log line is discarded.
#[derive(Debug)]
pub enum LineError {
    /// The line does not match the site's pattern.
    NoMatch,

    /// A mandatory field is missing or empty.
    MissingField { field: &'static str },

    /// The request line could not be split into method and URL.
    InvalidRequestLine { request: String },

    /// The status code is not a positive integer.
    InvalidStatus { raw: String },

    /// The time token could not be resolved.
    Timestamp(TimeError),

    /// The record is older than the retention window.
    Expired {
        timestamp: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    },

    /// The line is not a JSON object.
    Json { source: serde_json::Error },

    /// A JSON field required by the structured strategy is unusable.
    JsonField {
        field: &'static str,
        problem: FieldProblem,
    },
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => write!(f, "line does not match the log format"),
            Self::MissingField { field } => write!(f, "line is missing the {field} field"),
            Self::InvalidRequestLine { request } => {
                write!(f, "invalid request line '{request}'")
            }
            Self::InvalidStatus { raw } => write!(f, "invalid status code '{raw}'"),
            Self::Timestamp(e) => write!(f, "{e}"),
            Self::Expired { timestamp, cutoff } => write!(
                f,
                "record at {timestamp} is older than the retention cutoff {cutoff}"
            ),
            Self::Json { source } => write!(f, "invalid JSON line: {source}"),
            Self::JsonField { field, problem } => {
                write!(f, "JSON field '{field}' is {problem}")
            }
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timestamp(e) => Some(e),
            Self::Json { source } => Some(source),
            _ => None,
        }
    }
}

impl From<TimeError> for LineError {
    fn from(e: TimeError) -> Self {
        Self::Timestamp(e)
    }
}

// ---------------------------------------------------------------------------
// Time errors
// ---------------------------------------------------------------------------

/// Errors from the time resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The time token is empty.
    Empty,

    /// No epoch interpretation or layout accepted the token.
    Unparseable { raw: String, layouts_tried: usize },

    /// A JSON time value is neither a number nor a string.
    UnsupportedValue,
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty time value"),
            Self::Unparseable { raw, layouts_tried } => write!(
                f,
                "cannot parse time '{raw}' (tried epoch and {layouts_tried} layouts)"
            ),
            Self::UnsupportedValue => write!(f, "time value is neither a number nor a string"),
        }
    }
}

impl std::error::Error for TimeError {}

// ---------------------------------------------------------------------------
// State errors
// ---------------------------------------------------------------------------

/// Errors writing the durable scan state document.
#[derive(Debug)]
pub enum StateError {
    /// The state could not be serialised.
    Serialise { source: serde_json::Error },

    /// The state directory could not be created.
    CreateDir { path: PathBuf, source: io::Error },

    /// The temporary state file could not be written.
    Write { path: PathBuf, source: io::Error },

    /// The temporary file could not be renamed over the state file.
    Rename { path: PathBuf, source: io::Error },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialise { source } => write!(f, "cannot serialise scan state: {source}"),
            Self::CreateDir { path, source } => write!(
                f,
                "cannot create state directory '{}': {source}",
                path.display()
            ),
            Self::Write { path, source } => {
                write!(f, "cannot write state file '{}': {source}", path.display())
            }
            Self::Rename { path, source } => write!(
                f,
                "cannot finalise state file '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialise { source } => Some(source),
            Self::CreateDir { source, .. } => Some(source),
            Self::Write { source, .. } => Some(source),
            Self::Rename { source, .. } => Some(source),
        }
    }
}

impl From<StateError> for LogPulseError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

// ---------------------------------------------------------------------------
// Sink errors
// ---------------------------------------------------------------------------

/// Errors from a record sink implementation.
#[derive(Debug)]
pub enum SinkError {
    /// I/O error on a sink-owned file.
    Io { path: PathBuf, source: io::Error },

    /// A record could not be (de)serialised.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "record store I/O error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "record store JSON error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<SinkError> for LogPulseError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// A website entry is unusable and was dropped.
    InvalidWebsite { index: usize, reason: String },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::InvalidWebsite { index, reason } => {
                write!(f, "Config [[websites]] entry #{index} skipped: {reason}")
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogPulseError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogPulse results.
pub type Result<T> = std::result::Result<T, LogPulseError>;
