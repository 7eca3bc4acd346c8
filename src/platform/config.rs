// LogPulse - platform/config.rs
//
// Platform-specific data directory resolution and config.toml loading with
// startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::{LogType, SiteConfig};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogPulse configuration and data.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logpulse/ or %APPDATA%\LogPulse\)
    pub config_dir: PathBuf,

    /// Data directory for scan state and record files.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[system]` section.
    pub system: SystemSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
    /// `[[websites]]` entries.
    pub websites: Vec<RawWebsite>,
}

/// `[system]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SystemSection {
    /// Directory for scan state and record files.
    pub data_dir: Option<String>,
    /// Days a record is kept.
    pub log_retention_days: Option<i64>,
    /// Read-only showcase mode.
    pub demo_mode: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// One `[[websites]]` entry.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawWebsite {
    pub id: String,
    pub name: String,
    pub log_path: String,
    pub log_type: String,
    pub log_regex: String,
    pub log_format: String,
    pub time_layout: String,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Overrides the platform data directory when set.
    pub data_dir: Option<PathBuf>,
    pub retention_days: u32,
    pub demo_mode: bool,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Usable websites, in declaration order.
    pub websites: Vec<SiteConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention_days: constants::DEFAULT_RETENTION_DAYS,
            demo_mode: false,
            log_level: None,
            websites: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Data directory to use: the configured one, else the platform default.
    pub fn resolve_data_dir(&self, paths: &PlatformPaths) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| paths.data_dir.clone())
    }
}

/// Load and validate `config.toml` at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first run).
/// If the file is unreadable or unparseable, returns defaults with a warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            tracing::warn!(error = %err, "Using default configuration");
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source,
            };
            tracing::warn!(error = %err, "Using default configuration");
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let (config, validation) = validate(raw);
    warnings.extend(validation.iter().map(ToString::to_string));

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Validate every field against named constants, accumulating all problems.
fn validate(raw: RawConfig) -> (AppConfig, Vec<ConfigError>) {
    let mut config = AppConfig::default();
    let mut problems = Vec::new();

    // -- System: data_dir --
    if let Some(dir) = raw.system.data_dir.filter(|d| !d.trim().is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }

    // -- System: log_retention_days --
    if let Some(days) = raw.system.log_retention_days {
        let range = i64::from(constants::MIN_RETENTION_DAYS)..=i64::from(constants::MAX_RETENTION_DAYS);
        match u32::try_from(days) {
            Ok(d) if range.contains(&days) => config.retention_days = d,
            _ => problems.push(ConfigError::ValueOutOfRange {
                field: "system.log_retention_days".to_string(),
                value: days.to_string(),
                expected: format!(
                    "{}-{} (using default {})",
                    constants::MIN_RETENTION_DAYS,
                    constants::MAX_RETENTION_DAYS,
                    constants::DEFAULT_RETENTION_DAYS
                ),
            }),
        }
    }

    // -- System: demo_mode --
    if let Some(demo) = raw.system.demo_mode {
        config.demo_mode = demo;
    }

    // -- Logging: level --
    if let Some(level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level);
        } else {
            problems.push(ConfigError::ValueOutOfRange {
                field: "logging.level".to_string(),
                value: level,
                expected: "error, warn, info, debug, trace (using default info)".to_string(),
            });
        }
    }

    // -- Websites --
    let mut seen: HashSet<String> = HashSet::new();
    for (index, site) in raw.websites.into_iter().enumerate() {
        let id = site.id.trim().to_string();
        let reason = if id.is_empty() {
            Some("missing id".to_string())
        } else if seen.contains(&id) {
            Some(format!("duplicate id '{id}'"))
        } else if site.log_path.trim().is_empty() {
            Some(format!("site '{id}' has no log_path"))
        } else {
            None
        };
        if let Some(reason) = reason {
            problems.push(ConfigError::InvalidWebsite { index, reason });
            continue;
        }

        seen.insert(id.clone());
        let name = if site.name.trim().is_empty() {
            id.clone()
        } else {
            site.name
        };
        config.websites.push(SiteConfig {
            id,
            name,
            log_path: site.log_path.trim().to_string(),
            log_type: LogType::from_config(&site.log_type),
            log_regex: non_empty(site.log_regex),
            log_format: non_empty(site.log_format),
            time_layout: non_empty(site.time_layout),
        });
    }

    (config, problems)
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
