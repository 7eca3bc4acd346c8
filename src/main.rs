// LogPulse - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading (before logging, so its level can apply)
// 3. Logging initialisation (debug mode support)
// 4. Wiring the coordinator to the JSON-lines record store
// 5. Dispatching the scan / reparse / reset / watch commands

use clap::{Parser, Subcommand};
use logpulse::app::coordinator::{CoordinatorSettings, ScanCoordinator};
use logpulse::app::state_store::ScanStateStore;
use logpulse::core::enrich::DefaultEnricher;
use logpulse::core::model::ParserResult;
use logpulse::core::sites::StaticSiteDirectory;
use logpulse::platform::config::{load_config, PlatformPaths};
use logpulse::platform::jsonl_sink::JsonLinesSink;
use logpulse::util;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// LogPulse - Incremental web-server access log ingestion.
///
/// Reads nginx, Caddy, and custom-format access logs, remembering how far
/// each file has been read so every line is ingested once.
#[derive(Parser, Debug)]
#[command(name = "LogPulse", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest new lines from every configured site (or one).
    Scan {
        #[arg(short = 's', long = "site")]
        site: Option<String>,
    },
    /// Drop stored records and offsets, then re-ingest from the start.
    Reparse {
        #[arg(short = 's', long = "site")]
        site: Option<String>,
    },
    /// Forget stored offsets without touching stored records.
    Reset {
        #[arg(short = 's', long = "site")]
        site: Option<String>,
    },
    /// Scan repeatedly, running the daily retention cleanup when due.
    Watch {
        /// Seconds between passes.
        #[arg(short = 'i', long = "interval", default_value_t = util::constants::DEFAULT_WATCH_INTERVAL_SECS)]
        interval: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| platform_paths.config_file());
    let (config, config_warnings) = load_config(&config_path);

    util::logging::init(cli.debug, config.log_level.as_deref());

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        config = %config_path.display(),
        "LogPulse starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let data_dir = config.resolve_data_dir(&platform_paths);
    let sink = Arc::new(JsonLinesSink::in_data_dir(&data_dir));
    let sites = Arc::new(StaticSiteDirectory::new(config.websites.clone()));
    if sites.is_empty() {
        tracing::warn!("No websites configured; nothing to scan");
    } else {
        tracing::info!(sites = sites.len(), data_dir = %data_dir.display(), "Websites loaded");
    }
    let coordinator = ScanCoordinator::new(
        sites,
        sink,
        Arc::new(DefaultEnricher::new()),
        ScanStateStore::in_dir(&data_dir),
        CoordinatorSettings {
            retention_days: config.retention_days,
            demo_mode: config.demo_mode,
        },
    );

    let code = match run_command(&coordinator, cli.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            1
        }
    };

    std::process::exit(code);
}

/// Run one CLI command. Returns the process exit code.
fn run_command(coordinator: &ScanCoordinator, command: Command) -> util::error::Result<i32> {
    match command {
        Command::Scan { site } => {
            let results = match site.as_deref() {
                Some(id) => coordinator.scan_site(id)?,
                None => coordinator.try_scan_all()?,
            };
            Ok(report(&results))
        }
        Command::Reparse { site } => {
            let handle = coordinator.trigger_reparse(site.as_deref())?;
            let poll = Duration::from_millis(util::constants::REPARSE_PROGRESS_POLL_MS);
            while !handle.is_finished() {
                let progress = coordinator.progress();
                tracing::info!(
                    scanned_bytes = progress.scanned_bytes,
                    total_bytes = progress.total_bytes,
                    percent = progress.fraction() * 100.0,
                    "Reparse in progress"
                );
                std::thread::sleep(poll);
            }
            Ok(report(&handle.join()))
        }
        Command::Reset { site } => {
            coordinator.reset_scan_state(site.as_deref());
            println!("Scan state reset ({})", site.as_deref().unwrap_or("all sites"));
            Ok(0)
        }
        Command::Watch { interval } => {
            watch(coordinator, interval);
            Ok(0)
        }
    }
}

/// Scan forever at `interval_secs`, cleaning expired records when due.
fn watch(coordinator: &ScanCoordinator, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(util::constants::MIN_WATCH_INTERVAL_SECS));
    tracing::info!(interval_secs = interval.as_secs(), "Watching access logs");
    loop {
        let results = coordinator.scan_all();
        let entries: usize = results.iter().map(|r| r.total_entries).sum();
        tracing::info!(sites = results.len(), entries, "Watch pass complete");

        if let Err(e) = coordinator.clean_expired_records(chrono::Local::now()) {
            tracing::warn!(error = %e, "Retention cleanup failed");
        }
        std::thread::sleep(interval);
    }
}

/// Print one line per site. Returns the process exit code.
fn report(results: &[ParserResult]) -> i32 {
    let mut failed = false;
    for result in results {
        let label = if result.site_name.is_empty() {
            result.site_id.as_str()
        } else {
            result.site_name.as_str()
        };
        match &result.error {
            None => println!(
                "{label}: {} entries in {:.2}s",
                result.total_entries,
                result.duration.as_secs_f64()
            ),
            Some(e) => {
                failed = true;
                println!(
                    "{label}: {} entries, failed: {e}",
                    result.total_entries
                );
            }
        }
    }
    i32::from(failed)
}
