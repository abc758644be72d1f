// # ctcache - Container cache maintenance tool
//
// This binary is a THIN layer over ctcache-core:
// - It reads configuration from the environment
// - It opens the configured store
// - It runs one maintenance command and exits
//
// It never talks to the remote system. Validation reads a container
// listing exported by whatever tool owns the remote connection.
//
// ## Configuration
//
// - `CTCACHE_ENABLED`: `false`, `0` or `no` disables the cache
// - `CTCACHE_STORE`: Store type (file, memory)
// - `CTCACHE_PATH`: Cache file path (default: `~/.ctcache/cache.json`)
// - `CTCACHE_MAX_AGE_DAYS`: Default purge window in days (default: 30)
// - `CTCACHE_LOG_LEVEL`: Log level (default: warn); logs go to stderr
//
// ## Example
//
// ```bash
// ctcache stats --container "Blocked IPs"
// ctcache list --container "Blocked IPs" --format json
// ctcache purge --container "Blocked IPs" --days 60 --yes
// ctcache validate --remote containers.json
// ```

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ctcache_core::{CacheConfig, CacheService, RemoteContainer, open_cache};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, debug, error};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the maintenance tool
///
/// - 0: Command completed (or was declined at the prompt)
/// - 1: Configuration error
/// - 2: Runtime error (store unavailable, unreadable input)
#[derive(Debug, Clone, Copy)]
enum CtcacheExitCode {
    /// Command completed
    Success = 0,
    /// Configuration error or disabled cache
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<CtcacheExitCode> for ExitCode {
    fn from(code: CtcacheExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "ctcache")]
#[command(version, about = "Inspect and maintain the local container cache")]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show cache statistics, globally or for one container
    Stats {
        /// Container name
        #[arg(short, long)]
        container: Option<String>,
    },

    /// List the cached values of a container
    List {
        /// Container name
        #[arg(short, long)]
        container: String,
    },

    /// Remove entries not seen within the staleness window
    Purge {
        /// Container name
        #[arg(short, long)]
        container: String,

        /// Staleness window in days (default: CTCACHE_MAX_AGE_DAYS)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=3650))]
        days: Option<u32>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Drop every cached entry of a container
    Clear {
        /// Container name
        #[arg(short, long)]
        container: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List every container the cache has recorded
    Containers,

    /// Compare an exported remote container listing with the cache
    Validate {
        /// JSON array of {"name", "kind", "size"} objects
        #[arg(short, long, value_name = "FILE")]
        remote: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = env::var("CTCACHE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let log_level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!(
                "CTCACHE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            );
            return CtcacheExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CtcacheExitCode::ConfigError.into();
    }

    // Load configuration from environment
    let config = match CacheConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CtcacheExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CtcacheExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let cache = match open_cache(&config).await {
            Ok(Some(cache)) => cache,
            Ok(None) => {
                eprintln!("Cache is disabled (CTCACHE_ENABLED). Nothing to do.");
                return CtcacheExitCode::ConfigError;
            }
            Err(e) => {
                error!("Failed to open cache: {}", e);
                eprintln!("Error: {}", e);
                return CtcacheExitCode::RuntimeError;
            }
        };

        match run_command(&cache, &config, cli.command, cli.format).await {
            Ok(()) => CtcacheExitCode::Success,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                CtcacheExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run one maintenance command against an opened cache
async fn run_command(
    cache: &CacheService,
    config: &CacheConfig,
    command: Command,
    format: OutputFormat,
) -> Result<()> {
    let now = chrono::Utc::now();

    match command {
        Command::Stats { container } => {
            let stats = cache.cache_stats(container.as_deref()).await?;
            output::stats(&stats, format)
        }

        Command::List { container } => {
            let values = cache.list_cached_values(&container).await?;
            output::cached_values(&values, format)
        }

        Command::Purge {
            container,
            days,
            yes,
        } => {
            let days = days.unwrap_or(config.max_age_days);
            let question = format!(
                "Remove entries of '{}' not seen in the last {} days?",
                container, days
            );
            if !proceed(&question, yes, io::stdin().lock(), io::stderr())? {
                return Ok(());
            }

            let removed = cache.purge_stale(&container, days, now).await?;
            cache.flush().await?;
            output::removed("Purged", &container, &removed, format)
        }

        Command::Clear { container, yes } => {
            let question = format!("Clear every cached entry of '{}'?", container);
            if !proceed(&question, yes, io::stdin().lock(), io::stderr())? {
                return Ok(());
            }

            let removed = cache.clear_container(&container).await?;
            cache.flush().await?;
            output::removed("Cleared", &container, &removed, format)
        }

        Command::Containers => {
            let containers = cache.list_containers().await?;
            output::containers(&containers, format)
        }

        Command::Validate { remote } => {
            let listing = read_remote_listing(&remote).await?;
            let report = cache.validate_integrity(&listing, now).await?;
            output::integrity(&report, format)
        }
    }
}

/// Read an exported remote container listing
async fn read_remote_listing(path: &Path) -> Result<Vec<RemoteContainer>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read remote listing {}", path.display()))?;

    let listing: Vec<RemoteContainer> = serde_json::from_str(&content)
        .with_context(|| format!("Remote listing {} is not valid JSON", path.display()))?;

    debug!(containers = listing.len(), "Loaded remote listing");
    Ok(listing)
}

/// Ask a y/N question before a destructive command
///
/// The question and the decline notice go to `prompt` (stderr in `main`), so
/// stdout only ever carries command output. Anything but `y`/`yes` declines.
fn proceed<R: BufRead, W: Write>(
    question: &str,
    yes: bool,
    mut input: R,
    mut prompt: W,
) -> Result<bool> {
    if yes {
        return Ok(true);
    }

    write!(prompt, "{} [y/N] ", question)?;
    prompt.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    let accepted = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
    if !accepted {
        writeln!(prompt, "Aborted.")?;
    }
    Ok(accepted)
}
