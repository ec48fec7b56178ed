//! Configuration settings for TransferPool
//!
//! Defines the CLI arguments, the serialisable run configuration and
//! the defaults for a dispatch run.

use crate::core::{Backoff, RetryPolicy};
use crate::error::{DispatchError, IoResultExt, Result};
use crate::transfer::TransferOptions;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker count used when nothing else is configured
pub const DEFAULT_WORKERS: usize = 16;

/// TransferPool - bounded, retrying batch file transfer
#[derive(Parser, Debug, Clone)]
#[command(name = "transferpool")]
#[command(author = "TransferPool Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transfer many files through a fixed pool of retrying workers")]
#[command(long_about = r#"
TransferPool copies every file of a source tree into a destination
repository using a fixed number of workers. Each file is a task that is
retried until it succeeds; files already present are skipped.

Examples:
  transferpool ./data /mnt/repo                       # 16 workers, retry forever
  transferpool ./data /mnt/repo -w 32 --progress      # More workers with progress bars
  transferpool ./data /mnt/repo --max-attempts 5 --retry-delay 200ms
  transferpool plan ./data /mnt/repo                  # List what would be transferred
"#)]
pub struct CliArgs {
    /// Source directory
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Destination directory
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Number of workers (0 = number of CPUs)
    #[arg(short = 'w', long, env = "TRANSFERPOOL_WORKERS", value_name = "NUM")]
    pub workers: Option<usize>,

    /// Give up on a file after this many attempts (0 = retry forever)
    #[arg(long, value_name = "NUM")]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry, doubled on every further failure (e.g. 200ms, 1s)
    #[arg(long, value_name = "DURATION")]
    pub retry_delay: Option<String>,

    /// Upper bound for the retry delay
    #[arg(long, value_name = "DURATION")]
    pub max_retry_delay: Option<String>,

    /// JSON config file; command-line flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Include hidden files
    #[arg(long)]
    pub include_hidden: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    pub follow_symlinks: bool,

    /// File pattern to include (glob)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// File pattern to exclude (glob)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Dry run (show what would be transferred)
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Show progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Output format for the run summary
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the files a transfer would run, without running it
    #[command(name = "plan")]
    Plan {
        /// Source directory
        source: PathBuf,
        /// Destination directory
        destination: PathBuf,
    },

    /// Print the effective configuration as JSON
    #[command(name = "show-config")]
    ShowConfig,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Log line format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Retry settings as stored in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per task (0 = unbounded)
    pub max_attempts: u32,
    /// First retry delay in milliseconds (0 = retry immediately)
    pub base_delay_ms: u64,
    /// Retry delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Build the retry policy these settings describe
    pub fn policy(&self) -> RetryPolicy {
        let policy = if self.max_attempts == 0 {
            RetryPolicy::unbounded()
        } else {
            RetryPolicy::bounded(self.max_attempts)
        };

        policy.with_backoff(Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        ))
    }
}

/// Runtime configuration derived from CLI args and config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Source directory
    pub source: PathBuf,
    /// Destination directory
    pub destination: PathBuf,
    /// Worker count (0 = number of CPUs)
    pub workers: usize,
    /// Retry settings
    pub retry: RetryConfig,
    /// Include hidden files
    pub include_hidden: bool,
    /// Follow symlinks
    pub follow_symlinks: bool,
    /// Include patterns
    pub include_patterns: Vec<String>,
    /// Exclude patterns
    pub exclude_patterns: Vec<String>,
    /// Dry run mode
    pub dry_run: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            workers: DEFAULT_WORKERS,
            retry: RetryConfig::default(),
            include_hidden: false,
            follow_symlinks: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            dry_run: false,
        }
    }
}

impl DispatchConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| DispatchError::config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Effective number of workers
    pub fn capacity(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Retry policy for every task of the run
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// File selection for the transfer planner
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            include_hidden: self.include_hidden,
            follow_symlinks: self.follow_symlinks,
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
        }
    }

    /// Create config from CLI arguments, layered over the config file if given
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(source) = &args.source {
            config.source = source.clone();
        }
        if let Some(destination) = &args.destination {
            config.destination = destination.clone();
        }
        if let Some(workers) = args.workers {
            config.workers = workers;
        }
        if let Some(max_attempts) = args.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(delay) = &args.retry_delay {
            config.retry.base_delay_ms = parse_duration_ms(delay)?;
        }
        if let Some(delay) = &args.max_retry_delay {
            config.retry.max_delay_ms = parse_duration_ms(delay)?;
        }

        config.include_hidden |= args.include_hidden;
        config.follow_symlinks |= args.follow_symlinks;
        config.include_patterns.extend(args.include.iter().cloned());
        config.exclude_patterns.extend(args.exclude.iter().cloned());
        config.dry_run |= args.dry_run;

        Ok(config)
    }

    /// Check that source and destination are set
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(DispatchError::config("Source path required"));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(DispatchError::config("Destination path required"));
        }
        Ok(())
    }
}

/// Parse a human-readable duration ("250ms", "2s", "1m 30s") into milliseconds
pub fn parse_duration_ms(value: &str) -> Result<u64> {
    let duration = humantime::parse_duration(value.trim())
        .map_err(|e| DispatchError::config(format!("Invalid duration '{}': {}", value, e)))?;
    Ok(duration.as_millis().min(u128::from(u64::MAX)) as u64)
}
