//! shellgate CLI - a gated shell and filesystem tool server.
//!
//! `shellgate serve` reads one JSON tool call per line on stdin and writes
//! one JSON tool result per line on stdout. The other commands run a single
//! tool or inspect and edit the policy file.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod commands;
mod theme;

use shellgate_policy::PolicyStore;
use shellgate_telemetry::{EventLog, LogConfig, LogFormat};
use shellgate_tools::{SessionConfig, ToolContext, ToolRegistry};

/// shellgate - gated shell and filesystem tools
#[derive(Parser)]
#[command(name = "shellgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the policy file
    #[arg(short, long, global = true, env = "SHELLGATE_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Directory for access.log, commands.log and server.log
    /// (defaults to the policy file's directory)
    #[arg(long, global = true, env = "SHELLGATE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Diagnostic log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Compact)]
    log_format: LogFormatArg,

    #[command(flatten)]
    sessions: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Diagnostic log formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    /// Single-line, human-readable
    Compact,
    /// Multi-line, human-readable
    Pretty,
    /// One JSON object per line
    Json,
    /// Single-line with every field
    Full,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Full => Self::Full,
        }
    }
}

/// Session engine tunables.
#[derive(Args)]
struct SessionArgs {
    /// Wait for execute_command when the caller gives no timeout_ms
    #[arg(long, global = true, default_value_t = 1000)]
    default_timeout_ms: u64,

    /// Upper bound on execute_command's timeout_ms
    #[arg(long, global = true, default_value_t = 600_000)]
    max_timeout_ms: u64,

    /// How long finished sessions stay readable, in seconds
    #[arg(long, global = true, default_value_t = 3600)]
    retention_secs: u64,

    /// How often finished sessions are swept, in seconds
    #[arg(long, global = true, default_value_t = 300)]
    sweep_interval_secs: u64,
}

impl SessionArgs {
    fn to_config(&self) -> SessionConfig {
        SessionConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            max_timeout: Duration::from_millis(self.max_timeout_ms),
            retention: Duration::from_secs(self.retention_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tool calls: one JSON request per stdin line, one result per stdout line
    Serve,

    /// Run a single tool and print its result
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
        /// Print the full JSON result instead of its text
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit the command blocklist
    Blocked {
        #[command(subcommand)]
        command: BlockedCommands,
    },

    /// Show the effective allowed directories
    Dirs,

    /// List available tools
    Tools {
        /// Print full definitions, including input schemas, as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BlockedCommands {
    /// List blocked commands
    List,
    /// Block a command
    Add {
        /// Executable name
        command: String,
    },
    /// Unblock a command
    Remove {
        /// Executable name
        command: String,
    },
}

fn log_config(cli: &Cli) -> LogConfig {
    let level = if cli.verbose { "debug" } else { "info" };
    LogConfig::new(level).with_format(cli.log_format.into())
}

fn event_dir(cli: &Cli) -> PathBuf {
    cli.log_dir.clone().unwrap_or_else(|| {
        match cli.config.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = shellgate_telemetry::setup_logging(&log_config(&cli)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let events = Arc::new(EventLog::in_dir(event_dir(&cli)));
    let store = Arc::new(PolicyStore::open(&cli.config, events));
    let ctx = ToolContext::new(store, cli.sessions.to_config(), std::env::temp_dir());
    let registry = ToolRegistry::with_defaults();

    match cli.command {
        Commands::Serve => commands::serve::run(&registry, &ctx).await,
        Commands::Call {
            tool,
            arguments,
            json,
        } => commands::call::run(&registry, &ctx, &tool, &arguments, json).await,
        Commands::Blocked { command } => match command {
            BlockedCommands::List => commands::blocked::list(&ctx.commands),
            BlockedCommands::Add { command } => commands::blocked::add(&ctx.commands, &command),
            BlockedCommands::Remove { command } => {
                commands::blocked::remove(&ctx.commands, &command)
            },
        },
        Commands::Dirs => commands::dirs::run(&ctx.paths),
        Commands::Tools { json } => commands::tools::run(&registry, json),
    }
}
