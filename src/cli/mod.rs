//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the bridge (`run`, the default)
//! - Listing the channel kinds this build knows (`channels`)
//!
//! Every flag can also be set from the environment (`CHATOPS_*`), and a
//! `.env` file is loaded before parsing.

mod channels;

pub use channels::run_channels_command;

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{BotConfig, DEFAULT_NAMESPACE, parse_list};
use crate::error::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "chatops-bridge")]
#[command(about = "Run chat commands against an authenticated backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Inputs to load on startup, comma-separated (e.g. "slack,discord")
    #[arg(long, env = "CHATOPS_INPUTS", default_value = "", global = true)]
    pub inputs: String,

    /// Namespace used to find commands (e.g. "com.example.bot")
    #[arg(long, env = "CHATOPS_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    pub namespace: String,

    /// Sender ids allowed to run commands, comma-separated (empty allows all)
    #[arg(long, env = "CHATOPS_ALLOWED_SENDERS", default_value = "", global = true)]
    pub allowed_senders: String,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, env = "CHATOPS_RECONNECT_BACKOFF_MS", default_value_t = 1000, global = true)]
    pub reconnect_backoff_ms: u64,

    /// How long to wait for channels to drain on shutdown, in seconds
    #[arg(long, env = "CHATOPS_SHUTDOWN_GRACE_SECS", default_value_t = 10, global = true)]
    pub shutdown_grace_secs: u64,

    /// Log output format
    #[arg(long, env = "CHATOPS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge (default if no subcommand given)
    Run,

    /// List the channel kinds available to --inputs
    Channels,
}

impl Cli {
    /// Check if we should run the bridge (default behavior or explicit `run`).
    pub fn should_run_bridge(&self) -> bool {
        matches!(self.command, None | Some(Command::Run))
    }

    /// Build the validated runtime configuration.
    pub fn to_config(&self) -> Result<BotConfig, ConfigError> {
        let config = BotConfig {
            inputs: parse_list(&self.inputs),
            namespace: self.namespace.trim().to_string(),
            allowed_senders: parse_list(&self.allowed_senders),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
