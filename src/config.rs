//! Runtime configuration for the bridge.
//!
//! `BotConfig` is the validated, plain-data form of the command line. It is
//! built once at startup and handed to every channel's `init`.

use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "chatops.bridge";

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// How long `stop()` waits for dispatch loops to drain.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Validated bridge configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BotConfig {
    /// Channel names to activate, in configured order.
    pub inputs: Vec<String>,
    /// Namespace scoping which commands are visible.
    pub namespace: String,
    /// Sender ids allowed to run commands. Empty admits everyone.
    pub allowed_senders: Vec<String>,
    /// Delay between reconnect attempts after a stream failure.
    pub reconnect_backoff: Duration,
    /// Upper bound on waiting for dispatch loops during shutdown.
    pub shutdown_grace: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            allowed_senders: Vec::new(),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl BotConfig {
    /// Check invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "namespace".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.reconnect_backoff.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "reconnect_backoff_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
