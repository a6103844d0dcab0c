//! Error types for the chat-operations bridge.

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown channel {name} (available: {available})")]
    UnknownChannel { name: String, available: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel connection errors.
///
/// Everything except `InitFailed` and `StartupFailed` is recoverable: the
/// dispatch loop backs off and reconnects.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} could not open a stream: {reason}")]
    StreamFailed { name: String, reason: String },

    #[error("Channel {name} receive failed: {reason}")]
    RecvFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} failed to close its stream: {reason}")]
    CloseFailed { name: String, reason: String },

    #[error("Channel {name} failed to stop: {reason}")]
    StopFailed { name: String, reason: String },

    #[error("Channel {name} stream is closed")]
    Closed { name: String },
}

/// Command backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Unknown command: {name}")]
    CommandNotFound { name: String },

    #[error("Command {command} failed: {reason}")]
    ExecutionFailed { command: String, reason: String },
}

/// Fatal errors raised while bringing channels up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0}")]
    Channel(#[from] ChannelError),

    #[error("Supervisor already started")]
    AlreadyStarted,

    #[error("Supervisor was stopped before it started")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
