//! Chat-operations bridge.
//!
//! Keeps one long-lived connection per configured chat channel, turns
//! inbound text messages into command invocations against an authenticated
//! session, and routes the output back to the sender.

pub mod backend;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod supervisor;

pub use backend::{CommandBackend, LocalBackend, Provenance, Session, SessionGuard};
pub use channels::{Channel, ChannelCatalog, ChannelConn, ChannelRegistry, Event, EventKind, Identity};
pub use config::BotConfig;
pub use error::{Error, Result};
pub use supervisor::{InputSupervisor, Lifecycle, ServiceRunner, SignalService};
