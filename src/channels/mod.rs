//! Chat channel connections.
//!
//! A [`Channel`] is one configured chat platform. Each time the dispatch
//! loop (re)connects it asks the channel for a [`ChannelConn`], a live
//! bidirectional stream of normalized [`Event`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ChannelRegistry                      │
//! │                                                         │
//! │   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  │
//! │   │ StdioChannel │  │    slack     │  │   discord    │  │
//! │   └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  │
//! │          │ stream()        │                 │          │
//! │          ▼                 ▼                 ▼          │
//! │     ChannelConn       ChannelConn       ChannelConn     │
//! │     recv / send       recv / send       recv / send     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Platform adapters live outside this crate and plug in through
//! [`ChannelCatalog::register`].

mod channel;
mod registry;
pub mod status_tracker;
pub mod stdio;

pub use channel::{Channel, ChannelConn, Event, EventKind, Identity};
pub use registry::{ChannelCatalog, ChannelRegistry};
pub use status_tracker::{ChannelStatusInfo, ChannelStatusTracker, LoopState};
pub use stdio::StdioChannel;
