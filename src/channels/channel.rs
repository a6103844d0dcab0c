//! Channel connection contract and the normalized event type.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::BotConfig;
use crate::error::ChannelError;

/// Kind of chat activity carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A text message. The only kind that reaches the command bridge.
    Text,
    /// Typing indicator.
    Typing,
    /// Emoji reaction on an earlier message.
    Reaction,
    /// Anything platform-specific the adapter does not normalize.
    Other(String),
}

/// A participant in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Platform-unique id (user id, channel id, ...).
    pub id: String,
    /// Human-readable name, when the platform provides one.
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A normalized unit of inbound or outbound chat activity.
///
/// Produced by a channel on receive and constructed by the bridge on send.
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Routing metadata, copied verbatim onto replies.
    pub meta: BTreeMap<String, String>,
    pub from: Identity,
    pub to: Identity,
    pub kind: EventKind,
    pub payload: Bytes,
    /// Opaque platform-specific data (raw message, thread handle, ...).
    #[serde(default)]
    pub context: serde_json::Value,
}

impl Event {
    /// Build a text event with empty metadata and no platform context.
    pub fn text(from: Identity, to: Identity, payload: impl Into<Bytes>) -> Self {
        Self {
            meta: BTreeMap::new(),
            from,
            to,
            kind: EventKind::Text,
            payload: payload.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Build the text reply to this event: sender and recipient swapped,
    /// metadata preserved.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            meta: self.meta.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            kind: EventKind::Text,
            payload: payload.into(),
            context: serde_json::Value::Null,
        }
    }

    /// True for non-empty text events.
    pub fn is_dispatchable(&self) -> bool {
        self.kind == EventKind::Text && !self.payload.is_empty()
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn text_payload(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// One configured chat platform.
///
/// `init` and `start` are called once each at startup; `stream` is called
/// every time the dispatch loop (re)connects; `stop` once at shutdown.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, as used in configuration.
    fn name(&self) -> &str;

    async fn init(&self, config: &BotConfig) -> Result<(), ChannelError>;

    async fn start(&self) -> Result<(), ChannelError>;

    /// Open a bidirectional stream of events.
    async fn stream(&self) -> Result<Box<dyn ChannelConn>, ChannelError>;

    async fn stop(&self) -> Result<(), ChannelError>;
}

/// A live connection returned by [`Channel::stream`].
#[async_trait]
pub trait ChannelConn: Send + Sync {
    /// Receive the next event.
    ///
    /// Must be cancel-safe: the dispatch loop drops this future when
    /// shutdown is signalled, and no event may be lost when that happens.
    async fn recv(&self) -> Result<Event, ChannelError>;

    async fn send(&self, event: Event) -> Result<(), ChannelError>;

    async fn close(&self) -> Result<(), ChannelError>;
}
