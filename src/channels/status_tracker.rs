//! Per-channel dispatch loop status.
//!
//! Tracks loop state, event counters and the last error for every channel
//! the supervisor runs. Thread-safe via `RwLock` and atomics.
//!
//! ```text
//! Supervisor starts     --> register_channel(name)
//! Loop changes state    --> set_state(name, state)
//! Event received        --> record_received(name)
//! Event reaches bridge  --> record_dispatched(name)
//! Reply sent            --> record_reply(name)
//! Stream failed         --> record_error(name, reason)
//! Shutdown              --> snapshot()
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// State of one dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Opening a stream.
    Connecting,
    /// Receiving events.
    Streaming,
    /// Waiting before the next connect attempt.
    Backoff,
    /// Terminated by shutdown.
    Closed,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Connecting => write!(f, "connecting"),
            LoopState::Streaming => write!(f, "streaming"),
            LoopState::Backoff => write!(f, "backoff"),
            LoopState::Closed => write!(f, "closed"),
        }
    }
}

struct ChannelMetrics {
    state: RwLock<LoopState>,
    streaming_since: RwLock<Option<DateTime<Utc>>>,
    last_event_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    events_received: AtomicU64,
    events_dispatched: AtomicU64,
    replies_sent: AtomicU64,
    connects: AtomicU64,
    error_count: AtomicU64,
}

impl ChannelMetrics {
    fn new() -> Self {
        Self {
            state: RwLock::new(LoopState::Connecting),
            streaming_since: RwLock::new(None),
            last_event_at: RwLock::new(None),
            last_error: RwLock::new(None),
            events_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    async fn info(&self, name: &str) -> ChannelStatusInfo {
        let connects = self.connects.load(Ordering::Relaxed);
        ChannelStatusInfo {
            name: name.to_string(),
            state: *self.state.read().await,
            streaming_since: self.streaming_since.read().await.map(|dt| dt.to_rfc3339()),
            last_event_at: self.last_event_at.read().await.map(|dt| dt.to_rfc3339()),
            last_error: self.last_error.read().await.clone(),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            reconnects: connects.saturating_sub(1),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time view of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatusInfo {
    pub name: String,
    pub state: LoopState,
    pub streaming_since: Option<String>,
    pub last_event_at: Option<String>,
    pub last_error: Option<String>,
    pub events_received: u64,
    pub events_dispatched: u64,
    pub replies_sent: u64,
    /// Successful stream opens after the first one.
    pub reconnects: u64,
    pub error_count: u64,
}

/// Tracks status for all supervised channels.
pub struct ChannelStatusTracker {
    channels: Arc<RwLock<HashMap<String, Arc<ChannelMetrics>>>>,
    started_at: Instant,
}

impl ChannelStatusTracker {
    /// Create a new tracker. Records the current instant as the start time.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }

    /// Register a channel. No-op if it already exists.
    pub async fn register_channel(&self, name: &str) {
        let mut channels = self.channels.write().await;
        channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ChannelMetrics::new()));
    }

    async fn metrics(&self, name: &str) -> Option<Arc<ChannelMetrics>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Update the loop state of a channel.
    ///
    /// Entering `Streaming` counts a connect and stamps `streaming_since`;
    /// leaving it clears the stamp. No-op for unregistered channels.
    pub async fn set_state(&self, name: &str, state: LoopState) {
        let Some(metrics) = self.metrics(name).await else {
            return;
        };
        *metrics.state.write().await = state;
        let mut since = metrics.streaming_since.write().await;
        if state == LoopState::Streaming {
            metrics.connects.fetch_add(1, Ordering::Relaxed);
            *since = Some(Utc::now());
        } else {
            *since = None;
        }
    }

    pub async fn record_received(&self, name: &str) {
        if let Some(metrics) = self.metrics(name).await {
            metrics.events_received.fetch_add(1, Ordering::Relaxed);
            *metrics.last_event_at.write().await = Some(Utc::now());
        }
    }

    pub async fn record_dispatched(&self, name: &str) {
        if let Some(metrics) = self.metrics(name).await {
            metrics.events_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn record_reply(&self, name: &str) {
        if let Some(metrics) = self.metrics(name).await {
            metrics.replies_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn record_error(&self, name: &str, reason: &str) {
        if let Some(metrics) = self.metrics(name).await {
            metrics.error_count.fetch_add(1, Ordering::Relaxed);
            *metrics.last_error.write().await = Some(reason.to_string());
        }
    }

    /// Status of a single channel.
    pub async fn get_channel_status(&self, name: &str) -> Option<ChannelStatusInfo> {
        let metrics = self.metrics(name).await?;
        Some(metrics.info(name).await)
    }

    /// Status of every channel, sorted by name.
    pub async fn snapshot(&self) -> Vec<ChannelStatusInfo> {
        let entries: Vec<(String, Arc<ChannelMetrics>)> = self
            .channels
            .read()
            .await
            .iter()
            .map(|(name, m)| (name.clone(), Arc::clone(m)))
            .collect();

        let mut result = Vec::with_capacity(entries.len());
        for (name, metrics) in entries {
            result.push(metrics.info(&name).await);
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of channels currently streaming.
    pub async fn streaming_count(&self) -> usize {
        self.snapshot()
            .await
            .iter()
            .filter(|s| s.state == LoopState::Streaming)
            .count()
    }

    /// Uptime in seconds since the tracker was created.
    pub fn uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for ChannelStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
