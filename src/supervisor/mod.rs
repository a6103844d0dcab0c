//! Input supervisor.
//!
//! Brings every configured channel up, runs one [`DispatchLoop`] per
//! channel, and tears everything down on shutdown.
//!
//! ```text
//! start():  init+start every channel ──▶ spawn one loop per channel
//!                 (first failure aborts)
//!
//! stop():   trigger shutdown ──▶ join loops (bounded) ──▶ stop every channel
//!           (exactly once)                               (errors logged)
//! ```

pub mod bridge;
pub mod dispatch;
pub mod lifecycle;
pub mod shutdown;

pub use bridge::{BridgeOutcome, CommandBridge, tokenize};
pub use dispatch::DispatchLoop;
pub use lifecycle::{Lifecycle, ServiceRunner, SignalService};
pub use shutdown::{Shutdown, ShutdownSignal};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::backend::CommandBackend;
use crate::channels::{ChannelRegistry, ChannelStatusInfo, ChannelStatusTracker};
use crate::config::BotConfig;
use crate::error::{ChannelError, StartupError};

type LoopResult = (String, Result<(), ChannelError>);

/// Owns the channel registry and the dispatch loops running over it.
pub struct InputSupervisor {
    config: BotConfig,
    registry: Arc<ChannelRegistry>,
    backend: Arc<dyn CommandBackend>,
    tracker: Arc<ChannelStatusTracker>,
    shutdown: Shutdown,
    loops: Mutex<JoinSet<LoopResult>>,
    started: AtomicBool,
}

impl InputSupervisor {
    pub fn new(
        config: BotConfig,
        registry: ChannelRegistry,
        backend: Arc<dyn CommandBackend>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            backend,
            tracker: Arc::new(ChannelStatusTracker::new()),
            shutdown: Shutdown::new(),
            loops: Mutex::new(JoinSet::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn tracker(&self) -> Arc<ChannelStatusTracker> {
        Arc::clone(&self.tracker)
    }

    /// Number of dispatch loops still running.
    pub async fn running_loops(&self) -> usize {
        self.loops.lock().await.len()
    }

    /// Initialize and start every channel, then spawn their dispatch loops.
    ///
    /// The first `init` or `start` failure aborts startup without spawning
    /// any loop. `init`/`start` are never retried.
    pub async fn start(&self) -> Result<(), StartupError> {
        if self.shutdown.is_triggered() {
            return Err(StartupError::Stopped);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StartupError::AlreadyStarted);
        }

        tracing::info!(channels = ?self.registry.names(), "Starting input supervisor");

        for (name, channel) in self.registry.iter() {
            tracing::info!(channel = %name, "Starting channel");
            channel.init(&self.config).await?;
            channel.start().await?;
            self.tracker.register_channel(name).await;
        }

        let mut loops = self.loops.lock().await;
        for (name, channel) in self.registry.iter() {
            let bridge =
                CommandBridge::new(name, Arc::clone(&self.backend), Arc::clone(&self.tracker));
            let dispatch = DispatchLoop::new(
                name,
                Arc::clone(channel),
                bridge,
                self.shutdown.signal(),
                Arc::clone(&self.tracker),
                self.config.reconnect_backoff,
            );
            let name = name.to_string();
            loops.spawn(async move { (name, dispatch.run().await) });
        }

        Ok(())
    }

    /// Signal shutdown, drain the dispatch loops and stop every channel.
    ///
    /// Only the first call does anything; it returns `true`. Channel stop
    /// failures are logged and never prevent stopping the others.
    pub async fn stop(&self) -> bool {
        if !self.shutdown.trigger() {
            tracing::debug!("Input supervisor already stopping");
            return false;
        }
        tracing::info!(
            streaming = self.tracker.streaming_count().await,
            "Stopping input supervisor"
        );

        let mut loops = self.loops.lock().await;
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while let Some(joined) = loops.join_next().await {
                match joined {
                    Ok((name, Ok(()))) => {
                        tracing::debug!(channel = %name, "Dispatch loop closed");
                    }
                    Ok((name, Err(e))) => {
                        tracing::warn!(channel = %name, error = %e, "Dispatch loop closed with error");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Dispatch loop task failed");
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = loops.len(),
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Dispatch loops did not exit in time, aborting"
            );
            loops.shutdown().await;
        }
        drop(loops);

        let stops = self.registry.iter().map(|(name, channel)| async move {
            tracing::info!(channel = %name, "Stopping channel");
            (name, channel.stop().await)
        });
        for (name, result) in futures::future::join_all(stops).await {
            if let Err(e) = result {
                tracing::error!(channel = %name, error = %e, "Failed to stop channel");
            }
        }

        for status in self.tracker.snapshot().await {
            tracing::info!(
                channel = %status.name,
                received = status.events_received,
                dispatched = status.events_dispatched,
                replies = status.replies_sent,
                reconnects = status.reconnects,
                errors = status.error_count,
                "Channel summary"
            );
        }
        tracing::info!(
            channels = self.tracker.channel_count().await,
            uptime_secs = self.tracker.uptime(),
            "Input supervisor stopped"
        );

        true
    }

    /// Status of every running channel.
    pub async fn status(&self) -> Vec<ChannelStatusInfo> {
        self.tracker.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::channels::{Channel, ChannelConn, Event};
    use crate::commands::CommandRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct ProbeChannel {
        name: String,
        fail_start: bool,
        fail_stop: bool,
        inits: AtomicUsize,
        starts: AtomicUsize,
        streams: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ProbeChannel {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }
    }

    struct IdleConn;

    #[async_trait]
    impl ChannelConn for IdleConn {
        async fn recv(&self) -> Result<Event, ChannelError> {
            futures::future::pending().await
        }
        async fn send(&self, _event: Event) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Channel for ProbeChannel {
        fn name(&self) -> &str {
            &self.name
        }
        async fn init(&self, _config: &BotConfig) -> Result<(), ChannelError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn start(&self) -> Result<(), ChannelError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ChannelError::StartupFailed {
                    name: self.name.clone(),
                    reason: "invalid token".to_string(),
                });
            }
            Ok(())
        }
        async fn stream(&self) -> Result<Box<dyn ChannelConn>, ChannelError> {
            self.streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(IdleConn))
        }
        async fn stop(&self) -> Result<(), ChannelError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(ChannelError::StopFailed {
                    name: self.name.clone(),
                    reason: "already gone".to_string(),
                });
            }
            Ok(())
        }
    }

    async fn supervisor(channels: Vec<Arc<ProbeChannel>>) -> InputSupervisor {
        let registry = ChannelRegistry::from_channels(
            channels.into_iter().map(|ch| ch as Arc<dyn Channel>),
        );
        let commands = Arc::new(CommandRegistry::with_builtins("ops").await);
        let backend = Arc::new(LocalBackend::new("ops", Vec::new(), commands));
        let config = BotConfig {
            shutdown_grace: Duration::from_secs(1),
            ..BotConfig::default()
        };
        InputSupervisor::new(config, registry, backend)
    }

    #[tokio::test]
    async fn start_spawns_one_loop_per_channel() {
        let slack = Arc::new(ProbeChannel::named("slack"));
        let discord = Arc::new(ProbeChannel::named("discord"));
        let sup = supervisor(vec![slack.clone(), discord.clone()]).await;

        sup.start().await.unwrap();
        assert_eq!(sup.running_loops().await, 2);
        assert_eq!(slack.inits.load(Ordering::SeqCst), 1);
        assert_eq!(discord.starts.load(Ordering::SeqCst), 1);

        assert!(sup.stop().await);
        assert_eq!(sup.running_loops().await, 0);
        assert_eq!(slack.stops.load(Ordering::SeqCst), 1);
        assert_eq!(discord.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_failure_spawns_no_loops() {
        let good = Arc::new(ProbeChannel::named("discord"));
        let bad = Arc::new(ProbeChannel {
            fail_start: true,
            ..ProbeChannel::named("slack")
        });
        let sup = supervisor(vec![good.clone(), bad.clone()]).await;

        let err = sup.start().await.unwrap_err();
        assert!(err.to_string().contains("invalid token"));
        assert_eq!(sup.running_loops().await, 0);
        assert_eq!(good.streams.load(Ordering::SeqCst), 0);
        assert_eq!(bad.streams.load(Ordering::SeqCst), 0);

        assert!(sup.stop().await);
        assert_eq!(good.stops.load(Ordering::SeqCst), 1);
        assert_eq!(bad.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_best_effort_and_runs_once() {
        let flaky = Arc::new(ProbeChannel {
            fail_stop: true,
            ..ProbeChannel::named("discord")
        });
        let fine = Arc::new(ProbeChannel::named("slack"));
        let sup = supervisor(vec![flaky.clone(), fine.clone()]).await;
        sup.start().await.unwrap();

        assert!(sup.stop().await);
        assert!(!sup.stop().await);
        assert_eq!(flaky.stops.load(Ordering::SeqCst), 1);
        assert_eq!(fine.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let sup = supervisor(vec![Arc::new(ProbeChannel::named("slack"))]).await;
        sup.start().await.unwrap();
        assert!(matches!(
            sup.start().await.unwrap_err(),
            StartupError::AlreadyStarted
        ));
        sup.stop().await;
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let sup = supervisor(vec![Arc::new(ProbeChannel::named("slack"))]).await;
        sup.stop().await;
        assert!(matches!(sup.start().await.unwrap_err(), StartupError::Stopped));
    }

    #[tokio::test]
    async fn status_reports_closed_loops_after_stop() {
        let sup = supervisor(vec![Arc::new(ProbeChannel::named("slack"))]).await;
        sup.start().await.unwrap();
        sup.stop().await;

        let status = sup.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "slack");
        assert_eq!(status[0].state, crate::channels::LoopState::Closed);
    }
}
