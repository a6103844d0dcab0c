//! Per-channel reconnect-and-process loop.
//!
//! ```text
//!            stream() ok              recv/send error
//! Connecting ───────────▶ Streaming ──────────────────┐
//!     ▲                       │                      │
//!     │   backoff elapsed     │ shutdown             ▼
//!     └──────────────────── Backoff ◀──── stream() error
//!                             │
//!               shutdown      ▼
//!   (from any state) ───▶  Closed
//! ```
//!
//! Events on one connection are processed strictly in order: the next
//! `recv` is not issued until the bridge has finished with the previous
//! event.

use std::sync::Arc;
use std::time::Duration;

use crate::channels::{Channel, ChannelConn, ChannelStatusTracker, LoopState};
use crate::error::ChannelError;
use crate::supervisor::bridge::CommandBridge;
use crate::supervisor::shutdown::ShutdownSignal;

/// Dispatch loop for one channel.
pub struct DispatchLoop {
    name: String,
    channel: Arc<dyn Channel>,
    bridge: CommandBridge,
    shutdown: ShutdownSignal,
    tracker: Arc<ChannelStatusTracker>,
    backoff: Duration,
}

impl DispatchLoop {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<dyn Channel>,
        bridge: CommandBridge,
        shutdown: ShutdownSignal,
        tracker: Arc<ChannelStatusTracker>,
        backoff: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            bridge,
            shutdown,
            tracker,
            backoff,
        }
    }

    /// Run until shutdown.
    ///
    /// Returns the result of closing the last stream, or the error that
    /// was in flight when shutdown arrived.
    pub async fn run(self) -> Result<(), ChannelError> {
        tracing::info!(channel = %self.name, "Starting dispatch loop");

        let result = loop {
            if self.shutdown.is_set() {
                break Ok(());
            }

            match self.stream_once().await {
                Ok(()) => break Ok(()),
                Err(e) if self.shutdown.is_set() => break Err(e),
                Err(e) => {
                    self.tracker.record_error(&self.name, &e.to_string()).await;
                    self.tracker.set_state(&self.name, LoopState::Backoff).await;
                    tracing::warn!(
                        channel = %self.name,
                        error = %e,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "Stream failed, reconnecting"
                    );

                    tokio::select! {
                        biased;
                        _ = self.shutdown.wait() => break Ok(()),
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
            }
        };

        self.tracker.set_state(&self.name, LoopState::Closed).await;
        tracing::info!(channel = %self.name, "Dispatch loop exited");
        result
    }

    /// Open one stream and pump it until it fails or shutdown is signalled.
    async fn stream_once(&self) -> Result<(), ChannelError> {
        self.tracker.set_state(&self.name, LoopState::Connecting).await;
        tracing::debug!(channel = %self.name, "Connecting");

        let conn = self.channel.stream().await?;
        self.tracker.set_state(&self.name, LoopState::Streaming).await;
        tracing::info!(channel = %self.name, "Connected");

        match self.pump(conn.as_ref()).await {
            Ok(()) => {
                tracing::info!(channel = %self.name, "Closing stream");
                conn.close().await
            }
            Err(e) => {
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(channel = %self.name, error = %close_err, "Closing dead stream failed");
                }
                Err(e)
            }
        }
    }

    /// Receive and dispatch events. `Ok` means shutdown was observed.
    async fn pump(&self, conn: &dyn ChannelConn) -> Result<(), ChannelError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(()),
                received = conn.recv() => received?,
            };
            self.tracker.record_received(&self.name).await;

            if !event.is_dispatchable() {
                tracing::trace!(channel = %self.name, kind = ?event.kind, "Skipping event");
                continue;
            }

            self.tracker.record_dispatched(&self.name).await;
            self.bridge.process(conn, event).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::channels::{Event, EventKind, Identity};
    use crate::commands::CommandRegistry;
    use crate::config::BotConfig;
    use crate::supervisor::shutdown::Shutdown;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Channel whose streams replay a fixed script and then block.
    struct ScriptedChannel {
        script: Mutex<VecDeque<Result<Event, ChannelError>>>,
        sent: Arc<Mutex<Vec<Event>>>,
        streams: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Result<Event, ChannelError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sent: Arc::new(Mutex::new(Vec::new())),
                streams: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    struct ScriptedConn {
        channel: Arc<ScriptedChannel>,
    }

    /// Channel handle sharing the script with the connections it opens.
    struct ScriptedHandle(Arc<ScriptedChannel>);

    #[async_trait]
    impl Channel for ScriptedHandle {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn init(&self, _config: &BotConfig) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn start(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn stream(&self) -> Result<Box<dyn ChannelConn>, ChannelError> {
            self.0.streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConn {
                channel: Arc::clone(&self.0),
            }))
        }
        async fn stop(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ChannelConn for ScriptedConn {
        async fn recv(&self) -> Result<Event, ChannelError> {
            let next = self.channel.script.lock().await.pop_front();
            match next {
                Some(item) => item,
                None => futures::future::pending().await,
            }
        }
        async fn send(&self, event: Event) -> Result<(), ChannelError> {
            self.channel.sent.lock().await.push(event);
            Ok(())
        }
        async fn close(&self) -> Result<(), ChannelError> {
            self.channel.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn text(payload: &'static str) -> Result<Event, ChannelError> {
        Ok(Event::text(Identity::new("u-1"), Identity::new("bot"), payload))
    }

    async fn build_loop(
        channel: &Arc<ScriptedChannel>,
        shutdown: &Shutdown,
    ) -> (DispatchLoop, Arc<ChannelStatusTracker>) {
        let tracker = Arc::new(ChannelStatusTracker::new());
        tracker.register_channel("scripted").await;
        let registry = Arc::new(CommandRegistry::with_builtins("ops").await);
        let backend = Arc::new(LocalBackend::new("ops", Vec::new(), registry));
        let bridge = CommandBridge::new("scripted", backend, Arc::clone(&tracker));
        let dispatch = DispatchLoop::new(
            "scripted",
            Arc::new(ScriptedHandle(Arc::clone(channel))),
            bridge,
            shutdown.signal(),
            Arc::clone(&tracker),
            Duration::from_secs(1),
        );
        (dispatch, tracker)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn filters_non_text_and_empty_events() {
        let mut typing = Event::text(Identity::new("u-1"), Identity::new("bot"), "ping");
        typing.kind = EventKind::Typing;
        let channel = ScriptedChannel::new(vec![Ok(typing), text(""), text("ping")]);
        let shutdown = Shutdown::new();
        let (dispatch, tracker) = build_loop(&channel, &shutdown).await;

        let handle = tokio::spawn(dispatch.run());
        settle().await;
        shutdown.trigger();
        handle.await.unwrap().unwrap();

        let sent = channel.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0].payload[..], b"pong");

        let status = tracker.get_channel_status("scripted").await.unwrap();
        assert_eq!(status.events_received, 3);
        assert_eq!(status.events_dispatched, 1);
        assert_eq!(status.state, LoopState::Closed);
    }

    #[tokio::test]
    async fn replies_preserve_receive_order() {
        let channel =
            ScriptedChannel::new(vec![text("echo one"), text("echo two"), text("echo three")]);
        let shutdown = Shutdown::new();
        let (dispatch, _tracker) = build_loop(&channel, &shutdown).await;

        let handle = tokio::spawn(dispatch.run());
        settle().await;
        shutdown.trigger();
        handle.await.unwrap().unwrap();

        let sent: Vec<String> = channel
            .sent
            .lock()
            .await
            .iter()
            .map(|ev| ev.text_payload())
            .collect();
        assert_eq!(sent, vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_error_triggers_full_reconnect() {
        let channel = ScriptedChannel::new(vec![
            text("ping"),
            Err(ChannelError::RecvFailed {
                name: "scripted".to_string(),
                reason: "socket reset".to_string(),
            }),
            text("ping"),
        ]);
        let shutdown = Shutdown::new();
        let (dispatch, tracker) = build_loop(&channel, &shutdown).await;

        let handle = tokio::spawn(dispatch.run());
        settle().await;
        assert_eq!(channel.streams.load(Ordering::SeqCst), 1);
        assert_eq!(channel.closes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(channel.streams.load(Ordering::SeqCst), 2);

        shutdown.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(channel.sent.lock().await.len(), 2);
        let status = tracker.get_channel_status("scripted").await.unwrap();
        assert_eq!(status.reconnects, 1);
        assert_eq!(status.error_count, 1);
        assert_eq!(channel.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_before_run_never_connects() {
        let channel = ScriptedChannel::new(vec![text("ping")]);
        let shutdown = Shutdown::new();
        let (dispatch, _tracker) = build_loop(&channel, &shutdown).await;
        shutdown.trigger();

        dispatch.run().await.unwrap();
        assert_eq!(channel.streams.load(Ordering::SeqCst), 0);
        assert!(channel.sent.lock().await.is_empty());
    }
}
