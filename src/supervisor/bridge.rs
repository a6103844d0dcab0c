//! Turns one inbound text event into one authenticated command execution
//! and its reply.

use std::sync::Arc;

use crate::backend::{CommandBackend, Provenance, SessionGuard};
use crate::channels::{ChannelConn, ChannelStatusTracker, Event};
use crate::error::ChannelError;

/// What the bridge did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Payload held no tokens; nothing was sent.
    Ignored,
    /// Command ran and its output was sent back.
    Replied,
    /// Authentication failed; the error text was sent back.
    AuthRejected,
    /// Command failed; logged, nothing sent.
    ExecutionFailed,
}

/// Split a payload into whitespace-delimited tokens.
pub fn tokenize(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Per-channel bridge between a connection and the command backend.
#[derive(Clone)]
pub struct CommandBridge {
    channel: String,
    backend: Arc<dyn CommandBackend>,
    tracker: Arc<ChannelStatusTracker>,
}

impl CommandBridge {
    pub fn new(
        channel: impl Into<String>,
        backend: Arc<dyn CommandBackend>,
        tracker: Arc<ChannelStatusTracker>,
    ) -> Self {
        Self {
            channel: channel.into(),
            backend,
            tracker,
        }
    }

    /// Process one event.
    ///
    /// Only a failed `send` is returned as an error; the dispatch loop
    /// treats it as a dead stream. Authentication and execution failures
    /// are handled here.
    pub async fn process(
        &self,
        conn: &dyn ChannelConn,
        event: Event,
    ) -> Result<BridgeOutcome, ChannelError> {
        let tokens = tokenize(&event.payload);
        if tokens.is_empty() {
            return Ok(BridgeOutcome::Ignored);
        }

        tracing::debug!(
            channel = %self.channel,
            from = %event.from,
            command = %tokens[0],
            args = tokens.len() - 1,
            "Dispatching command"
        );

        let provenance = Provenance::from_event(&self.channel, &event);
        let session = match self.backend.authenticate(&provenance).await {
            Ok(session) => SessionGuard::new(session),
            Err(e) => {
                tracing::warn!(channel = %self.channel, from = %event.from, error = %e, "Authentication failed");
                conn.send(event.reply(e.to_string())).await?;
                self.tracker.record_reply(&self.channel).await;
                return Ok(BridgeOutcome::AuthRejected);
            }
        };

        let output = match self.backend.execute(session.session(), &tokens).await {
            Ok(output) => output,
            Err(e) => {
                // No reply on execution failure; only authentication errors
                // are reported back to the sender.
                tracing::error!(
                    channel = %self.channel,
                    session_id = %session.session().id(),
                    command = %tokens[0],
                    error = %e,
                    "Command execution failed"
                );
                return Ok(BridgeOutcome::ExecutionFailed);
            }
        };
        drop(session);

        conn.send(event.reply(output)).await?;
        self.tracker.record_reply(&self.channel).await;
        Ok(BridgeOutcome::Replied)
    }
}
