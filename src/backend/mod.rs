//! Command backend contract.
//!
//! The bridge asks a [`CommandBackend`] for an authenticated [`Session`]
//! per inbound message, runs one command under it, and releases it. The
//! [`SessionGuard`] ties the release to scope so it happens on every path.

mod local;

pub use local::{LocalBackend, LocalSession};

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::channels::{Event, Identity};
use crate::error::BackendError;

/// Where a message came from. Everything a backend needs to authenticate.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// Channel the message arrived on.
    pub channel: String,
    pub sender: Identity,
    pub recipient: Identity,
    pub meta: BTreeMap<String, String>,
    /// Platform-specific message data.
    pub context: serde_json::Value,
}

impl Provenance {
    pub fn from_event(channel: &str, event: &Event) -> Self {
        Self {
            channel: channel.to_string(),
            sender: event.from.clone(),
            recipient: event.to.clone(),
            meta: event.meta.clone(),
            context: event.context.clone(),
        }
    }
}

/// Authenticated execution context for a single command.
pub trait Session: Send + Sync {
    fn id(&self) -> Uuid;

    /// Who the session acts as.
    fn principal(&self) -> &str;

    /// Channel the session was opened for.
    fn channel(&self) -> &str;

    /// Release backend resources. Must be idempotent.
    fn release(&self);
}

/// Releases the wrapped session when dropped.
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.release();
        tracing::trace!(session_id = %self.session.id(), "Session released");
    }
}

/// Authenticates senders and executes commands for them.
#[async_trait]
pub trait CommandBackend: Send + Sync {
    /// Open a session for the sender described by `provenance`.
    async fn authenticate(&self, provenance: &Provenance)
    -> Result<Box<dyn Session>, BackendError>;

    /// Run a tokenized command line. `tokens` is never empty.
    async fn execute(&self, session: &dyn Session, tokens: &[String])
    -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSession {
        releases: Arc<AtomicUsize>,
    }

    impl Session for CountingSession {
        fn id(&self) -> Uuid {
            Uuid::nil()
        }

        fn principal(&self) -> &str {
            "u-1"
        }

        fn channel(&self) -> &str {
            "test"
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let guard = SessionGuard::new(Box::new(CountingSession {
                releases: Arc::clone(&releases),
            }));
            assert_eq!(guard.session().principal(), "u-1");
            assert_eq!(releases.load(Ordering::SeqCst), 0);
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn fails(guard: SessionGuard) -> Result<(), String> {
            let _guard = guard;
            Err("boom".to_string())
        }

        let releases = Arc::new(AtomicUsize::new(0));
        let guard = SessionGuard::new(Box::new(CountingSession {
            releases: Arc::clone(&releases),
        }));
        assert!(fails(guard).is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn provenance_copies_routing_data() {
        let event = Event::text(Identity::new("u-1"), Identity::new("bot"), "ping")
            .with_meta("thread", "t-1")
            .with_context(serde_json::json!({"guild": "g-1"}));
        let provenance = Provenance::from_event("discord", &event);
        assert_eq!(provenance.channel, "discord");
        assert_eq!(provenance.sender.id, "u-1");
        assert_eq!(provenance.recipient.id, "bot");
        assert_eq!(provenance.meta.get("thread").map(String::as_str), Some("t-1"));
        assert_eq!(provenance.context["guild"], "g-1");
    }
}
