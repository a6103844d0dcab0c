//! In-process command backend.
//!
//! Authenticates senders against an allowlist and runs commands from the
//! [`CommandRegistry`] visible in the configured namespace.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::{CommandBackend, Provenance, Session};
use crate::commands::{CommandContext, CommandRegistry};
use crate::config::BotConfig;
use crate::error::BackendError;

/// Session issued by [`LocalBackend`].
#[derive(Debug)]
pub struct LocalSession {
    id: Uuid,
    principal: String,
    channel: String,
    released: AtomicBool,
}

impl LocalSession {
    fn new(principal: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal: principal.into(),
            channel: channel.into(),
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Session for LocalSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn principal(&self) -> &str {
        &self.principal
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            tracing::debug!(session_id = %self.id, principal = %self.principal, "Closed session");
        }
    }
}

/// Backend that executes registry commands in-process.
pub struct LocalBackend {
    namespace: String,
    allowed_senders: HashSet<String>,
    registry: Arc<CommandRegistry>,
}

impl LocalBackend {
    pub fn new(
        namespace: impl Into<String>,
        allowed_senders: impl IntoIterator<Item = String>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            allowed_senders: allowed_senders.into_iter().collect(),
            registry,
        }
    }

    pub fn from_config(config: &BotConfig, registry: Arc<CommandRegistry>) -> Self {
        Self::new(
            config.namespace.clone(),
            config.allowed_senders.iter().cloned(),
            registry,
        )
    }

    async fn help(&self) -> String {
        let commands = self.registry.visible(&self.namespace).await;
        if commands.is_empty() {
            return format!("No commands available in {}", self.namespace);
        }
        let mut out = format!("Commands in {}:", self.namespace);
        out.push_str("\n  help - Lists available commands");
        for info in commands {
            out.push_str(&format!("\n  {} - {}", info.name, info.description));
        }
        out
    }
}

#[async_trait]
impl CommandBackend for LocalBackend {
    async fn authenticate(
        &self,
        provenance: &Provenance,
    ) -> Result<Box<dyn Session>, BackendError> {
        let sender = &provenance.sender.id;
        if sender.is_empty() {
            return Err(BackendError::AuthFailed {
                reason: "message has no sender".to_string(),
            });
        }
        if !self.allowed_senders.is_empty() && !self.allowed_senders.contains(sender) {
            return Err(BackendError::AuthFailed {
                reason: format!("sender {} is not allowed to run commands", sender),
            });
        }
        Ok(Box::new(LocalSession::new(
            sender.clone(),
            provenance.channel.clone(),
        )))
    }

    async fn execute(
        &self,
        session: &dyn Session,
        tokens: &[String],
    ) -> Result<String, BackendError> {
        let (name, args) = tokens
            .split_first()
            .ok_or_else(|| BackendError::ExecutionFailed {
                command: String::new(),
                reason: "empty command line".to_string(),
            })?;

        if name == "help" {
            return Ok(self.help().await);
        }

        // Clone the handler out so the registry lock is not held while it runs.
        let handler = self
            .registry
            .lookup(&self.namespace, name)
            .await
            .ok_or_else(|| BackendError::CommandNotFound { name: name.clone() })?;

        let ctx = CommandContext {
            session_id: session.id(),
            principal: session.principal().to_string(),
            channel: session.channel().to_string(),
        };
        handler.execute(&ctx, args).await
    }
}
