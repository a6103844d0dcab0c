//! Command registry.
//!
//! Commands are registered under a namespace; a backend only sees the
//! commands in the namespace it was configured with. The registry lock is
//! held for lookups only, never while a command executes.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::BackendError;

/// Execution context handed to a command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Session the command runs under.
    pub session_id: Uuid,
    /// Authenticated principal (sender id).
    pub principal: String,
    /// Channel the request arrived on.
    pub channel: String,
}

/// A command that can be invoked from chat.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Name the command is invoked by (first token of the message).
    fn name(&self) -> &str;

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Run the command with the remaining tokens.
    async fn execute(&self, ctx: &CommandContext, args: &[String]) -> Result<String, BackendError>;
}

/// A visible command as listed by `help`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
}

/// Namespace-scoped command table.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<(String, String), Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in commands under `namespace`.
    pub async fn with_builtins(namespace: &str) -> Self {
        let registry = Self::new();
        for handler in builtin::all() {
            registry.register(namespace, handler).await;
        }
        registry
    }

    /// Register a handler. Replaces any handler with the same name in the
    /// same namespace.
    pub async fn register(&self, namespace: &str, handler: Arc<dyn CommandHandler>) {
        let key = (namespace.to_string(), handler.name().to_string());
        tracing::debug!(namespace, command = %key.1, "Registered command");
        self.commands.write().await.insert(key, handler);
    }

    /// Look up a command visible in `namespace`.
    pub async fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Commands visible in `namespace`, sorted by name.
    pub async fn visible(&self, namespace: &str) -> Vec<CommandInfo> {
        let mut infos: Vec<CommandInfo> = self
            .commands
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, name), handler)| CommandInfo {
                name: name.clone(),
                description: handler.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn len(&self) -> usize {
        self.commands.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.commands.read().await.is_empty()
    }
}
