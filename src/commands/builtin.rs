//! Built-in commands that come with the bridge.

use std::sync::Arc;

use async_trait::async_trait;

use crate::commands::{CommandContext, CommandHandler};
use crate::error::BackendError;

/// All built-in commands.
pub fn all() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(PingCommand),
        Arc::new(EchoCommand),
        Arc::new(WhoamiCommand),
    ]
}

/// Liveness check.
pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Replies with pong"
    }

    async fn execute(&self, _ctx: &CommandContext, _args: &[String]) -> Result<String, BackendError> {
        Ok("pong".to_string())
    }
}

/// Repeats its arguments.
pub struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Repeats the given text"
    }

    async fn execute(&self, _ctx: &CommandContext, args: &[String]) -> Result<String, BackendError> {
        if args.is_empty() {
            return Err(BackendError::ExecutionFailed {
                command: "echo".to_string(),
                reason: "nothing to echo".to_string(),
            });
        }
        Ok(args.join(" "))
    }
}

/// Reports the authenticated principal.
pub struct WhoamiCommand;

#[async_trait]
impl CommandHandler for WhoamiCommand {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Shows who you are authenticated as"
    }

    async fn execute(&self, ctx: &CommandContext, _args: &[String]) -> Result<String, BackendError> {
        Ok(format!("{} via {}", ctx.principal, ctx.channel))
    }
}
