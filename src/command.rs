//! Locally executed commands.
//!
//! A fixed allow-list maps a command name to a handler; anything else is an
//! illegal command. These commands run inside the bridge process against the
//! connection that issued them and never produce destination-bound traffic.
//! The only built-in is `ssh-add`, which registers the bridge's host keys
//! with the client's key agent so onward hops accept them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use russh::keys::PrivateKey;

use crate::error::{BridgeError, BridgeResult};

/// Key agent reachable from the issuing connection, typically over an
/// agent-forwarding channel. Provided by the engine adapter.
#[async_trait]
pub trait KeyAgent: Send + Sync {
    /// Register private keys with the agent, returning how many were added.
    async fn add_identities(&self, keys: &[Arc<PrivateKey>]) -> BridgeResult<usize>;
}

/// Per-invocation context handed to command handlers.
pub struct CommandContext {
    /// Authenticated username on the issuing connection.
    pub username: String,
    /// Keys the bridge offers to register (its configured host keys).
    pub host_keys: Vec<Arc<PrivateKey>>,
    /// Agent for the issuing connection, when one is available.
    pub agent: Option<Arc<dyn KeyAgent>>,
}

type CommandHandler = for<'a> fn(&'a CommandContext, &'a [&'a str]) -> BoxFuture<'a, BridgeResult<String>>;

/// Statically constructed allow-list of local commands.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, CommandHandler>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut handlers: HashMap<&'static str, CommandHandler> = HashMap::new();
        handlers.insert("ssh-add", run_ssh_add);
        Self { handlers }
    }
}

impl CommandRegistry {
    /// Whether a command line names an allow-listed command.
    pub fn contains(&self, command: &str) -> bool {
        command_name(command).is_some_and(|name| self.handlers.contains_key(name))
    }

    /// Parse and run a command line, returning its textual result.
    pub async fn run(&self, command: &str, ctx: &CommandContext) -> BridgeResult<String> {
        let trimmed = command.trim();
        let mut parts = trimmed.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| BridgeError::command("illegal command"))?;
        let args: Vec<&str> = parts.collect();
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| BridgeError::command(format!("illegal command {trimmed}")))?;
        handler(ctx, &args).await
    }
}

/// First word of a command line.
pub fn command_name(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

fn run_ssh_add<'a>(ctx: &'a CommandContext, _args: &'a [&'a str]) -> BoxFuture<'a, BridgeResult<String>> {
    Box::pin(async move {
        let agent = ctx
            .agent
            .as_ref()
            .ok_or_else(|| BridgeError::command("no available agent"))?;
        if ctx.host_keys.is_empty() {
            return Err(BridgeError::command("no host keys configured to add"));
        }
        let added = agent.add_identities(&ctx.host_keys).await?;
        Ok(format!("identity added: {added} key(s)"))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use russh::keys::ssh_key::rand_core::OsRng;
    use russh::keys::Algorithm;

    use super::*;

    struct RecordingAgent {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyAgent for RecordingAgent {
        async fn add_identities(&self, keys: &[Arc<PrivateKey>]) -> BridgeResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(keys.len())
        }
    }

    fn context(agent: Option<Arc<dyn KeyAgent>>) -> CommandContext {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        CommandContext {
            username: "alice".into(),
            host_keys: vec![Arc::new(key)],
            agent,
        }
    }

    #[tokio::test]
    async fn ssh_add_registers_keys_with_the_agent() {
        let agent = Arc::new(RecordingAgent { calls: AtomicUsize::new(0) });
        let ctx = context(Some(agent.clone()));
        let registry = CommandRegistry::default();

        let output = registry.run(" ssh-add \r\n", &ctx).await.unwrap();
        assert_eq!(output, "identity added: 1 key(s)");
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ssh_add_without_an_agent_fails() {
        let ctx = context(None);
        let err = CommandRegistry::default().run("ssh-add", &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "no available agent");
    }

    #[tokio::test]
    async fn unlisted_commands_are_illegal() {
        let ctx = context(None);
        let registry = CommandRegistry::default();
        let err = registry.run("rm -rf /", &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "illegal command rm -rf /");
        assert!(matches!(registry.run("   ", &ctx).await, Err(BridgeError::Command(_))));
    }

    #[test]
    fn allow_list_membership() {
        let registry = CommandRegistry::default();
        assert!(registry.contains("ssh-add -x"));
        assert!(!registry.contains("ls"));
        assert!(!registry.contains(""));
    }
}
