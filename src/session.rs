//! Session layer for the connection a client issues local commands on.
//!
//! Sits above the bridge: shell requests are refused, and exec requests are
//! always serviced locally against the command allow-list. A successful
//! command yields its output and exit status 0; failures (including commands
//! not on the allow-list) yield the error text and a non-zero status. Either
//! way the channel is answered and closed by the engine, and nothing is
//! forwarded toward a destination.

use tracing::info;

use crate::command::{CommandContext, CommandRegistry};

/// What the engine writes back on the exec channel before closing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReply {
    pub output: String,
    pub exit_status: u32,
}

/// Per-service session/command hook.
#[derive(Default)]
pub struct SessionLayer {
    registry: CommandRegistry,
}

impl SessionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interactive shells are never offered; the bridge only relays or runs
    /// allow-listed commands.
    pub fn shell_requested(&self) -> bool {
        false
    }

    /// Service an exec request locally.
    pub async fn exec_requested(&self, command: &str, ctx: &CommandContext) -> ExecReply {
        match self.registry.run(command, ctx).await {
            Ok(output) => {
                info!(user = %ctx.username, command = %command.trim(), "local command succeeded");
                ExecReply {
                    output: format!("{output}\n"),
                    exit_status: 0,
                }
            }
            Err(err) => {
                info!(user = %ctx.username, command = %command.trim(), error = %err, "local command failed");
                ExecReply {
                    output: format!("{err}\n"),
                    exit_status: 1,
                }
            }
        }
    }
}
