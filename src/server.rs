//! The bridge service: one task per inbound client, plus local command
//! dispatch for the connections that ask for exec instead of a tunnel.
//!
//! The engine adapter listens for SSH clients, enforces public-key-only
//! authentication with the configured host keys, and feeds this service two
//! kinds of events: a new source connection whose client requested a tunnel
//! to some target (which becomes a [`BridgeSession`]), and an exec request to
//! run a local command. Sessions are independent; each gets its own copy of
//! the destination template and shares nothing mutable with its neighbours.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::bridge::BridgeSession;
use crate::command::CommandContext;
use crate::config::{BridgeConfig, DestinationParams};
use crate::engine::{Connection, Connector};
use crate::error::BridgeResult;
use crate::session::{ExecReply, SessionLayer};

/// Destination endpoint named by the client's connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A freshly accepted source connection to be bridged.
pub struct InboundBridge {
    pub source: Connection,
    pub target: TargetAddr,
    pub peer: Option<SocketAddr>,
}

/// An exec request issued on a client connection.
pub struct ExecRequest {
    pub command: String,
    pub context: CommandContext,
    /// Where the engine awaits the output to write back before closing the
    /// channel with the reply's exit status.
    pub reply: oneshot::Sender<ExecReply>,
}

/// Events the engine adapter feeds the service.
pub enum ServiceEvent {
    Bridge(InboundBridge),
    Exec(ExecRequest),
}

/// Stream of service events from the engine adapter's listener. `None` ends
/// the service (listener shut down).
#[async_trait]
pub trait ServiceSource: Send {
    async fn next_event(&mut self) -> BridgeResult<Option<ServiceEvent>>;
}

/// Long-running bridge service.
pub struct Service<C: Connector> {
    client_keys: Vec<Arc<russh::keys::PrivateKey>>,
    connector: Arc<C>,
    session_layer: Arc<SessionLayer>,
}

impl<C: Connector> Service<C> {
    /// Build the service from validated configuration. Loads the destination
    /// client keys once; every session clones its own template from them.
    pub fn new(config: &BridgeConfig, connector: C) -> BridgeResult<Self> {
        Ok(Self {
            client_keys: config.destination_keys()?,
            connector: Arc::new(connector),
            session_layer: Arc::new(SessionLayer::new()),
        })
    }

    /// Run until the event source is exhausted or fails.
    pub async fn run<S: ServiceSource>(&self, mut events: S) -> BridgeResult<()> {
        while let Some(event) = events.next_event().await? {
            match event {
                ServiceEvent::Bridge(inbound) => self.spawn_bridge(inbound),
                ServiceEvent::Exec(request) => self.spawn_exec(request),
            }
        }
        info!("service event source closed, shutting down");
        Ok(())
    }

    fn spawn_bridge(&self, inbound: InboundBridge) {
        let peer = display_addr(inbound.peer);
        info!(peer = %peer, target = %inbound.target, "bridge session starting");

        // Per-session copy of the destination template; sessions must not
        // share mutable configuration.
        let params = DestinationParams {
            host: inbound.target.host,
            port: inbound.target.port,
            username: None,
            client_keys: self.client_keys.clone(),
        };
        let session = BridgeSession::new(inbound.source, params, Arc::clone(&self.connector));

        tokio::spawn(async move {
            match session.run().await {
                Ok(()) => info!(peer = %peer, "bridge session closed"),
                Err(err) => warn!(peer = %peer, error = %err, "bridge session failed"),
            }
        });
    }

    fn spawn_exec(&self, request: ExecRequest) {
        let layer = Arc::clone(&self.session_layer);
        tokio::spawn(async move {
            let reply = layer.exec_requested(&request.command, &request.context).await;
            let _ = request.reply.send(reply);
        });
    }
}

/// Display helper used for tracing; keeps logging concise when the socket
/// address is unavailable.
pub fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string()).unwrap_or_else(|| "<unknown>".into())
}
