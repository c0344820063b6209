//! Contract between the bridge and the underlying SSH protocol engine.
//!
//! The engine owns key exchange, packet framing, and crypto for each leg. It
//! integrates with the bridge through two channels per connection: an event
//! stream carrying every decoded packet (delivered *before* the engine's own
//! processing) plus lifecycle notifications, and a command channel through
//! which the bridge either returns a packet for default processing, sends a
//! raw packet on this leg's own transport, or adjusts read flow control. The
//! two legs never share sequence numbers, compression, or keys; a packet
//! redirected across the bridge is re-framed and re-encrypted from scratch by
//! the peer leg's engine.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::classify::Role;
use crate::config::DestinationParams;
use crate::error::{BridgeError, BridgeResult};
use crate::packet::Packet;

/// Lifecycle and packet events the engine delivers for one connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Transport established and key exchange finished.
    Connected,
    /// A decoded packet, offered to the bridge before default processing.
    Packet(Packet),
    /// The underlying transport closed or failed.
    Lost { reason: Option<String> },
    /// The transport's write buffer is saturated.
    PauseWriting,
    /// The transport's write buffer drained.
    ResumeWriting,
}

/// Commands the bridge issues back to the engine for one connection.
#[derive(Debug, PartialEq, Eq)]
pub enum EngineCommand {
    /// Encode and transmit a packet on this connection's own transport.
    Send { msg_type: u8, payload: Bytes },
    /// Run the engine's default processing for a packet previously delivered
    /// as an event (used for `internal` dispositions and the auth replay).
    Process(Packet),
    /// Stop reading from the peer socket until resumed.
    PauseReading,
    /// Resume reading from the peer socket.
    ResumeReading,
    /// Tear the connection down.
    Close,
}

/// Cloneable command handle for one engine connection.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(commands: mpsc::Sender<EngineCommand>) -> Self {
        Self { commands }
    }

    /// Enqueue a packet for transmission on this leg.
    pub async fn send_packet(&self, msg_type: u8, payload: Bytes) -> BridgeResult<()> {
        self.command(EngineCommand::Send { msg_type, payload }).await
    }

    /// Hand a packet to the engine's default processing pipeline.
    pub async fn process(&self, packet: Packet) -> BridgeResult<()> {
        self.command(EngineCommand::Process(packet)).await
    }

    pub async fn pause_reading(&self) -> BridgeResult<()> {
        self.command(EngineCommand::PauseReading).await
    }

    pub async fn resume_reading(&self) -> BridgeResult<()> {
        self.command(EngineCommand::ResumeReading).await
    }

    /// Ask the engine to close this connection. Best effort: a connection the
    /// engine already dropped counts as closed.
    pub async fn close(&self) {
        let _ = self.commands.send(EngineCommand::Close).await;
    }

    async fn command(&self, command: EngineCommand) -> BridgeResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BridgeError::transport_lost("engine command channel closed"))
    }
}

/// One terminated SSH session, source or destination role, owned by exactly
/// one bridge session.
pub struct Connection {
    role: Role,
    events: mpsc::Receiver<ConnectionEvent>,
    handle: EngineHandle,
}

impl Connection {
    pub fn new(role: Role, events: mpsc::Receiver<ConnectionEvent>, handle: EngineHandle) -> Self {
        Self { role, events, handle }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Next event from the engine; `None` means the engine dropped the
    /// connection without an explicit `Lost` notification.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }
}

/// Establishes the destination leg: TCP connect, SSH handshake, and
/// authentication as the captured username, using the configured client keys.
/// Implemented by the engine adapter; implementations must be cancel-safe
/// since a pending connect is aborted when the client disconnects first.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, params: DestinationParams) -> BridgeResult<Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_delivers_commands_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = EngineHandle::new(tx);
        handle.send_packet(94, Bytes::from_static(b"abc")).await.unwrap();
        handle.pause_reading().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineCommand::Send {
                msg_type: 94,
                payload: Bytes::from_static(b"abc")
            }
        );
        assert_eq!(rx.recv().await.unwrap(), EngineCommand::PauseReading);
    }

    #[tokio::test]
    async fn commands_after_engine_drop_report_transport_lost() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle::new(tx);
        let err = handle.resume_reading().await.unwrap_err();
        assert!(matches!(err, BridgeError::TransportLost(_)));
        // Close never fails.
        handle.close().await;
    }
}
