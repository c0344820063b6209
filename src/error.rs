//! Error taxonomy for the bridge core.

use thiserror::Error;

use crate::classify::Role;

/// Errors that can occur while bridging two SSH sessions.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Unsupported or malformed protocol traffic; fatal to the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network or handshake failure while establishing the destination leg.
    #[error("destination unreachable: {0}")]
    DestinationUnreachable(String),

    /// Local command execution failure; reported on the channel, never fatal.
    #[error("{0}")]
    Command(String),

    /// Either leg's underlying transport went away.
    #[error("transport lost: {0}")]
    TransportLost(String),

    /// Too many source packets buffered while the destination leg connects.
    #[error("pending packet queue overflowed at {0} packets")]
    QueueOverflow(usize),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to load or parse a configured private key.
    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Protocol error for a message type missing from a classification table.
    pub fn unsupported_packet(role: Role, msg_type: u8) -> Self {
        Self::Protocol(format!("unsupported packet type {msg_type} on {role} connection"))
    }

    /// Create a destination-unreachable error.
    pub fn destination_unreachable(message: impl Into<String>) -> Self {
        Self::DestinationUnreachable(message.into())
    }

    /// Create a command error.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }

    /// Create a transport-lost error.
    pub fn transport_lost(message: impl Into<String>) -> Self {
        Self::TransportLost(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
