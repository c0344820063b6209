//! Per-role packet classification.
//!
//! Each leg of the bridge has a fixed table mapping SSH message types to a
//! disposition. The tables are complete by construction: a type without an
//! entry is a fatal protocol error, never a silent drop. Channel numbers
//! inside redirected payloads pass through unremapped; this stays correct
//! only because channel opens are forwarded 1:1 and the bridge never opens
//! channels of its own.

use std::fmt;

use crate::error::{BridgeError, BridgeResult};
use crate::msg;

/// Which leg of the bridge a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The terminated session between the bridge and the connecting client.
    Source,
    /// The terminated session between the bridge and the real target host.
    Destination,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Destination => f.write_str("destination"),
        }
    }
}

/// What the bridge does with a packet of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand back to the engine's default processing, unmodified.
    Internal,
    /// Forward the payload verbatim to the paired connection under the same
    /// message type.
    Redirect,
    /// Custom handling that inspects the packet before deciding what flows.
    Intercept,
}

/// Classify a message type for one leg of the bridge.
pub fn classify(role: Role, msg_type: u8) -> BridgeResult<Disposition> {
    let disposition = match role {
        Role::Source => match msg_type {
            msg::KEXINIT | msg::NEWKEYS | msg::SERVICE_REQUEST => Disposition::Internal,
            msg::USERAUTH_REQUEST => Disposition::Intercept,
            msg::CHANNEL_OPEN
            | msg::CHANNEL_REQUEST
            | msg::CHANNEL_DATA
            | msg::CHANNEL_CLOSE
            | msg::CHANNEL_EOF
            | msg::DISCONNECT => Disposition::Redirect,
            other => return Err(BridgeError::unsupported_packet(role, other)),
        },
        Role::Destination => match msg_type {
            msg::GLOBAL_REQUEST => Disposition::Internal,
            msg::CHANNEL_OPEN_CONFIRMATION
            | msg::CHANNEL_SUCCESS
            | msg::CHANNEL_WINDOW_ADJUST
            | msg::CHANNEL_DATA
            | msg::CHANNEL_REQUEST
            | msg::CHANNEL_EXTENDED_DATA
            | msg::CHANNEL_EOF
            | msg::CHANNEL_CLOSE => Disposition::Redirect,
            other => return Err(BridgeError::unsupported_packet(role, other)),
        },
    };
    Ok(disposition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_table_matches_design() {
        for t in [msg::KEXINIT, msg::NEWKEYS, msg::SERVICE_REQUEST] {
            assert_eq!(classify(Role::Source, t).unwrap(), Disposition::Internal);
        }
        assert_eq!(classify(Role::Source, msg::USERAUTH_REQUEST).unwrap(), Disposition::Intercept);
        for t in [
            msg::CHANNEL_OPEN,
            msg::CHANNEL_REQUEST,
            msg::CHANNEL_DATA,
            msg::CHANNEL_CLOSE,
            msg::CHANNEL_EOF,
            msg::DISCONNECT,
        ] {
            assert_eq!(classify(Role::Source, t).unwrap(), Disposition::Redirect);
        }
    }

    #[test]
    fn destination_table_matches_design() {
        assert_eq!(classify(Role::Destination, msg::GLOBAL_REQUEST).unwrap(), Disposition::Internal);
        for t in [
            msg::CHANNEL_OPEN_CONFIRMATION,
            msg::CHANNEL_SUCCESS,
            msg::CHANNEL_WINDOW_ADJUST,
            msg::CHANNEL_DATA,
            msg::CHANNEL_REQUEST,
            msg::CHANNEL_EXTENDED_DATA,
            msg::CHANNEL_EOF,
            msg::CHANNEL_CLOSE,
        ] {
            assert_eq!(classify(Role::Destination, t).unwrap(), Disposition::Redirect);
        }
    }

    #[test]
    fn unmapped_types_are_protocol_errors() {
        // Types valid on one leg are not implicitly valid on the other.
        assert!(classify(Role::Destination, msg::USERAUTH_REQUEST).is_err());
        assert!(classify(Role::Source, msg::CHANNEL_WINDOW_ADJUST).is_err());
        let err = classify(Role::Source, 200).unwrap_err();
        assert!(err.to_string().contains("unsupported packet type 200"));
    }
}
