//! Terminating SSH bridge.
//!
//! The bridge sits between an SSH client and a real destination host. Both
//! legs are fully terminated SSH sessions owned by the same [`bridge::BridgeSession`]:
//! the inbound ("source") leg is accepted locally, and the outbound
//! ("destination") leg is dialled lazily once the client's first
//! authentication request reveals the username to connect with. From then on
//! channel-level packets are classified per leg and either handed back to the
//! underlying protocol engine, relayed verbatim to the counterpart, or
//! serviced locally.
//!
//! The SSH transport engine itself (key exchange, framing, ciphers) is not
//! part of this crate. It is consumed through the contract in [`engine`]: a
//! stream of decoded packet and lifecycle events per connection, plus a
//! command handle for raw sends, default processing, and read flow control.
//! An engine adapter embeds the crate by implementing [`engine::Connector`]
//! and [`server::ServiceSource`] and driving [`server::Service::run`].

pub mod bridge;
pub mod classify;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod msg;
pub mod packet;
pub mod server;
pub mod session;

pub use error::{BridgeError, BridgeResult};
