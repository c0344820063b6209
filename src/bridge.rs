//! The bridge orchestrator: pairs one source and one destination connection
//! and drives the classification-based relay between them.
//!
//! A session starts with only the source leg. The first auth request from the
//! client is intercepted, its username decoded, and the destination leg is
//! established on a spawned task so the source keeps servicing I/O meanwhile.
//! Once the destination handshake completes, the original auth request is
//! replayed through the source engine's default pipeline and every later
//! packet is dispatched per the classification tables. Both legs live and die
//! together: loss of either closes the counterpart, and a failed destination
//! connect rejects the client's authentication instead of leaving it hanging.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::{Disposition, Role, classify};
use crate::config::DestinationParams;
use crate::engine::{Connection, ConnectionEvent, Connector};
use crate::error::{BridgeError, BridgeResult};
use crate::msg;
use crate::packet::{self, Packet};

/// Source packets queued above this while the destination connects cause the
/// source leg's reads to be paused.
const PENDING_SOFT_LIMIT: usize = 64;
/// Absolute bound on queued source packets; exceeding it fails the session.
const PENDING_HARD_LIMIT: usize = 256;

/// Orchestrator lifecycle. `AuthPending` covers the window between decoding
/// the intercepted auth request and scheduling the destination connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Init,
    AuthPending,
    ConnectingDestination,
    Bridged,
    Closed,
}

/// One client's bridge session: owns both legs exclusively.
pub struct BridgeSession<C: Connector> {
    state: BridgeState,
    source: Connection,
    destination: Option<Connection>,
    dest_template: DestinationParams,
    connector: Arc<C>,
    /// The intercepted auth request, held unmodified for replay.
    held_auth: Option<Packet>,
    /// Source packets received while the destination leg connects.
    pending: VecDeque<Packet>,
    connect_result: Option<oneshot::Receiver<BridgeResult<Connection>>>,
    connect_task: Option<JoinHandle<()>>,
    source_reads_paused: bool,
    /// Source writer saturated before the destination leg existed; applied
    /// as soon as the leg is installed.
    deferred_dest_pause: bool,
    torn_down: bool,
}

enum LoopEvent {
    Source(Option<ConnectionEvent>),
    Destination(Option<ConnectionEvent>),
    ConnectFinished(BridgeResult<Connection>),
}

impl<C: Connector> BridgeSession<C> {
    /// Create a session for a freshly accepted source connection. The
    /// destination template must already be a per-session copy.
    pub fn new(source: Connection, dest_template: DestinationParams, connector: Arc<C>) -> Self {
        Self {
            state: BridgeState::Init,
            source,
            destination: None,
            dest_template,
            connector,
            held_auth: None,
            pending: VecDeque::new(),
            connect_result: None,
            connect_task: None,
            source_reads_paused: false,
            deferred_dest_pause: false,
            torn_down: false,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Drive the session until either leg closes or a fatal error occurs.
    /// Both legs are torn down before this returns.
    pub async fn run(mut self) -> BridgeResult<()> {
        let result = self.run_loop().await;
        self.teardown("session finished").await;
        result
    }

    async fn run_loop(&mut self) -> BridgeResult<()> {
        while self.state != BridgeState::Closed {
            let event = {
                let has_destination = self.destination.is_some();
                let connecting = self.connect_result.is_some();
                let source = &mut self.source;
                let destination = &mut self.destination;
                let connect_result = &mut self.connect_result;
                tokio::select! {
                    ev = source.next_event() => LoopEvent::Source(ev),
                    ev = next_destination_event(destination), if has_destination => {
                        LoopEvent::Destination(ev)
                    }
                    res = await_connect(connect_result), if connecting => {
                        LoopEvent::ConnectFinished(res)
                    }
                }
            };

            match event {
                LoopEvent::Source(None) => self.on_lost(Role::Source, None).await,
                LoopEvent::Source(Some(ev)) => self.on_source_event(ev).await?,
                LoopEvent::Destination(None) => self.on_lost(Role::Destination, None).await,
                LoopEvent::Destination(Some(ev)) => self.on_destination_event(ev).await?,
                LoopEvent::ConnectFinished(res) => {
                    self.connect_result = None;
                    self.on_destination_result(res).await?;
                }
            }
        }
        Ok(())
    }

    async fn on_source_event(&mut self, event: ConnectionEvent) -> BridgeResult<()> {
        match event {
            ConnectionEvent::Connected => {
                debug!("source connection established");
                Ok(())
            }
            ConnectionEvent::Packet(pkt) => self.on_source_packet(pkt).await,
            ConnectionEvent::Lost { reason } => {
                self.on_lost(Role::Source, reason).await;
                Ok(())
            }
            // Destination-side backpressure propagation: a saturated source
            // writer means the destination must stop producing, and vice
            // versa below.
            ConnectionEvent::PauseWriting => {
                match &self.destination {
                    Some(dest) => dest.handle().pause_reading().await?,
                    None => self.deferred_dest_pause = true,
                }
                Ok(())
            }
            ConnectionEvent::ResumeWriting => {
                match &self.destination {
                    Some(dest) => dest.handle().resume_reading().await?,
                    None => self.deferred_dest_pause = false,
                }
                Ok(())
            }
        }
    }

    async fn on_destination_event(&mut self, event: ConnectionEvent) -> BridgeResult<()> {
        match event {
            ConnectionEvent::Connected => {
                debug!("destination connection established");
                Ok(())
            }
            ConnectionEvent::Packet(pkt) => self.dispatch_destination(pkt).await,
            ConnectionEvent::Lost { reason } => {
                self.on_lost(Role::Destination, reason).await;
                Ok(())
            }
            ConnectionEvent::PauseWriting => self.source.handle().pause_reading().await,
            ConnectionEvent::ResumeWriting => {
                if !self.source_reads_paused {
                    self.source.handle().resume_reading().await?;
                }
                Ok(())
            }
        }
    }

    async fn on_source_packet(&mut self, pkt: Packet) -> BridgeResult<()> {
        match self.state {
            BridgeState::Init => match classify(Role::Source, pkt.msg_type)? {
                Disposition::Internal => self.source.handle().process(pkt).await,
                Disposition::Intercept => self.begin_destination_connect(pkt),
                // A client may give up before authenticating; there is no
                // destination yet, so this is a clean close, not an error.
                Disposition::Redirect if pkt.msg_type == msg::DISCONNECT => {
                    self.teardown("client disconnected before authentication").await;
                    Ok(())
                }
                Disposition::Redirect => Err(BridgeError::protocol(format!(
                    "channel packet type {} before authentication",
                    pkt.msg_type
                ))),
            },
            BridgeState::AuthPending | BridgeState::ConnectingDestination => {
                // Validate the type now so an unclassifiable packet fails the
                // session immediately rather than after the connect resolves.
                classify(Role::Source, pkt.msg_type)?;
                self.enqueue_pending(pkt).await
            }
            BridgeState::Bridged => self.dispatch_source(pkt).await,
            BridgeState::Closed => Ok(()),
        }
    }

    /// Capture the username from the first auth request and kick off the
    /// destination connect without blocking the source event loop.
    fn begin_destination_connect(&mut self, pkt: Packet) -> BridgeResult<()> {
        let username = packet::auth_username(&pkt.payload)?;
        self.state = BridgeState::AuthPending;

        let params = self.dest_template.for_user(&username);
        info!(user = %username, target = %params.address(), "establishing destination connection");

        let connector = Arc::clone(&self.connector);
        let (tx, rx) = oneshot::channel();
        self.connect_task = Some(tokio::spawn(async move {
            let _ = tx.send(connector.connect(params).await);
        }));
        self.connect_result = Some(rx);
        self.held_auth = Some(pkt);
        self.state = BridgeState::ConnectingDestination;
        Ok(())
    }

    async fn enqueue_pending(&mut self, pkt: Packet) -> BridgeResult<()> {
        if self.pending.len() >= PENDING_HARD_LIMIT {
            return Err(BridgeError::QueueOverflow(self.pending.len()));
        }
        self.pending.push_back(pkt);
        if self.pending.len() >= PENDING_SOFT_LIMIT && !self.source_reads_paused {
            debug!(queued = self.pending.len(), "pausing source reads while destination connects");
            self.source.handle().pause_reading().await?;
            self.source_reads_paused = true;
        }
        Ok(())
    }

    async fn on_destination_result(&mut self, result: BridgeResult<Connection>) -> BridgeResult<()> {
        self.connect_task = None;
        let held_auth = self
            .held_auth
            .take()
            .ok_or_else(|| BridgeError::protocol("destination resolved without a held auth request"))?;

        match result {
            Ok(destination) => {
                debug!(target = %self.dest_template.host, "destination leg ready, replaying auth request");
                // Backpressure the source signalled before this leg existed.
                if self.deferred_dest_pause {
                    destination.handle().pause_reading().await?;
                    self.deferred_dest_pause = false;
                }
                self.destination = Some(destination);
                // Replay the original, unmodified auth request so the source
                // engine's own auth pipeline runs it.
                self.source.handle().process(held_auth).await?;
                self.state = BridgeState::Bridged;

                while let Some(pkt) = self.pending.pop_front() {
                    self.dispatch_source(pkt).await?;
                }
                if self.source_reads_paused {
                    self.source.handle().resume_reading().await?;
                    self.source_reads_paused = false;
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, target = %self.dest_template.address(),
                    "destination connection failed, rejecting client authentication");
                // Deterministic failure toward the client; no replay happens,
                // so the source auth pipeline never sees the request.
                let _ = self
                    .source
                    .handle()
                    .send_packet(msg::USERAUTH_FAILURE, packet::auth_failure_payload())
                    .await;
                self.teardown("destination unreachable").await;
                Err(err)
            }
        }
    }

    async fn dispatch_source(&mut self, pkt: Packet) -> BridgeResult<()> {
        match classify(Role::Source, pkt.msg_type)? {
            Disposition::Redirect => match &self.destination {
                Some(dest) => dest.handle().send_packet(pkt.msg_type, pkt.payload).await,
                None => Err(BridgeError::protocol("redirect with no destination connection")),
            },
            // Once bridged, further auth requests are the source engine's
            // business; intercepting again would dial a second destination.
            Disposition::Internal | Disposition::Intercept => self.source.handle().process(pkt).await,
        }
    }

    async fn dispatch_destination(&mut self, pkt: Packet) -> BridgeResult<()> {
        match classify(Role::Destination, pkt.msg_type)? {
            Disposition::Redirect => self.source.handle().send_packet(pkt.msg_type, pkt.payload).await,
            Disposition::Internal | Disposition::Intercept => match &self.destination {
                Some(dest) => dest.handle().process(pkt).await,
                None => Ok(()),
            },
        }
    }

    async fn on_lost(&mut self, role: Role, reason: Option<String>) {
        if self.state != BridgeState::Closed {
            info!(
                leg = %role,
                reason = %reason.as_deref().unwrap_or("connection closed"),
                "transport lost, closing counterpart"
            );
        }
        self.teardown("transport lost").await;
    }

    /// Close both legs and cancel any in-flight destination connect.
    /// Idempotent.
    async fn teardown(&mut self, reason: &str) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.connect_result = None;
        self.source.handle().close().await;
        if let Some(dest) = &self.destination {
            dest.handle().close().await;
        }
        debug!(reason, "bridge session closed");
        self.state = BridgeState::Closed;
    }
}

async fn next_destination_event(destination: &mut Option<Connection>) -> Option<ConnectionEvent> {
    match destination {
        Some(conn) => conn.next_event().await,
        None => std::future::pending().await,
    }
}

async fn await_connect(
    result: &mut Option<oneshot::Receiver<BridgeResult<Connection>>>,
) -> BridgeResult<Connection> {
    match result {
        Some(rx) => match rx.await {
            Ok(res) => res,
            Err(_) => Err(BridgeError::destination_unreachable("destination connect task dropped")),
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::{Bytes, BytesMut};
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::EngineHandle;

    struct NeverConnector;

    #[async_trait]
    impl Connector for NeverConnector {
        async fn connect(&self, _params: DestinationParams) -> BridgeResult<Connection> {
            std::future::pending().await
        }
    }

    fn session() -> (BridgeSession<NeverConnector>, mpsc::Receiver<crate::engine::EngineCommand>) {
        let (_event_tx, event_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let source = Connection::new(Role::Source, event_rx, EngineHandle::new(command_tx));
        let template = DestinationParams {
            host: "target.example".into(),
            port: 22,
            username: None,
            client_keys: Vec::new(),
        };
        (BridgeSession::new(source, template, Arc::new(NeverConnector)), command_rx)
    }

    fn auth_packet(user: &str) -> Packet {
        let mut buf = BytesMut::new();
        packet::put_string(&mut buf, user.as_bytes());
        packet::put_string(&mut buf, b"ssh-connection");
        Packet::new(msg::USERAUTH_REQUEST, 3, buf.freeze())
    }

    #[tokio::test]
    async fn first_auth_request_moves_to_connecting_destination() {
        let (mut session, _commands) = session();
        assert_eq!(session.state(), BridgeState::Init);
        session.on_source_packet(auth_packet("alice")).await.unwrap();
        assert_eq!(session.state(), BridgeState::ConnectingDestination);
        assert!(session.held_auth.is_some());
    }

    #[tokio::test]
    async fn malformed_auth_request_is_a_protocol_error() {
        let (mut session, _commands) = session();
        let truncated = Packet::new(msg::USERAUTH_REQUEST, 3, Bytes::from_static(&[0, 0, 0, 40]));
        let err = session.on_source_packet(truncated).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert_eq!(session.state(), BridgeState::Init);
    }

    #[tokio::test]
    async fn packets_while_connecting_are_queued_not_dispatched() {
        let (mut session, _commands) = session();
        session.on_source_packet(auth_packet("alice")).await.unwrap();
        session
            .on_source_packet(Packet::new(msg::CHANNEL_OPEN, 4, Bytes::from_static(b"session")))
            .await
            .unwrap();
        assert_eq!(session.pending.len(), 1);
        assert_eq!(session.state(), BridgeState::ConnectingDestination);
    }
}
