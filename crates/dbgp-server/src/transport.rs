//! Transport actor: owns the listener and the session table.
//!
//! Runs as one task. Requests arrive over the bridge, accepted sockets
//! and reader shutdowns arrive over internal channels; every request is
//! answered with exactly one `Completed` event.
//!
//! Only open sessions are kept in the table. Session ids come from a
//! monotonic counter, so an id below the counter that is missing from
//! the table belongs to a closed session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use dbgp_proto::{SessionId, DEFAULT_MAX_PACKET_LEN};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{BridgeEvent, BridgeRequest, RequestId, RequestKind, TransportSide};
use crate::error::TransportError;
use crate::session::{Outbound, SessionHandle, SessionSignal};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Default number of simultaneously open sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 8;

/// Settings the transport needs from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Interface to bind, e.g. `127.0.0.1`.
    pub bind_address: String,
    /// Further connections are dropped once this many are open.
    pub max_sessions: usize,
    /// Largest accepted inbound packet.
    pub max_packet_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
        }
    }
}

struct Accepted {
    stream: TcpStream,
    peer: SocketAddr,
}

/// The transport task state.
pub struct Transport {
    config: TransportConfig,
    bridge: TransportSide,
    accepted_tx: mpsc::Sender<Accepted>,
    accepted_rx: mpsc::Receiver<Accepted>,
    signals_tx: mpsc::Sender<SessionSignal>,
    signals_rx: mpsc::Receiver<SessionSignal>,
    listener: Option<JoinHandle<()>>,
    sessions: HashMap<SessionId, SessionHandle>,
    next_session: u64,
}

impl Transport {
    /// Create a transport serving the given bridge half.
    pub fn new(config: TransportConfig, bridge: TransportSide) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::channel(16);
        let (signals_tx, signals_rx) = mpsc::channel(64);
        Self {
            config,
            bridge,
            accepted_tx,
            accepted_rx,
            signals_tx,
            signals_rx,
            listener: None,
            sessions: HashMap::new(),
            next_session: 0,
        }
    }

    /// Spawn the transport onto the current runtime.
    pub fn spawn(config: TransportConfig, bridge: TransportSide) -> JoinHandle<()> {
        tokio::spawn(Self::new(config, bridge).run())
    }

    /// Serve requests until the controller drops its request sender.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.bridge.requests.recv() => {
                    let Some(request) = request else { break };
                    if self.handle_request(request).await.is_err() {
                        break;
                    }
                }
                Some(accepted) = self.accepted_rx.recv() => {
                    if self.handle_accepted(accepted).await.is_err() {
                        break;
                    }
                }
                Some(signal) = self.signals_rx.recv() => {
                    if self.handle_signal(signal).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.stop_listener();
        for session in self.sessions.values_mut() {
            session.close();
        }
        tracing::info!("transport stopped");
    }

    async fn handle_request(&mut self, request: BridgeRequest) -> Result<(), TransportError> {
        tracing::debug!(request = %request.id, kind = request.kind.name(), "bridge request");
        let BridgeRequest { id, kind } = request;

        let result = match kind {
            RequestKind::StartServer { port } => self.start_server(port).await,
            RequestKind::StopServer => {
                self.stop_listener();
                Ok(())
            }
            RequestKind::Disconnect => self.disconnect_all().await,
            RequestKind::CloseSession { session } => self.close_session(session).await,
            RequestKind::Send { session, text } => match self.send(id, session, text).await {
                // The writer task reports completion once the bytes are out.
                Ok(()) => return Ok(()),
                Err(e) => Err(e),
            },
        };
        self.complete(id, result).await
    }

    async fn start_server(&mut self, port: u16) -> Result<(), TransportError> {
        self.stop_listener();
        self.disconnect_all().await?;

        let address = format!("{}:{}", self.config.bind_address, port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| TransportError::Bind {
                address: address.clone(),
                message: e.to_string(),
            })?;
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or(address);
        tracing::info!(address = %local, "listening for engine connections");

        self.emit(BridgeEvent::Listening { address: local }).await?;
        self.listener = Some(tokio::spawn(accept_loop(listener, self.accepted_tx.clone())));
        Ok(())
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            tracing::info!("listener stopped");
        }
    }

    /// Close every session and forget them.
    async fn disconnect_all(&mut self) -> Result<(), TransportError> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(mut session) = self.sessions.remove(&id) {
                session.close();
                self.emit(BridgeEvent::Disconnect { session: id }).await?;
            }
        }
        Ok(())
    }

    async fn close_session(&mut self, id: SessionId) -> Result<(), TransportError> {
        let mut session = self.sessions.remove(&id).ok_or_else(|| self.missing(id))?;
        session.close();
        tracing::info!(session = %id, "session closed");
        self.emit(BridgeEvent::Disconnect { session: id }).await
    }

    /// Error for an id that is not in the session table.
    fn missing(&self, id: SessionId) -> TransportError {
        if id.raw() < self.next_session {
            TransportError::SocketClosed { session: id }
        } else {
            TransportError::SessionNotFound { session: id }
        }
    }

    async fn send(
        &mut self,
        request: RequestId,
        id: SessionId,
        text: String,
    ) -> Result<(), TransportError> {
        let session = self.sessions.get(&id).ok_or_else(|| self.missing(id))?;
        session.send(Outbound { request, text }).await
    }

    async fn handle_accepted(&mut self, accepted: Accepted) -> Result<(), TransportError> {
        if self.sessions.len() >= self.config.max_sessions {
            tracing::warn!(
                peer = %accepted.peer,
                limit = self.config.max_sessions,
                "too many sessions, dropping connection"
            );
            return Ok(());
        }

        let id = SessionId::new(self.next_session);
        self.next_session += 1;
        tracing::info!(session = %id, peer = %accepted.peer, "engine connected");

        // Connect must reach the controller before any Data of the session.
        self.emit(BridgeEvent::Connect { session: id }).await?;
        let handle = SessionHandle::spawn(
            id,
            accepted.stream,
            accepted.peer,
            self.config.max_packet_len,
            self.bridge.events.clone(),
            self.signals_tx.clone(),
        );
        self.sessions.insert(id, handle);
        Ok(())
    }

    async fn handle_signal(&mut self, signal: SessionSignal) -> Result<(), TransportError> {
        match signal {
            SessionSignal::Eof(id) => {
                // Already gone when the session was closed on request.
                let Some(mut session) = self.sessions.remove(&id) else {
                    return Ok(());
                };
                session.close();
                tracing::info!(session = %id, peer = %session.peer, "engine disconnected");
                self.emit(BridgeEvent::Disconnect { session: id }).await
            }
        }
    }

    async fn complete(
        &self,
        request: RequestId,
        result: Result<(), TransportError>,
    ) -> Result<(), TransportError> {
        if let Err(e) = &result {
            tracing::warn!(request = %request, "request failed: {}", e);
        }
        self.emit(BridgeEvent::Completed { request, result }).await
    }

    async fn emit(&self, event: BridgeEvent) -> Result<(), TransportError> {
        self.bridge
            .events
            .send(event)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

async fn accept_loop(listener: TcpListener, accepted: mpsc::Sender<Accepted>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if accepted.send(Accepted { stream, peer }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{channel, ControllerSide};

    async fn listening(transport: &mut Transport, bridge: &mut ControllerSide) -> String {
        transport.start_server(0).await.unwrap();
        match bridge.events.recv().await {
            Some(BridgeEvent::Listening { address }) => address,
            other => panic!("expected listening, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_sessions_leave_the_table() {
        let (mut bridge, side) = channel(64);
        let mut transport = Transport::new(TransportConfig::default(), side);
        let address = listening(&mut transport, &mut bridge).await;

        for _ in 0..5 {
            let engine = TcpStream::connect(&address).await.unwrap();
            let accepted = transport.accepted_rx.recv().await.unwrap();
            transport.handle_accepted(accepted).await.unwrap();
            drop(engine);
            let signal = transport.signals_rx.recv().await.unwrap();
            transport.handle_signal(signal).await.unwrap();
        }
        assert!(transport.sessions.is_empty());

        let closed = SessionId::new(3);
        let send = transport.send(RequestId::new(0), closed, "run -i t-0".into()).await;
        assert_eq!(send, Err(TransportError::SocketClosed { session: closed }));
        assert_eq!(
            transport.close_session(closed).await,
            Err(TransportError::SocketClosed { session: closed })
        );

        let unknown = SessionId::new(5);
        let send = transport.send(RequestId::new(1), unknown, "run -i t-0".into()).await;
        assert_eq!(send, Err(TransportError::SessionNotFound { session: unknown }));
    }

    #[tokio::test]
    async fn close_session_frees_a_slot() {
        let (mut bridge, side) = channel(64);
        let config = TransportConfig {
            max_sessions: 1,
            ..TransportConfig::default()
        };
        let mut transport = Transport::new(config, side);
        let address = listening(&mut transport, &mut bridge).await;

        let _first = TcpStream::connect(&address).await.unwrap();
        let accepted = transport.accepted_rx.recv().await.unwrap();
        transport.handle_accepted(accepted).await.unwrap();
        transport.close_session(SessionId::new(0)).await.unwrap();
        assert!(transport.sessions.is_empty());

        let _second = TcpStream::connect(&address).await.unwrap();
        let accepted = transport.accepted_rx.recv().await.unwrap();
        transport.handle_accepted(accepted).await.unwrap();
        assert!(transport.sessions.contains_key(&SessionId::new(1)));
    }

    #[test]
    fn transport_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.max_packet_len, DEFAULT_MAX_PACKET_LEN);
    }
}
