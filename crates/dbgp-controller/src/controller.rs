//! The session controller task.
//!
//! One task owns the transaction registry, the session state, the
//! breakpoints and the context-name cache. Multi-step flows (handshake,
//! break inspection, eval) issue a command, hand its pending response to
//! a spawned task, and continue when that task posts a [`Continuation`]
//! back into the controller's inbox.
//!
//! Bridge requests are queued in an outbox and handed to the transport
//! from the main loop, so issuing a command never waits on the
//! transport while bridge events pile up behind it.

use std::collections::{HashMap, VecDeque};

use dbgp_proto::{
    to_editor_path, to_engine_path, Breakpoint, BreakMessage, BreakpointStore, Command, Context,
    EngineError, InitPacket, Packet, PendingResponse, ResponsePacket, SessionId, StackFrame,
    TransactionError, TransactionId, TransactionRegistry, TransactionResult, DEFAULT_MAX_PENDING,
};
use dbgp_server::{
    BridgeEvent, BridgeRequest, ControllerSide, RequestId, RequestKind, TransportError,
};
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::error::{ControllerError, HandshakeError};
use crate::event::DebuggerEvent;
use crate::input::UserCommand;
use crate::state::{ControllerState, SessionStatus};

/// Default DBGP port.
pub const DEFAULT_PORT: u16 = 9000;

/// Name of the context holding superglobals.
const SUPERGLOBALS: &str = "Superglobals";

/// Depth limit used while evaluating console expressions.
const EVAL_MAX_DEPTH: &str = "3";
/// Depth limit restored after an evaluation.
const DEFAULT_MAX_DEPTH: &str = "1";

/// Behaviour switches taken from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Port requested by `start`.
    pub port: u16,
    /// IDE key engines must offer.
    pub idekey: String,
    /// Language engines must debug.
    pub language: String,
    /// Cap on pending transactions.
    pub max_pending_transactions: usize,
    /// Send breakpoint files as `file://` URIs.
    pub file_uris: bool,
    /// Log every packet and command verbatim.
    pub debug: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            idekey: "xdebug".to_string(),
            language: "PHP".to_string(),
            max_pending_transactions: DEFAULT_MAX_PENDING,
            file_uris: false,
            debug: false,
        }
    }
}

/// Work resumed on the controller task once a response arrived.
#[derive(Debug)]
enum Continuation {
    Handshake {
        session: SessionId,
        acks: Vec<(Breakpoint, TransactionResult)>,
    },
    Stack {
        session: SessionId,
        hint: Option<BreakMessage>,
        result: TransactionResult,
    },
    Locals {
        session: SessionId,
        depth: u32,
        result: TransactionResult,
    },
    ContextNames {
        session: SessionId,
        result: TransactionResult,
    },
    Superglobals {
        session: SessionId,
        result: TransactionResult,
    },
    EvalPrepared {
        session: SessionId,
        expression: String,
        result: TransactionResult,
    },
    Evaluated {
        session: SessionId,
        expression: String,
        result: TransactionResult,
    },
    Expanded {
        session: SessionId,
        name: String,
        result: TransactionResult,
    },
    BreakpointSet {
        session: SessionId,
        breakpoint: Breakpoint,
        result: TransactionResult,
    },
    Finished {
        command: &'static str,
        result: TransactionResult,
    },
}

/// What a bridge request was issued for.
#[derive(Debug)]
enum PendingRequest {
    Send {
        session: SessionId,
        transaction: TransactionId,
    },
    StartServer,
    StopServer,
    Disconnect,
    CloseSession(SessionId),
}

/// The controller task state.
pub struct Controller {
    options: ControllerOptions,
    bridge: ControllerSide,
    events: mpsc::Sender<DebuggerEvent>,
    inbox_tx: mpsc::Sender<Continuation>,
    inbox_rx: mpsc::Receiver<Continuation>,
    registry: TransactionRegistry,
    state: ControllerState,
    breakpoints: BreakpointStore,
    context_names: Option<HashMap<String, String>>,
    requests: HashMap<RequestId, PendingRequest>,
    outbox: VecDeque<BridgeRequest>,
    next_request: u64,
}

impl Controller {
    /// Create a controller talking to the transport over `bridge` and
    /// reporting to `events`.
    pub fn new(
        options: ControllerOptions,
        bridge: ControllerSide,
        events: mpsc::Sender<DebuggerEvent>,
        breakpoints: BreakpointStore,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(64);
        let registry = TransactionRegistry::with_limit(options.max_pending_transactions.max(1));
        Self {
            options,
            bridge,
            events,
            inbox_tx,
            inbox_rx,
            registry,
            state: ControllerState::new(),
            breakpoints,
            context_names: None,
            requests: HashMap::new(),
            outbox: VecDeque::new(),
            next_request: 0,
        }
    }

    /// Process bridge events, user commands and continuations until
    /// `Shutdown`, until the user channel closes, or until the transport
    /// goes away.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) {
        loop {
            let outcome = tokio::select! {
                event = self.bridge.events.recv() => match event {
                    Some(event) => self.handle_bridge_event(event).await,
                    None => {
                        tracing::info!("transport closed the bridge");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(UserCommand::Shutdown) | None => {
                        self.shutdown();
                        break;
                    }
                    Some(command) => self.handle_user_command(command).await,
                },
                Some(next) = self.inbox_rx.recv() => self.handle_continuation(next).await,
                permit = self.bridge.requests.clone().reserve_owned(), if !self.outbox.is_empty() => {
                    match permit {
                        Ok(permit) => {
                            if let Some(request) = self.outbox.pop_front() {
                                permit.send(request);
                            }
                            Ok(())
                        }
                        Err(_) => Err(ControllerError::BridgeClosed),
                    }
                }
            };

            match outcome {
                Ok(()) => {}
                Err(ControllerError::BridgeClosed) => {
                    tracing::info!("bridge closed, controller stopping");
                    break;
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    self.emit(DebuggerEvent::error(e.to_string())).await;
                }
            }
        }
        self.flush_outbox().await;
        tracing::info!("controller stopped");
    }

    /// Hand the remaining queued requests to the transport, discarding
    /// bridge events so the transport can keep accepting them.
    async fn flush_outbox(&mut self) {
        while !self.outbox.is_empty() {
            tokio::select! {
                permit = self.bridge.requests.clone().reserve_owned() => match permit {
                    Ok(permit) => {
                        if let Some(request) = self.outbox.pop_front() {
                            permit.send(request);
                        }
                    }
                    Err(_) => {
                        tracing::debug!(dropped = self.outbox.len(), "bridge closed with requests queued");
                        self.outbox.clear();
                    }
                },
                event = self.bridge.events.recv() => {
                    if event.is_none() {
                        self.outbox.clear();
                    }
                }
            }
        }
    }

    // =====================================================================
    // Bridge events
    // =====================================================================

    async fn handle_bridge_event(&mut self, event: BridgeEvent) -> Result<(), ControllerError> {
        match event {
            BridgeEvent::Listening { address } => {
                tracing::info!(
                    address = %address,
                    idekey = %self.options.idekey,
                    "server started"
                );
                self.emit(DebuggerEvent::ServerStarted { address }).await;
            }
            BridgeEvent::Connect { session } => self.on_connect(session).await,
            BridgeEvent::Disconnect { session } => self.on_disconnect(session).await,
            BridgeEvent::Data { session, text } => self.on_data(session, &text).await?,
            BridgeEvent::Completed { request, result } => {
                self.on_completed(request, result).await
            }
        }
        Ok(())
    }

    async fn on_connect(&mut self, session: SessionId) {
        if self.state.activate(session) {
            tracing::info!(session = %session, "session connected");
            self.emit(DebuggerEvent::Connected { session }).await;
        } else {
            tracing::debug!(session = %session, "ignoring connection, another session is active");
            self.state.ignore(session);
            self.emit(DebuggerEvent::SessionIgnored { session }).await;
        }
    }

    async fn on_disconnect(&mut self, session: SessionId) {
        // Queued writes of a closed session never report completion.
        self.requests.retain(|_, pending| {
            !matches!(pending, PendingRequest::Send { session: s, .. } if *s == session)
        });
        if self.state.deactivate(session) {
            let cancelled = self.registry.cancel_session(session);
            self.breakpoints.clear_server_ids();
            tracing::info!(session = %session, cancelled, "session disconnected");
            self.emit(DebuggerEvent::Disconnected { session }).await;
        } else if self.state.forget_ignored(session) {
            tracing::debug!(session = %session, "ignored session disconnected");
        }
    }

    async fn on_completed(&mut self, request: RequestId, result: Result<(), TransportError>) {
        let Some(pending) = self.requests.remove(&request) else {
            tracing::debug!(request = %request, "completion for unknown request");
            return;
        };
        match (pending, result) {
            (PendingRequest::Send { transaction, .. }, Err(e)) => {
                self.registry
                    .fail(&transaction, TransactionError::Transport(e.to_string()));
            }
            (PendingRequest::Send { .. }, Ok(())) => {}
            (PendingRequest::StopServer, Ok(())) => {
                tracing::info!("server stopped");
                self.emit(DebuggerEvent::ServerStopped).await;
            }
            (PendingRequest::StartServer, Ok(()))
            | (PendingRequest::Disconnect, Ok(()))
            | (PendingRequest::CloseSession(_), Ok(())) => {}
            (PendingRequest::StartServer, Err(e)) => {
                tracing::error!("failed to start server: {}", e);
                self.emit(DebuggerEvent::error(format!("failed to start server: {e}")))
                    .await;
            }
            (PendingRequest::CloseSession(session), Err(e)) => {
                self.emit(DebuggerEvent::error(format!("cannot close {session}: {e}")))
                    .await;
            }
            (PendingRequest::StopServer, Err(e)) | (PendingRequest::Disconnect, Err(e)) => {
                self.emit(DebuggerEvent::error(e.to_string())).await;
            }
        }
    }

    async fn on_data(&mut self, session: SessionId, text: &str) -> Result<(), ControllerError> {
        if !self.state.is_active(session) {
            tracing::debug!(session = %session, "dropping packet of inactive session");
            return Ok(());
        }
        if self.options.debug {
            tracing::debug!(session = %session, "<- {}", text);
        }

        let packet = match Packet::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(session = %session, "undecodable packet: {}", e);
                return Ok(());
            }
        };

        let status = packet.status();
        let error = packet.error().cloned();
        let message = packet.message().cloned();
        if let Some(status) = status {
            self.state.set_status(session, status.into());
        }

        match packet {
            Packet::Init(init) => self.on_init(session, init).await?,
            Packet::Response(response) => {
                self.registry.resolve(response);
            }
            Packet::Status(_) => {}
        }

        if let Some(EngineError { code, message }) = error {
            tracing::error!(session = %session, code = ?code, "engine error: {}", message);
            self.emit(DebuggerEvent::EngineError { code, message }).await;
        }

        match status.map(SessionStatus::from) {
            Some(SessionStatus::Break) => self.on_break(session, message).await?,
            Some(SessionStatus::Stopping) => {
                self.request(RequestKind::Disconnect, PendingRequest::Disconnect)
            }
            _ => {}
        }
        Ok(())
    }

    // =====================================================================
    // Handshake
    // =====================================================================

    fn check_init(&self, init: &InitPacket) -> Result<(), HandshakeError> {
        if init.language != self.options.language {
            return Err(HandshakeError::WrongLanguage {
                expected: self.options.language.clone(),
                actual: init.language.clone(),
            });
        }
        if !init.accepts_idekey(&self.options.idekey) {
            return Err(HandshakeError::WrongIdeKey {
                offered: init.idekey.clone(),
            });
        }
        if self.breakpoints.is_empty() {
            return Err(HandshakeError::NoBreakpoints);
        }
        Ok(())
    }

    async fn on_init(&mut self, session: SessionId, init: InitPacket) -> Result<(), ControllerError> {
        tracing::info!(
            session = %session,
            language = %init.language,
            engine = init.engine_name.as_deref().unwrap_or("unknown"),
            version = init.engine_version.as_deref().unwrap_or("unknown"),
            file = init.fileuri.as_deref().unwrap_or(""),
            "engine handshake"
        );

        if let Err(e) = self.check_init(&init) {
            tracing::error!(session = %session, "{}", e);
            self.emit(DebuggerEvent::error(e.to_string())).await;
            self.request(RequestKind::Disconnect, PendingRequest::Disconnect);
            return Ok(());
        }
        self.state.set_status(session, SessionStatus::Connected);

        let mut pending = Vec::with_capacity(self.breakpoints.len());
        for bp in self.breakpoints.all().to_vec() {
            let cmd = self.breakpoint_command(&bp);
            let rx = self.execute(session, cmd)?;
            pending.push((bp, rx));
        }

        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let (breakpoints, receivers): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
            let results = join_all(receivers.into_iter().map(settle)).await;
            let acks = breakpoints.into_iter().zip(results).collect();
            let _ = inbox.send(Continuation::Handshake { session, acks }).await;
        });
        Ok(())
    }

    async fn finish_handshake(
        &mut self,
        session: SessionId,
        acks: Vec<(Breakpoint, TransactionResult)>,
    ) -> Result<(), ControllerError> {
        if !self.state.is_active(session) {
            return Ok(());
        }
        let mut failed = false;
        for (bp, result) in acks {
            match result {
                Ok(response) => {
                    if let Some(id) = response.id {
                        self.acknowledge_breakpoint(session, &bp, id)?;
                    }
                }
                Err(e) => {
                    failed = true;
                    tracing::error!(session = %session, file = %bp.path, line = bp.line + 1, "breakpoint_set failed: {}", e);
                    self.emit(DebuggerEvent::error(format!(
                        "breakpoint {}:{} failed: {e}",
                        bp.path,
                        bp.line + 1
                    )))
                    .await;
                }
            }
        }

        if failed {
            return Ok(());
        }
        let rx = self.execute(session, Command::run())?;
        self.follow_up(rx, |result| Continuation::Finished {
            command: "run",
            result,
        });
        Ok(())
    }

    /// Attach the engine id to its breakpoint. An engine breakpoint whose
    /// local one was removed (or already carries an id) is removed again.
    fn acknowledge_breakpoint(
        &mut self,
        session: SessionId,
        bp: &Breakpoint,
        server_id: String,
    ) -> Result<(), ControllerError> {
        let current = self.breakpoints.find(&bp.path, bp.line);
        if current.is_some_and(|known| known.server_id.is_none()) {
            tracing::debug!(file = %bp.path, line = bp.line + 1, id = %server_id, "breakpoint acknowledged");
            self.breakpoints.set_server_id(&bp.path, bp.line, server_id);
            return Ok(());
        }

        tracing::debug!(
            session = %session,
            file = %bp.path,
            line = bp.line + 1,
            id = %server_id,
            "removing breakpoint the engine no longer needs"
        );
        let rx = self.execute(session, Command::breakpoint_remove(&server_id))?;
        self.follow_up(rx, |result| Continuation::Finished {
            command: "breakpoint_remove",
            result,
        });
        Ok(())
    }

    fn breakpoint_command(&self, bp: &Breakpoint) -> Command {
        let file = if self.options.file_uris {
            to_engine_path(&bp.path)
        } else {
            bp.path.clone()
        };
        Command::breakpoint_set_line(&file, bp.line + 1)
    }

    // =====================================================================
    // Break inspection
    // =====================================================================

    async fn on_break(
        &mut self,
        session: SessionId,
        hint: Option<BreakMessage>,
    ) -> Result<(), ControllerError> {
        let rx = self.execute(session, Command::stack_get())?;
        self.follow_up(rx, move |result| Continuation::Stack {
            session,
            hint,
            result,
        });
        Ok(())
    }

    async fn on_stack(
        &mut self,
        session: SessionId,
        hint: Option<BreakMessage>,
        response: ResponsePacket,
    ) -> Result<(), ControllerError> {
        let frames: Vec<StackFrame> = response
            .stack
            .into_iter()
            .map(|frame| StackFrame {
                filename: to_editor_path(&frame.filename),
                ..frame
            })
            .collect();

        let location = match frames.first() {
            Some(top) => Some((top.filename.clone(), top.lineno)),
            None => hint.and_then(|m| Some((to_editor_path(m.filename.as_deref()?), m.lineno?))),
        };
        self.emit(DebuggerEvent::StackUpdated { frames }).await;
        if let Some((file, lineno)) = location {
            self.emit(DebuggerEvent::Paused {
                file,
                line: lineno.saturating_sub(1),
            })
            .await;
        }

        let rx = self.execute(session, Command::context_get())?;
        self.follow_up(rx, move |result| Continuation::Locals {
            session,
            depth: 0,
            result,
        });

        if self.context_names.is_some() {
            self.fetch_superglobals(session).await
        } else {
            let rx = self.execute(session, Command::context_names(0))?;
            self.follow_up(rx, move |result| Continuation::ContextNames { session, result });
            Ok(())
        }
    }

    async fn fetch_superglobals(&mut self, session: SessionId) -> Result<(), ControllerError> {
        let Some(id) = self
            .context_names
            .as_ref()
            .and_then(|names| names.get(SUPERGLOBALS))
            .cloned()
        else {
            tracing::debug!("engine has no superglobals context");
            return Ok(());
        };
        let rx = self
            .execute(session, Command::context_get().arg('c', id))?;
        self.follow_up(rx, move |result| Continuation::Superglobals { session, result });
        Ok(())
    }

    // =====================================================================
    // Continuations
    // =====================================================================

    async fn handle_continuation(&mut self, next: Continuation) -> Result<(), ControllerError> {
        match next {
            Continuation::Handshake { session, acks } => {
                self.finish_handshake(session, acks).await?;
            }
            Continuation::Stack {
                session,
                hint,
                result,
            } => {
                if let Some(response) = self.settled(session, "stack_get", result).await {
                    self.on_stack(session, hint, response).await?;
                }
            }
            Continuation::Locals {
                session,
                depth,
                result,
            } => {
                if let Some(response) = self.settled(session, "context_get", result).await {
                    let context = response.into_context();
                    self.emit(DebuggerEvent::LocalsUpdated { depth, context }).await;
                }
            }
            Continuation::ContextNames { session, result } => {
                if let Some(response) = self.settled(session, "context_names", result).await {
                    let names = response
                        .contexts
                        .into_iter()
                        .map(|c| (c.name, c.id))
                        .collect();
                    self.context_names = Some(names);
                    self.fetch_superglobals(session).await?;
                }
            }
            Continuation::Superglobals { session, result } => {
                if let Some(response) = self.settled(session, "context_get", result).await {
                    let context: Context = response.into_context();
                    self.emit(DebuggerEvent::SuperglobalsUpdated { context })
                        .await;
                }
            }
            Continuation::EvalPrepared {
                session,
                expression,
                result,
            } => {
                if self.settled(session, "feature_set", result).await.is_some() {
                    let rx = self.execute(session, Command::eval(&expression))?;
                    self.follow_up(rx, move |result| Continuation::Evaluated {
                        session,
                        expression,
                        result,
                    });
                }
            }
            Continuation::Evaluated {
                session,
                expression,
                result,
            } => {
                if let Some(response) = self.settled(session, "eval", result).await {
                    let value = response.properties.into_iter().next();
                    self.emit(DebuggerEvent::EvalResult { expression, value })
                        .await;
                    let rx = self
                        .execute(
                            session,
                            Command::feature_set("max_depth", DEFAULT_MAX_DEPTH),
                        )?;
                    self.follow_up(rx, |result| Continuation::Finished {
                        command: "feature_set",
                        result,
                    });
                }
            }
            Continuation::Expanded {
                session,
                name,
                result,
            } => {
                if let Some(response) = self.settled(session, "property_get", result).await {
                    let property = response.properties.into_iter().next();
                    self.emit(DebuggerEvent::PropertyExpanded { name, property })
                        .await;
                }
            }
            Continuation::BreakpointSet {
                session,
                breakpoint,
                result,
            } => {
                if let Some(response) = self.settled(session, "breakpoint_set", result).await {
                    if let Some(id) = response.id {
                        self.acknowledge_breakpoint(session, &breakpoint, id)?;
                    }
                }
            }
            Continuation::Finished { command, result } => {
                if let Err(e) = result {
                    tracing::warn!(command, "command failed: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Unwrap a transaction result, reporting failures. Returns `None` when
    /// the flow should stop.
    async fn settled(
        &mut self,
        session: SessionId,
        command: &str,
        result: TransactionResult,
    ) -> Option<ResponsePacket> {
        match result {
            Ok(_) if !self.state.is_active(session) => None,
            Ok(response) => Some(response),
            Err(TransactionError::SessionClosed(_)) => None,
            Err(e) => {
                tracing::warn!(session = %session, command, "transaction failed: {}", e);
                self.emit(DebuggerEvent::error(format!("{command} failed: {e}")))
                    .await;
                None
            }
        }
    }

    // =====================================================================
    // User commands
    // =====================================================================

    async fn handle_user_command(&mut self, command: UserCommand) -> Result<(), ControllerError> {
        tracing::debug!(?command, "user command");
        match command {
            UserCommand::Start => {
                let port = self.options.port;
                self.request(RequestKind::StartServer { port }, PendingRequest::StartServer);
            }
            UserCommand::StopServer => {
                self.request(RequestKind::StopServer, PendingRequest::StopServer);
            }
            UserCommand::Shutdown => self.shutdown(),
            UserCommand::Run => self.simple(Command::run(), "run").await?,
            UserCommand::StepInto => self.simple(Command::step_into(), "step_into").await?,
            UserCommand::StepOver => self.simple(Command::step_over(), "step_over").await?,
            UserCommand::StepOut => self.simple(Command::step_out(), "step_out").await?,
            UserCommand::Stop => {
                self.request(RequestKind::Disconnect, PendingRequest::Disconnect);
            }
            UserCommand::Eval(expression) => {
                let session = self.require_connected()?;
                let rx = self
                    .execute(session, Command::feature_set("max_depth", EVAL_MAX_DEPTH))?;
                self.follow_up(rx, move |result| Continuation::EvalPrepared {
                    session,
                    expression,
                    result,
                });
            }
            UserCommand::Context { depth } => {
                let session = self.require_connected()?;
                let cmd = Command::context_get().arg('d', depth.to_string());
                let rx = self.execute(session, cmd)?;
                self.follow_up(rx, move |result| Continuation::Locals {
                    session,
                    depth,
                    result,
                });
            }
            UserCommand::Expand { name, depth } => {
                let session = self.require_connected()?;
                let rx = self
                    .execute(session, Command::property_get(&name, depth))?;
                self.follow_up(rx, move |result| Continuation::Expanded {
                    session,
                    name,
                    result,
                });
            }
            UserCommand::AddBreakpoint(bp) => self.add_breakpoint(bp).await?,
            UserCommand::RemoveBreakpoint { path, line } => {
                self.remove_breakpoint(&path, line).await?
            }
            UserCommand::ListBreakpoints => {
                let breakpoints = self.breakpoints.all().to_vec();
                self.emit(DebuggerEvent::BreakpointsListed { breakpoints })
                    .await;
            }
            UserCommand::Sessions => {
                let active = self.state.active();
                self.emit(DebuggerEvent::Sessions {
                    active: active.map(|a| a.id),
                    status: active.map(|a| a.status),
                    ignored: self.state.ignored(),
                })
                .await;
            }
            UserCommand::CloseSession(session) => {
                self.request(
                    RequestKind::CloseSession { session },
                    PendingRequest::CloseSession(session),
                );
            }
        }
        Ok(())
    }

    async fn simple(&mut self, command: Command, name: &'static str) -> Result<(), ControllerError> {
        let session = self.require_connected()?;
        let rx = self.execute(session, command)?;
        self.follow_up(rx, move |result| Continuation::Finished {
            command: name,
            result,
        });
        Ok(())
    }

    async fn add_breakpoint(&mut self, bp: Breakpoint) -> Result<(), ControllerError> {
        if !self.breakpoints.add(bp.clone()) {
            tracing::debug!(file = %bp.path, line = bp.line + 1, "breakpoint already set");
            return Ok(());
        }
        self.emit(DebuggerEvent::BreakpointAdded {
            breakpoint: bp.clone(),
        })
        .await;

        if let Some(session) = self.state.connected() {
            let cmd = self.breakpoint_command(&bp);
            let rx = self.execute(session, cmd)?;
            self.follow_up(rx, move |result| Continuation::BreakpointSet {
                session,
                breakpoint: bp,
                result,
            });
        }
        Ok(())
    }

    async fn remove_breakpoint(&mut self, path: &str, line: u32) -> Result<(), ControllerError> {
        let Some(bp) = self.breakpoints.remove(path, line) else {
            self.emit(DebuggerEvent::error(format!(
                "no breakpoint at {}:{}",
                path,
                line + 1
            )))
            .await;
            return Ok(());
        };

        if let (Some(session), Some(id)) = (self.state.connected(), bp.server_id.as_deref()) {
            let rx = self
                .execute(session, Command::breakpoint_remove(id))?;
            self.follow_up(rx, |result| Continuation::Finished {
                command: "breakpoint_remove",
                result,
            });
        }
        self.emit(DebuggerEvent::BreakpointRemoved { breakpoint: bp })
            .await;
        Ok(())
    }

    fn shutdown(&mut self) {
        tracing::info!("shutting down");
        self.request(RequestKind::Disconnect, PendingRequest::Disconnect);
        self.request(RequestKind::StopServer, PendingRequest::StopServer);
    }

    // =====================================================================
    // Plumbing
    // =====================================================================

    fn require_connected(&self) -> Result<SessionId, ControllerError> {
        self.state.connected().ok_or(ControllerError::NoActiveSession)
    }

    /// Register a transaction and queue its command for the transport.
    fn execute(
        &mut self,
        session: SessionId,
        command: Command,
    ) -> Result<PendingResponse, ControllerError> {
        let (id, rx) = self.registry.register(session, command.name())?;
        let text = command.serialize(&id);
        if self.options.debug {
            tracing::debug!(session = %session, "-> {}", text);
        }

        let kind = RequestKind::Send { session, text };
        self.request(
            kind,
            PendingRequest::Send {
                session,
                transaction: id,
            },
        );
        Ok(rx)
    }

    /// Queue a bridge request; the main loop forwards it.
    fn request(&mut self, kind: RequestKind, pending: PendingRequest) {
        let id = RequestId::new(self.next_request);
        self.next_request += 1;
        self.requests.insert(id, pending);
        self.outbox.push_back(BridgeRequest { id, kind });
    }

    /// Continue on the controller task once `pending` settles.
    fn follow_up<F>(&self, pending: PendingResponse, build: F)
    where
        F: FnOnce(TransactionResult) -> Continuation + Send + 'static,
    {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = settle(pending).await;
            let _ = inbox.send(build(result)).await;
        });
    }

    async fn emit(&self, event: DebuggerEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

async fn settle(pending: PendingResponse) -> TransactionResult {
    pending.await.unwrap_or(Err(TransactionError::Dropped))
}
