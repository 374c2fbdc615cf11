//! The JSON-RPC router.
//!
//! ```text
//!  stdin ──▶ run() ──spawn per line──▶ handle_line
//!                                         ├─ request       ─▶ dispatch ─▶ response
//!                                         ├─ notification  ─▶ session/cancel
//!                                         └─ response      ─▶ PendingCalls
//!
//!  engine ──send_update──▶ UpdateStorage ─▶ session/update ──▶ stdout
//!  engine ──call_client──▶ request ──▶ stdout … stdin ─▶ PendingCalls ─▶ engine
//! ```
//!
//! Every inbound line runs in its own task, so responses may leave out of
//! order. A long prompt never blocks the reader, which is what lets a
//! `session/cancel` or a client response reach the running turn.

use crate::active::ActivePrompts;
use crate::pending::PendingCalls;
use crate::writer::OutboundWriter;
use async_trait::async_trait;
use courier_application::{CommandCatalog, SessionManager};
use courier_core::client::{ClientCaller, ClientRpc};
use courier_core::protocol::jsonrpc::{
    METHOD_NOT_FOUND, Notification, Request, Response, RpcError, correlation_key, parse_params,
};
use courier_core::protocol::{
    AgentCapabilities, CancelNotification, ClientCapabilities, ContentBlock, Envelope, Implementation,
    InitializeRequest, InitializeResponse, LoadSessionRequest, LoadSessionResponse, McpCapabilities,
    NewSessionRequest, NewSessionResponse, PROTOCOL_VERSION, PromptCapabilities, PromptRequest, PromptResponse,
    SessionCapabilities, SessionId, SessionNotification, SessionUpdate, StopReason, methods,
};
use courier_core::session::UpdateSender;
use courier_core::{CourierError, Result};
use courier_infrastructure::UpdateStorage;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type RpcResult<T> = std::result::Result<T, RpcError>;

/// Everything the router needs besides its transport.
pub struct ServerOptions {
    pub agent_info: Implementation,
    pub sessions: Arc<SessionManager>,
    /// Replay log for `session/update`; `None` disables persistence.
    pub storage: Option<Arc<UpdateStorage>>,
    pub commands: CommandCatalog,
}

/// Agent side of one client connection.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    writer: OutboundWriter,
    pending: PendingCalls,
    active: ActivePrompts,
    sessions: Arc<SessionManager>,
    storage: Option<Arc<UpdateStorage>>,
    commands: CommandCatalog,
    agent_info: Implementation,
    initialized: AtomicBool,
    client_capabilities: RwLock<ClientCapabilities>,
    /// Parent of every prompt scope; fired on shutdown.
    root: CancellationToken,
    tasks: TaskTracker,
}

impl Server {
    pub fn new<W>(writer: W, options: ServerOptions) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(ServerInner {
                writer: OutboundWriter::new(writer),
                pending: PendingCalls::new(),
                active: ActivePrompts::new(),
                sessions: options.sessions,
                storage: options.storage,
                commands: options.commands,
                agent_info: options.agent_info,
                initialized: AtomicBool::new(false),
                client_capabilities: RwLock::new(ClientCapabilities::default()),
                root: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Number of agent→client calls still waiting for an answer.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of sessions with a prompt in flight.
    pub fn active_prompts(&self) -> usize {
        self.inner.active.len()
    }

    /// Reads newline-delimited messages until end of input or shutdown.
    ///
    /// At end of input the client is gone: running prompts are cancelled,
    /// outstanding client calls fail with `ConnectionClosed`, and the
    /// method returns once every in-flight handler has finished.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Io` when reading the input fails.
    pub async fn run<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).split(b'\n');
        tracing::info!("ACP server listening");

        let outcome = loop {
            let next = tokio::select! {
                _ = self.inner.root.cancelled() => break Ok(()),
                next = lines.next_segment() => next,
            };
            match next {
                Ok(Some(line)) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let server = self.clone();
                    self.inner.tasks.spawn(async move { server.handle_line(line).await });
                }
                Ok(None) => {
                    tracing::info!("Input closed");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break Err(CourierError::from(e));
                }
            }
        };

        self.inner.root.cancel();
        self.inner.pending.drain();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        outcome
    }

    /// Stops the server and flushes every session log.
    ///
    /// Cancels running prompts, releases waiters on client calls, waits for
    /// in-flight handlers and closes update storage. Safe to call more than
    /// once.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down");
        self.inner.root.cancel();
        self.inner.pending.drain();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        if let Some(storage) = &self.inner.storage {
            storage.close().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    async fn handle_line(&self, mut line: Vec<u8>) {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let envelope = std::str::from_utf8(&line)
            .map_err(|e| e.to_string())
            .and_then(|text| Envelope::parse(text).map_err(|e| e.to_string()));

        match envelope {
            Err(e) => {
                tracing::debug!("Unparseable message: {}", e);
                self.respond(Value::Null, Err(RpcError::parse_error())).await;
            }
            Ok(Envelope::Request { id, method, params }) => self.dispatch(id, &method, params).await,
            Ok(Envelope::Notification { method, params }) => self.handle_notification(&method, params).await,
            Ok(Envelope::Response { id, outcome }) => self.handle_response(&id, outcome),
            Ok(Envelope::Invalid { id }) => {
                self.respond(id, Err(RpcError::invalid_request("Invalid Request")))
                    .await;
            }
        }
    }

    async fn dispatch(&self, id: Value, method: &str, params: Value) {
        tracing::debug!(method, id = %id, "Dispatching request");

        let gated = matches!(
            method,
            methods::SESSION_NEW | methods::SESSION_LOAD | methods::SESSION_PROMPT
        );
        if gated && !self.is_initialized() {
            self.respond(id, Err(RpcError::from(CourierError::NotInitialized)))
                .await;
            return;
        }

        match method {
            methods::INITIALIZE => {
                let result = self.initialize(params).and_then(to_value);
                self.respond(id, result).await;
            }
            methods::AUTHENTICATE => self.respond(id, Ok(json!({}))).await,
            methods::SESSION_NEW => match self.session_new(params).await {
                Ok(response) => {
                    let session_id = response.session_id.clone();
                    self.respond(id, to_value(response)).await;
                    self.advertise_commands(&session_id).await;
                }
                Err(e) => self.respond(id, Err(e)).await,
            },
            methods::SESSION_LOAD => match self.session_load(params).await {
                Ok(session_id) => {
                    self.respond(id, to_value(LoadSessionResponse {})).await;
                    self.advertise_commands(&session_id).await;
                }
                Err(e) => self.respond(id, Err(e)).await,
            },
            methods::SESSION_PROMPT => {
                let result = self.session_prompt(params).await.and_then(to_value);
                self.respond(id, result).await;
            }
            methods::SESSION_SET_MODE => {
                let error = RpcError::new(METHOD_NOT_FOUND, "session/set_mode not supported");
                self.respond(id, Err(error)).await;
            }
            other => {
                tracing::warn!("Unknown method: {}", other);
                self.respond(id, Err(RpcError::method_not_found(other))).await;
            }
        }
    }

    async fn handle_notification(&self, method: &str, params: Value) {
        match method {
            methods::SESSION_CANCEL => {
                let notification: CancelNotification = match parse_params(params) {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!("Ignoring malformed session/cancel: {}", e.message);
                        return;
                    }
                };
                let session_id = notification.session_id;
                // The session may not exist; cancellation is best effort.
                if let Err(e) = self.inner.sessions.cancel(&session_id).await {
                    tracing::debug!(session_id = %session_id, "Cancel for unknown session: {}", e);
                }
                let running = self.inner.active.cancel(&session_id);
                tracing::info!(session_id = %session_id, running, "Cancel requested");
            }
            other => tracing::warn!("Ignoring unknown notification: {}", other),
        }
    }

    fn handle_response(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) {
        let Some(key) = correlation_key(id) else {
            tracing::warn!(id = %id, "Dropping response with an uncorrelatable id");
            return;
        };
        if !self.inner.pending.complete(&key, outcome) {
            tracing::warn!(id = %key, "Dropping response for unknown request");
        }
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    fn initialize(&self, params: Value) -> RpcResult<InitializeResponse> {
        let request: InitializeRequest = parse_params(params)?;
        let protocol_version = request.protocol_version.min(PROTOCOL_VERSION);

        *self
            .inner
            .client_capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = request.client_capabilities;
        self.inner.initialized.store(true, Ordering::Release);

        tracing::info!(
            protocol_version,
            client = request.client_info.as_ref().map(|info| info.name.as_str()).unwrap_or("unknown"),
            "Initialized"
        );

        Ok(InitializeResponse {
            protocol_version,
            agent_capabilities: AgentCapabilities {
                load_session: true,
                prompt_capabilities: PromptCapabilities {
                    image: true,
                    audio: false,
                    embedded_context: true,
                },
                mcp_capabilities: McpCapabilities {
                    http: true,
                    sse: false,
                },
                session_capabilities: SessionCapabilities { set_mode: false },
            },
            agent_info: self.inner.agent_info.clone(),
            auth_methods: vec![],
        })
    }

    async fn session_new(&self, params: Value) -> RpcResult<NewSessionResponse> {
        let request: NewSessionRequest = parse_params(params)?;
        let session = self.inner.sessions.new_session(&request).await?;
        Ok(NewSessionResponse {
            session_id: session.id().clone(),
        })
    }

    /// Restores a session and replays its stored updates to the client.
    async fn session_load(&self, params: Value) -> RpcResult<SessionId> {
        let request: LoadSessionRequest = parse_params(params)?;
        let session = self.inner.sessions.load_session(&request).await?;
        let session_id = session.id().clone();

        if let Some(storage) = &self.inner.storage {
            storage.flush(&session_id).await?;
            let updates = storage.read_updates(&session_id).await?;
            tracing::info!(session_id = %session_id, "Replaying {} stored update(s)", updates.len());
            for stored in updates {
                self.notify(&session_id, stored.update).await?;
            }
        }
        Ok(session_id)
    }

    async fn session_prompt(&self, params: Value) -> RpcResult<PromptResponse> {
        let request: PromptRequest = parse_params(params)?;
        let session_id = request.session_id.clone();

        // The claim is released before the response is written, so a client
        // that reacts to the response can prompt again straight away.
        let stop_reason = {
            let Some(claim) = self
                .inner
                .active
                .try_begin(&session_id, self.inner.root.child_token())
            else {
                return Err(RpcError::from(CourierError::PromptInProgress));
            };
            self.run_prompt(request, claim.token()).await?
        };

        tracing::info!(session_id = %session_id, ?stop_reason, "Prompt finished");
        Ok(PromptResponse { stop_reason })
    }

    async fn run_prompt(
        &self,
        request: PromptRequest,
        scope: &CancellationToken,
    ) -> Result<StopReason> {
        let session = self.inner.sessions.get_session(&request.session_id).await?;
        let session_id = request.session_id;
        let expanded = self.inner.commands.expand(request.prompt.clone())?;
        self.record_prompt(&session_id, &request.prompt).await?;

        let sender: Arc<dyn UpdateSender> = Arc::new(self.clone());
        let client = ClientRpc::new(Arc::new(self.clone()));
        let result = session.handle_prompt(scope, expanded, sender, client).await;

        if let Some(storage) = &self.inner.storage {
            if let Err(e) = storage.flush(&session_id).await {
                tracing::error!(session_id = %session_id, "Failed to flush update log: {}", e);
                if result.is_ok() {
                    return Err(e);
                }
            }
        }
        result
    }

    /// Stores the user's own blocks so a replay shows both sides of the turn.
    async fn record_prompt(&self, session_id: &SessionId, prompt: &[ContentBlock]) -> Result<()> {
        let Some(storage) = &self.inner.storage else {
            return Ok(());
        };
        for block in prompt {
            storage
                .append_update(session_id, SessionUpdate::UserMessageChunk { content: block.clone() })
                .await?;
        }
        Ok(())
    }

    async fn advertise_commands(&self, session_id: &SessionId) {
        if self.inner.commands.is_empty() {
            return;
        }
        let update = SessionUpdate::AvailableCommands {
            available_commands: self.inner.commands.available_commands(),
        };
        if let Err(e) = self.notify(session_id, update).await {
            tracing::warn!(session_id = %session_id, "Failed to advertise commands: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    async fn respond(&self, id: Value, result: RpcResult<Value>) {
        let response = match result {
            Ok(value) => Response::success(id, value),
            Err(error) => {
                tracing::debug!(code = error.code, "Request failed: {}", error.message);
                Response::error(id, error)
            }
        };
        if let Err(e) = self.inner.writer.send(&response).await {
            tracing::warn!("Failed to write response: {}", e);
        }
    }

    /// Writes a `session/update` notification without recording it.
    async fn notify(&self, session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        let params = serde_json::to_value(SessionNotification {
            session_id: session_id.clone(),
            update,
        })?;
        self.inner
            .writer
            .send(&Notification::new(methods::SESSION_UPDATE, params))
            .await
    }
}

fn to_value<T: Serialize>(value: T) -> RpcResult<Value> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

#[async_trait]
impl UpdateSender for Server {
    async fn send_update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        if let Some(storage) = &self.inner.storage {
            storage.append_update(session_id, update.clone()).await?;
        }
        self.notify(session_id, update).await
    }
}

#[async_trait]
impl ClientCaller for Server {
    async fn call_client(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value> {
        let (id, response) = self.inner.pending.register();
        let _slot = self.inner.pending.guard(id);

        tracing::debug!(id, method, "Calling client");
        self.inner
            .writer
            .send(&Request::new(json!(id), method, params))
            .await?;

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(id, method, "Client call cancelled");
                Err(CourierError::Cancelled)
            }
            outcome = response => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => {
                    tracing::debug!(id, method, code = error.code, "Client returned error: {}", error.message);
                    Err(CourierError::client_error(method))
                }
                Err(_) => Err(CourierError::ConnectionClosed),
            },
        }
    }

    fn client_capabilities(&self) -> ClientCapabilities {
        self.inner
            .client_capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
