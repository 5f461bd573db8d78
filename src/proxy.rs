//! Session proxy state machine
//!
//! One `SessionProxy` exists per client connection. It never touches a socket:
//! the per-connection task feeds it [`Event`]s in arrival order and dispatches
//! the [`Outbound`] actions it queues before reading the next frame.
//!
//! ```text
//! Connecting -> AwaitingUpstreamOpen -> AwaitingSetupAck -> Active -> Closing -> Closed
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use crate::config::RelaySettings;
use crate::error::{RelayError, Result};
use crate::events::{CloseReason, Outbound, CLOSE_INTERNAL, CLOSE_POLICY};
use crate::gemini::{
    BidiGenerateContentSetup, ClientMessage, Content, GenerationConfig, Part, ServerMessage,
};
use crate::mediator::{inline_data_block, ToolCallMediator, COLLECTED_DATA_TARGET};
use crate::session_config::{SessionConfig, SessionConfigResolver, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Connecting,
    AwaitingUpstreamOpen,
    AwaitingSetupAck,
    Active,
    Closing,
    Closed,
}

/// Things that happen to a session.
#[derive(Debug)]
pub enum Event {
    /// The client socket was accepted.
    ClientConnected,
    /// The upstream connection is open.
    UpstreamOpened { now: DateTime<Utc> },
    UpstreamConnectFailed(RelayError),
    /// Text frame from the client.
    DownstreamMessage(String),
    /// Text frame from the model service.
    UpstreamMessage(String),
    UpstreamError(RelayError),
    UpstreamClosed(Option<CloseReason>),
    DownstreamClosed,
}

pub type Actions = SmallVec<[Outbound; 4]>;

pub struct SessionProxy {
    task: TaskId,
    state: ProxyState,
    credential: Option<String>,
    model: String,
    voice_name: Option<String>,
    resolver: Arc<SessionConfigResolver>,
    config: Option<SessionConfig>,
    mediator: ToolCallMediator,
    upstream_open: bool,
    setup_complete: bool,
    /// Outbound queue, drained by the driver after each event
    outbound: Actions,
}

impl SessionProxy {
    pub fn new(task: TaskId, settings: &RelaySettings, resolver: Arc<SessionConfigResolver>) -> Self {
        Self {
            task,
            state: ProxyState::Connecting,
            credential: settings.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: settings.model.clone(),
            voice_name: settings.voice_name.clone(),
            resolver,
            config: None,
            mediator: ToolCallMediator::new(None),
            upstream_open: false,
            setup_complete: false,
            outbound: SmallVec::new(),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete
    }

    /// The upstream credential, once the client has been accepted.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn drain_outbound(&mut self) -> Actions {
        std::mem::take(&mut self.outbound)
    }

    /// Called by the driver once the close actions have been dispatched.
    pub fn finish(&mut self) {
        if self.state != ProxyState::Closed {
            debug!(task = %self.task, "Session closed");
        }
        self.state = ProxyState::Closed;
        self.upstream_open = false;
    }

    pub fn on_event(&mut self, event: Event) {
        match (self.state, event) {
            (ProxyState::Connecting, Event::ClientConnected) => {
                if self.credential.is_none() {
                    error!(task = %self.task, "{}", RelayError::MissingCredential);
                    self.outbound.push(Outbound::CloseDownstream(Some(CloseReason::new(
                        CLOSE_POLICY,
                        "upstream credential not configured",
                    ))));
                    self.state = ProxyState::Closed;
                } else {
                    info!(task = %self.task, "Client connected, opening upstream connection");
                    self.state = ProxyState::AwaitingUpstreamOpen;
                }
            }

            (ProxyState::AwaitingUpstreamOpen, Event::UpstreamConnectFailed(err)) => {
                error!(task = %self.task, "Failed to connect upstream: {}", err);
                self.outbound.push(Outbound::CloseDownstream(Some(CloseReason::new(
                    CLOSE_INTERNAL,
                    "model service unavailable",
                ))));
                self.state = ProxyState::Closed;
            }

            (ProxyState::AwaitingUpstreamOpen, Event::UpstreamOpened { now }) => {
                self.upstream_open = true;
                info!(task = %self.task, "Connected to Gemini Live API");
                if let Err(err) = self.send_setup(now) {
                    error!(task = %self.task, "Session setup failed: {}", err);
                    self.teardown(Some(CloseReason::new(CLOSE_POLICY, "session configuration failed")));
                }
            }

            (ProxyState::Closing | ProxyState::Closed, event) => {
                debug!(task = %self.task, "Ignoring {:?} after close", event_name(&event));
            }

            (_, Event::DownstreamMessage(text)) => {
                if self.state == ProxyState::Active {
                    self.outbound.push(Outbound::Upstream(text));
                } else {
                    debug!(state = ?self.state, "Dropping client frame received before setup completed");
                }
            }

            (_, Event::UpstreamMessage(text)) => self.handle_upstream(text),

            (_, Event::UpstreamError(err)) => {
                if err.is_session_fatal() {
                    warn!(task = %self.task, "Gemini connection lost: {}", err);
                    self.on_upstream_closed(None);
                } else {
                    warn!(task = %self.task, "Gemini API error: {}", err);
                }
            }

            (_, Event::UpstreamClosed(reason)) => self.on_upstream_closed(reason),

            (_, Event::DownstreamClosed) => {
                info!(task = %self.task, "Frontend disconnected");
                if self.upstream_open {
                    self.outbound.push(Outbound::CloseUpstream(None));
                    self.upstream_open = false;
                }
                self.state = ProxyState::Closing;
            }

            (state, event) => {
                warn!(?state, "Unexpected {} event", event_name(&event));
            }
        }
    }

    fn send_setup(&mut self, now: DateTime<Utc>) -> Result<()> {
        let config = self.resolver.resolve(self.task, now)?;

        let setup = BidiGenerateContentSetup {
            model: self.model.clone(),
            generation_config: Some(GenerationConfig::audio(self.voice_name.as_deref())),
            system_instruction: Some(Content::text(None, config.system_instruction.clone())),
            tools: config.tool_schema.iter().map(|schema| schema.as_tool()).collect(),
        };
        let json = ClientMessage::Setup(setup).to_json()?;

        info!(
            task = %self.task,
            model = %self.model,
            tool = config.tool_schema.map(|s| s.name).unwrap_or("none"),
            "Sending setup message"
        );
        self.outbound.push(Outbound::Upstream(json));
        self.mediator = ToolCallMediator::new(config.tool_schema);
        self.config = Some(config);
        self.state = ProxyState::AwaitingSetupAck;
        Ok(())
    }

    fn handle_upstream(&mut self, text: String) {
        match ServerMessage::decode(&text) {
            Ok(ServerMessage::SetupComplete) => {
                if self.state == ProxyState::AwaitingSetupAck {
                    self.on_setup_complete();
                } else {
                    warn!(task = %self.task, "Duplicate setupComplete from Gemini");
                }
                self.outbound.push(Outbound::Downstream(text));
            }
            Ok(ServerMessage::ToolCall(tool_call)) => match self.mediator.mediate(&tool_call) {
                Ok(mediation) if mediation.acknowledgment.is_none() => {
                    warn!(task = %self.task, "Dropping tool call without readable function calls");
                }
                Ok(mediation) => {
                    for frame in mediation.log_frames {
                        self.outbound.push(Outbound::Downstream(frame));
                    }
                    if let Some(ack) = mediation.acknowledgment {
                        self.outbound.push(Outbound::Upstream(ack));
                    }
                }
                Err(err) => error!(task = %self.task, "Failed to mediate tool call: {}", err),
            },
            Ok(ServerMessage::ModelOutput(parts)) => {
                log_model_text(&parts);
                self.outbound.push(Outbound::Downstream(text));
            }
            Ok(ServerMessage::Unknown) => self.outbound.push(Outbound::Downstream(text)),
            Err(err) => {
                debug!("Forwarding undecodable upstream message: {}", err);
                self.outbound.push(Outbound::Downstream(text));
            }
        }
    }

    fn on_setup_complete(&mut self) {
        let trigger = match &self.config {
            Some(config) => ClientMessage::user_turn(&config.initial_trigger).to_json(),
            None => return,
        };
        match trigger {
            Ok(json) => {
                info!(task = %self.task, "Gemini session setup complete, starting conversation");
                self.outbound.push(Outbound::Upstream(json));
                self.setup_complete = true;
                self.state = ProxyState::Active;
            }
            Err(err) => {
                error!(task = %self.task, "Failed to build initial trigger: {}", err);
                self.teardown(Some(CloseReason::new(CLOSE_INTERNAL, "session setup failed")));
            }
        }
    }

    fn on_upstream_closed(&mut self, reason: Option<CloseReason>) {
        match &reason {
            Some(r) => info!(task = %self.task, code = r.code, reason = %r.reason, "Disconnected from Gemini Live API"),
            None => info!(task = %self.task, "Disconnected from Gemini Live API"),
        }
        self.upstream_open = false;
        self.outbound.push(Outbound::CloseDownstream(None));
        self.state = ProxyState::Closing;
    }

    fn teardown(&mut self, reason: Option<CloseReason>) {
        if self.upstream_open {
            self.outbound.push(Outbound::CloseUpstream(None));
            self.upstream_open = false;
        }
        self.outbound.push(Outbound::CloseDownstream(reason));
        self.state = ProxyState::Closing;
    }
}

fn log_model_text(parts: &[Part]) {
    for text in parts.iter().filter_map(|part| part.text.as_deref()) {
        match inline_data_block(text) {
            Some(block) => info!(target: COLLECTED_DATA_TARGET, "\n=== COLLECTED INFORMATION ===\n{}", block),
            None => debug!("Model text: {}", text),
        }
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::ClientConnected => "ClientConnected",
        Event::UpstreamOpened { .. } => "UpstreamOpened",
        Event::UpstreamConnectFailed(_) => "UpstreamConnectFailed",
        Event::DownstreamMessage(_) => "DownstreamMessage",
        Event::UpstreamMessage(_) => "UpstreamMessage",
        Event::UpstreamError(_) => "UpstreamError",
        Event::UpstreamClosed(_) => "UpstreamClosed",
        Event::DownstreamClosed => "DownstreamClosed",
    }
}
