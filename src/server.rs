//! Downstream WebSocket server
//!
//! `GET /?task=N` upgrades to a WebSocket and runs one relay session for the
//! connection. The task parameter is optional and defaults to 1.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::RelaySettings;
use crate::error::{RelayError, Result};
use crate::events::{CloseReason, Frame, FrameSink, FrameStream, Leg};
use crate::gemini_client::GeminiConnector;
use crate::proxy::SessionProxy;
use crate::session::run_session;
use crate::session_config::{FsFlowStore, SessionConfigResolver, TaskId};

/// Shared across all connections.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RelaySettings>,
    pub resolver: Arc<SessionConfigResolver>,
    pub connector: Arc<GeminiConnector>,
}

impl AppState {
    pub fn from_settings(settings: RelaySettings) -> Result<Self> {
        let resolver = SessionConfigResolver::new(
            FsFlowStore::new(settings.flows_dir.clone()),
            settings.load_profile()?,
            settings.reference_zone()?,
        );
        let connector = GeminiConnector::new(settings.gemini_ws_url.clone());
        Ok(Self {
            settings: Arc::new(settings),
            resolver: Arc::new(resolver),
            connector: Arc::new(connector),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    pub task: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(settings: RelaySettings) -> Result<()> {
    let addr = settings.address()?;
    if settings.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; client sessions will be refused");
    }

    let app = router(AppState::from_settings(settings)?);
    let listener = TcpListener::bind(addr).await?;
    info!("Relay listening on ws://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn session_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SessionParams>,
    State(state): State<AppState>,
) -> Response {
    let task = TaskId::from_param(params.task.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, task))
}

async fn handle_socket(socket: WebSocket, state: AppState, task: TaskId) {
    info!(%task, "Frontend connected");
    let proxy = SessionProxy::new(task, &state.settings, state.resolver.clone());
    let final_state = run_session(proxy, downstream_leg(socket), state.connector.as_ref()).await;
    info!(%task, ?final_state, "Frontend session ended");
}

/// Adapt an axum WebSocket into a [`Leg`].
pub fn downstream_leg(socket: WebSocket) -> Leg {
    let (sink, stream) = socket.split();
    let sink: FrameSink = Box::pin(
        sink.sink_map_err(RelayError::from)
            .with(|frame: Frame| future::ready(Ok::<_, RelayError>(to_message(frame)))),
    );
    let stream: FrameStream = Box::pin(stream.filter_map(|msg| {
        future::ready(match msg {
            Ok(msg) => from_message(msg).map(Ok),
            Err(e) => Some(Err(RelayError::from(e))),
        })
    }));
    Leg::new(sink, stream)
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        })),
    }
}

fn from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_string())),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Frame::Text(text)),
            Err(_) => {
                warn!("Dropping non-UTF-8 binary frame from client ({} bytes)", bytes.len());
                None
            }
        },
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|f| CloseReason::new(f.code, f.reason.as_str())),
        )),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
