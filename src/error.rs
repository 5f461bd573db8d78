//! Error type shared by the relay, the session configuration and the client half.

use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session_config::TaskId;

/// Broad classes of failure and how a session reacts to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or flow document. Fatal for the session, never retried.
    Configuration,
    /// A bad audio frame. The frame is dropped and the session continues.
    MalformedAudio,
    /// An upstream message the relay could not read (bad JSON, oversized frame).
    /// The session continues.
    UpstreamProtocol,
    /// One of the two legs closed or failed. The other leg is closed too.
    TransportClosed,
}

/// Error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream credential (GEMINI_API_KEY) is not configured")]
    MissingCredential,

    #[error("flow definition for task {task} not found at {location}")]
    FlowNotFound { task: TaskId, location: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("malformed audio frame: {0}")]
    MalformedAudio(String),

    #[error("unexpected upstream message: {0}")]
    UpstreamProtocol(#[from] serde_json::Error),

    #[error("{0} connection closed")]
    TransportClosed(&'static str),

    #[error("upstream WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("client WebSocket error: {0}")]
    Downstream(#[from] axum::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential | Self::FlowNotFound { .. } | Self::Configuration(_) => {
                ErrorKind::Configuration
            }
            Self::MalformedAudio(_) => ErrorKind::MalformedAudio,
            Self::UpstreamProtocol(_) | Self::WebSocket(WsError::Capacity(_)) => {
                ErrorKind::UpstreamProtocol
            }
            Self::TransportClosed(_) | Self::WebSocket(_) | Self::Downstream(_) | Self::Io(_) => {
                ErrorKind::TransportClosed
            }
        }
    }

    /// Whether the session must be torn down because of this error.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::TransportClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
