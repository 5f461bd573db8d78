//! Transport-neutral frames and the actions the proxy asks its driver to perform.

use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::error::RelayError;

/// Close code sent when the session cannot be configured.
pub const CLOSE_POLICY: u16 = 1008;

/// Close code sent when the relay gives up on a session after an internal failure.
pub const CLOSE_INTERNAL: u16 = 1011;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A WebSocket frame as the relay sees it. Pings and pongs never get this far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<CloseReason>),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = RelayError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, RelayError>> + Send>>;

/// Both halves of one WebSocket connection.
pub struct Leg {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Leg {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Work produced by the proxy for its driver, in the order it must happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame to the model service.
    Upstream(String),
    /// Text frame to the client.
    Downstream(String),
    CloseUpstream(Option<CloseReason>),
    CloseDownstream(Option<CloseReason>),
}
