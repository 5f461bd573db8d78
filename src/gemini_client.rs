//! Gemini Live API connection
//!
//! Opens the upstream WebSocket with `tokio-tungstenite` and adapts the split
//! halves into a transport-neutral [`Leg`]. Binary frames are decoded as UTF-8
//! JSON and handled like text; pings and pongs stay inside tungstenite.

use std::future::Future;

use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{RelayError, Result};
use crate::events::{CloseReason, Frame, FrameSink, FrameStream, Leg};
use crate::session::UpstreamConnector;

/// Connects sessions to the Live API endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    base_url: String,
}

impl GeminiConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Endpoint URL with the API key attached as the `key` query parameter.
    pub fn endpoint(&self, api_key: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RelayError::Configuration(format!("GEMINI_WS_URL={}: {}", self.base_url, e)))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }
}

impl UpstreamConnector for GeminiConnector {
    fn connect(&self, credential: &str) -> impl Future<Output = Result<Leg>> + Send {
        let endpoint = self.endpoint(credential);
        async move {
            let url = endpoint?;
            info!("Connecting to Gemini API at {}", redacted(&url));

            let (ws_stream, resp) = connect_async(url.as_str()).await?;
            debug!("WebSocket connection response: {:?}", resp.status());

            let (sink, stream) = ws_stream.split();
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

            Ok(Leg::new(sink, stream))
        }
    }
}

/// The URL with the `key` parameter masked, for logging.
pub fn redacted(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "key" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        })),
    }
}

fn from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_string())),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => {
                debug!("Received binary message ({} bytes)", text.len());
                Some(Frame::Text(text))
            }
            Err(e) => {
                warn!("Dropping non-UTF-8 binary message: {}", e);
                None
            }
        },
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.as_str())),
        )),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
