//! Client half of a relay session
//!
//! Headless version of the browser page: it turns microphone buffers into
//! realtime input frames and relay frames into scheduled playback and
//! transcript lines. Capture is half-duplex; nothing is sent while the model
//! is audibly speaking. Times are seconds on the caller's clock.

use tracing::{debug, warn};

use crate::audio::{AudioChunk, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::Result;
use crate::gemini::{Blob, ClientMessage, RealtimeInput, ServerMessage};
use crate::mediator::RelayEvent;
use crate::playback::PlaybackScheduler;

/// Samples per capture buffer at 16 kHz.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Active,
    Ended,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Model audio to start playing at `start`.
    Playback { start: f64, chunk: AudioChunk },
    /// A collected-data line for the transcript panel.
    Transcript(String),
}

#[derive(Debug)]
pub struct ClientSession {
    status: ConnectionStatus,
    playback: PlaybackScheduler,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            playback: PlaybackScheduler::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_speaking(&self, now: f64) -> bool {
        self.playback.is_speaking(now)
    }

    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Active;
    }

    pub fn on_close(&mut self) {
        self.status = ConnectionStatus::Ended;
        self.playback.reset();
    }

    pub fn on_error(&mut self) {
        self.status = ConnectionStatus::Error;
        self.playback.reset();
    }

    /// Encode one capture buffer as a realtime input frame, unless the session
    /// is not active or the model is speaking.
    pub fn capture(&self, samples: &[f32], now: f64) -> Result<Option<String>> {
        if self.status != ConnectionStatus::Active || self.playback.is_speaking(now) {
            return Ok(None);
        }

        let message = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: INPUT_MIME_TYPE.to_string(),
                data: AudioChunk::from_float(samples, INPUT_SAMPLE_RATE).encode(),
            }],
        });
        message.to_json().map(Some)
    }

    /// Handle one frame from the relay.
    pub fn receive(&mut self, text: &str, now: f64) -> Vec<ClientEvent> {
        if let Ok(RelayEvent::Log { data }) = serde_json::from_str::<RelayEvent>(text) {
            return vec![ClientEvent::Transcript(data)];
        }

        let parts = match ServerMessage::decode(text) {
            Ok(ServerMessage::ModelOutput(parts)) => parts,
            Ok(_) => return Vec::new(),
            Err(e) => {
                debug!("Ignoring undecodable relay frame: {}", e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for blob in parts.into_iter().filter_map(|part| part.inline_data) {
            match AudioChunk::decode(&blob.data, OUTPUT_SAMPLE_RATE) {
                Ok(chunk) if chunk.is_empty() => {}
                Ok(chunk) => {
                    let start = self.playback.schedule(chunk.duration(), now);
                    events.push(ClientEvent::Playback { start, chunk });
                }
                Err(e) => warn!("Skipping audio chunk: {}", e),
            }
        }
        events
    }
}
