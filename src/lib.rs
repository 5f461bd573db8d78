//! Cheesecake relay - voice session proxy for a medication reminder assistant
//!
//! Browser clients connect over WebSocket and stream microphone audio. The
//! relay opens one Gemini Live API session per client, injects the
//! conversation configuration for the selected task, forwards realtime audio
//! in both directions, and turns the model's structured-extraction tool calls
//! into log frames for the client.

#![forbid(unsafe_code)]

/// PCM16 audio frame codec
pub mod audio;
/// Headless client half (capture, playback scheduling, transcripts)
pub mod client;
pub mod config;
pub mod error;
pub mod events;
/// Gemini Live API wire types
pub mod gemini;
/// Upstream WebSocket connector
pub mod gemini_client;
/// Tool-call mediation and collected-data log frames
pub mod mediator;
pub mod playback;
/// Per-session proxy state machine
pub mod proxy;
/// Downstream WebSocket server
pub mod server;
/// Per-connection session runner
pub mod session;
pub mod session_config;
pub mod tools;

pub use config::RelaySettings;
pub use error::{ErrorKind, RelayError, Result};
pub use proxy::{ProxyState, SessionProxy};
pub use session::{run_session, UpstreamConnector};
