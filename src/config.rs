//! Relay settings, read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono_tz::Tz;
use tracing::info;

use crate::error::{RelayError, Result};
use crate::session_config::Profile;

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

pub const DEFAULT_GEMINI_WS_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_FLOWS_DIR: &str = "flows";
const DEFAULT_TIME_ZONE: &str = "America/New_York";

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Optional at startup; sessions are refused without it.
    pub api_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub gemini_ws_url: String,
    pub flows_dir: PathBuf,
    pub profile_path: Option<PathBuf>,
    /// IANA zone name for the time statement.
    pub reference_time_zone: String,
    pub voice_name: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model: DEFAULT_MODEL.to_string(),
            gemini_ws_url: DEFAULT_GEMINI_WS_URL.to_string(),
            flows_dir: PathBuf::from(DEFAULT_FLOWS_DIR),
            profile_path: None,
            reference_time_zone: DEFAULT_TIME_ZONE.to_string(),
            voice_name: None,
        }
    }
}

impl RelaySettings {
    /// Read settings from the process environment. Call `dotenvy::dotenv()` first
    /// to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup. Unset and blank values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| RelayError::Configuration(format!("PORT={raw}: {e}")))?,
            None => defaults.port,
        };

        let settings = Self {
            api_key: get("GEMINI_API_KEY"),
            host: get("HOST").unwrap_or(defaults.host),
            port,
            model: get("GEMINI_MODEL").unwrap_or(defaults.model),
            gemini_ws_url: get("GEMINI_WS_URL").unwrap_or(defaults.gemini_ws_url),
            flows_dir: get("FLOWS_DIR").map(PathBuf::from).unwrap_or(defaults.flows_dir),
            profile_path: get("PROFILE_PATH").map(PathBuf::from),
            reference_time_zone: get("REFERENCE_TIME_ZONE").unwrap_or(defaults.reference_time_zone),
            voice_name: get("VOICE_NAME"),
        };

        // Validate eagerly so a bad value fails at startup, not per session.
        settings.reference_zone()?;
        settings.address()?;
        Ok(settings)
    }

    pub fn reference_zone(&self) -> Result<Tz> {
        self.reference_time_zone.parse::<Tz>().map_err(|e| {
            RelayError::Configuration(format!("REFERENCE_TIME_ZONE={}: {e}", self.reference_time_zone))
        })
    }

    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| RelayError::Configuration(format!("HOST={}: {}", self.host, e)))
    }

    /// The profile shown to profile-update sessions.
    pub fn load_profile(&self) -> Result<Profile> {
        match &self.profile_path {
            Some(path) => {
                info!("Loading profile from {}", path.display());
                Profile::from_file(path)
            }
            None => Ok(Profile::default()),
        }
    }
}
