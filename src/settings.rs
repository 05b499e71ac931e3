use crate::error::{Result, TraceError};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub geo: GeoSettings,
    #[serde(default)]
    pub replay: ReplaySettings,
    #[serde(default)]
    pub jitter: JitterSettings,
    #[serde(default)]
    pub render: RenderSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    pub url: Option<String>,         // Trace server base URL
}

#[derive(Debug, Default, Deserialize)]
pub struct GeoSettings {
    pub endpoint: Option<String>,    // Defaults to <server>/geo
    pub geoip_db: Option<PathBuf>,   // Path to GeoLite2-City.mmdb; used instead of the endpoint
    pub locate_self: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplaySettings {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JitterSettings {
    pub spread_deg: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderSettings {
    pub anchor_origin: Option<bool>,
}

impl Settings {
    /// Load the user's settings file. A missing file gives defaults; a
    /// broken one gives defaults and a warning.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        let loaded = fs::read_to_string(&path)
            .map_err(TraceError::from)
            .and_then(|content| Self::from_toml_str(&content));

        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TraceError::Config(e.to_string()))
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tracemap")
            .join("config.toml")
    }
}
