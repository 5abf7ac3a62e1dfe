use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Where the station catalog lives and how often to refresh it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Hostname appended to tagged stream URLs as the `ref` parameter.
    #[serde(default = "default_referrer")]
    pub referrer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Fallback attempts allowed per station before giving up.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// Initial volume, 0..100.
    #[serde(default = "default_volume")]
    pub default_volume: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persisted `{ last_station_slug, volume }` snapshot.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Durable per-installation session identifier.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    /// Favorited station slugs, owned by the favorites collaborator.
    #[serde(default = "default_favorites_file")]
    pub favorites_file: PathBuf,
    /// Where the media-session bridge exports current track metadata.
    #[serde(default = "default_now_playing_file")]
    pub now_playing_file: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            poll_interval_secs: default_poll_interval_secs(),
            referrer: default_referrer(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            default_volume: default_volume(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            session_file: default_session_file(),
            favorites_file: default_favorites_file(),
            now_playing_file: default_now_playing_file(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://api.radio.example/v1/stations".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_referrer() -> String {
    "radio.example".to_string()
}

fn default_retry_ceiling() -> u32 {
    20
}

fn default_volume() -> u8 {
    50
}

fn default_api_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8972
}

fn default_state_file() -> PathBuf {
    data_dir().join("state.json")
}

fn default_session_file() -> PathBuf {
    data_dir().join("session.json")
}

fn default_favorites_file() -> PathBuf {
    data_dir().join("favorites.json")
}

fn default_now_playing_file() -> PathBuf {
    data_dir().join("now_playing.json")
}

pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("radio-player")
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("radio-player")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}
