use crate::station::Station;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coarse playback state projected to the UI and OS integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    /// Nothing attached, or playback gave up / was stopped.
    #[default]
    Stopped,
    /// Intent to play registered; decoder attach in flight.
    Started,
    /// Decoder attached, waiting for enough data.
    Buffering,
    /// Audio is flowing.
    Playing,
}

/// The slice of state that survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState {
    pub last_station_slug: Option<String>,
    pub volume: u8,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            last_station_slug: None,
            volume: 50,
        }
    }
}

/// Full state snapshot readable by the API and the media-session bridge.
/// `rev` increases on every change so readers can detect staleness.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerSnapshot {
    pub rev: u64,
    pub stations: Vec<Station>,
    pub selected_slug: Option<String>,
    pub playback_state: PlaybackState,
    pub volume: u8,
}

impl PlayerSnapshot {
    pub fn selected_station(&self) -> Option<&Station> {
        let slug = self.selected_slug.as_deref()?;
        self.stations.iter().find(|s| s.slug == slug)
    }
}

/// Single owner of the shared snapshot.  Only the playback controller calls
/// the setters; everyone else reads clones.
pub struct StateManager {
    state: Arc<RwLock<PlayerSnapshot>>,
    state_file: PathBuf,
}

impl StateManager {
    pub fn new(state_file: PathBuf, volume_default: u8) -> Self {
        let persistent = Self::load_persistent(&state_file);

        let snapshot = PlayerSnapshot {
            rev: 1,
            stations: Vec::new(),
            selected_slug: persistent.last_station_slug,
            playback_state: PlaybackState::Stopped,
            volume: if persistent.volume <= 100 {
                persistent.volume
            } else {
                volume_default
            },
        };

        Self {
            state: Arc::new(RwLock::new(snapshot)),
            state_file,
        }
    }

    pub fn arc(&self) -> Arc<RwLock<PlayerSnapshot>> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.state.read().await.clone()
    }

    pub async fn set_stations(&self, stations: Vec<Station>) {
        let mut state = self.state.write().await;
        state.stations = stations;
        state.rev += 1;
    }

    pub async fn set_selected(&self, slug: Option<String>) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.selected_slug = slug;
            state.rev += 1;
        }
        self.save().await
    }

    pub async fn set_playback_state(&self, playback: PlaybackState) {
        let mut state = self.state.write().await;
        state.playback_state = playback;
        state.rev += 1;
    }

    pub async fn set_volume(&self, volume: u8) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.volume = volume.min(100);
            state.rev += 1;
        }
        self.save().await
    }

    async fn save(&self) -> anyhow::Result<()> {
        let state = self.state.read().await;
        let persistent = PersistentState {
            last_station_slug: state.selected_slug.clone(),
            volume: state.volume,
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &PathBuf) -> PersistentState {
        if let Ok(content) = std::fs::read_to_string(state_file) {
            if let Ok(persistent) = serde_json::from_str::<PersistentState>(&content) {
                return persistent;
            }
        }
        PersistentState::default()
    }
}
