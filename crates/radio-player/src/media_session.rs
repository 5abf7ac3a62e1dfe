//! Media-session projection.
//!
//! Mirrors the selected station and its now-playing metadata to the OS
//! integration surface (status bars, media key daemons).  The bridge watches
//! state-update broadcasts, derives the current track metadata from the
//! shared snapshot, and republishes only when the derived metadata actually
//! changed.  Transport commands coming back from that surface map onto plain
//! player commands.

use std::path::PathBuf;
use std::sync::Arc;

use radio_core::state::{PlaybackState, PlayerSnapshot, StateManager};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::controller::{BroadcastMessage, PlayerCommand, PlayerEvent};

/// Artwork shown when neither the track nor the station provides any.
pub const DEFAULT_ARTWORK_URL: &str = "https://radio.example/artwork/default.png";

/// What the OS surface displays for the current session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMetadata {
    pub station_slug: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: String,
    pub playback_state: PlaybackState,
}

/// Derive display metadata from a snapshot.  `None` when no station is
/// selected; the surface then shows nothing.
pub fn metadata_from_snapshot(snapshot: &PlayerSnapshot) -> Option<TrackMetadata> {
    let station = snapshot.selected_station()?;
    let (title, artist, track_art) = match &station.now_playing {
        Some(np) if !np.song.is_empty() => {
            (np.song.clone(), np.artist.clone(), np.thumbnail_url.clone())
        }
        _ => (station.title.clone(), String::new(), None),
    };
    let artwork_url = track_art
        .or_else(|| station.thumbnail_url.clone())
        .unwrap_or_else(|| DEFAULT_ARTWORK_URL.to_string());
    Some(TrackMetadata {
        station_slug: station.slug.clone(),
        title,
        artist,
        artwork_url,
        playback_state: snapshot.playback_state,
    })
}

/// Transport controls the OS surface can send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
}

impl TransportCommand {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "next" => Some(Self::NextTrack),
            "previous" => Some(Self::PreviousTrack),
            _ => None,
        }
    }
}

/// Transport commands are station-granular: next/previous move between
/// stations, never within a stream.
pub fn map_transport_command(cmd: TransportCommand) -> PlayerCommand {
    match cmd {
        TransportCommand::Play => PlayerCommand::Start,
        TransportCommand::Pause => PlayerCommand::Stop,
        TransportCommand::NextTrack => PlayerCommand::NextStation,
        TransportCommand::PreviousTrack => PlayerCommand::PrevStation,
    }
}

/// Where published metadata lands.
pub trait MediaSessionSink: Send + Sync {
    fn publish(&self, metadata: &TrackMetadata) -> anyhow::Result<()>;
    /// No station selected; remove whatever was last published.
    fn clear(&self) -> anyhow::Result<()>;
}

/// Writes the current metadata as a small JSON file for status-bar widgets
/// to pick up.
pub struct JsonExportSink {
    path: PathBuf,
}

impl JsonExportSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MediaSessionSink for JsonExportSink {
    fn publish(&self, metadata: &TrackMetadata) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Watches state updates and keeps the sink in step with the snapshot.
pub struct MediaSessionBridge {
    state_manager: Arc<StateManager>,
    sink: Box<dyn MediaSessionSink>,
    last_published: Option<TrackMetadata>,
}

impl MediaSessionBridge {
    pub fn new(state_manager: Arc<StateManager>, sink: Box<dyn MediaSessionSink>) -> Self {
        Self {
            state_manager,
            sink,
            last_published: None,
        }
    }

    pub async fn run(mut self, mut rx: broadcast::Receiver<BroadcastMessage>) {
        loop {
            match rx.recv().await {
                Ok(BroadcastMessage::StateUpdated) => {
                    let snapshot = self.state_manager.snapshot().await;
                    self.sync(&snapshot);
                }
                Ok(BroadcastMessage::Notice(_)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed intermediate revisions; the next sync reads the
                    // latest snapshot anyway.
                    debug!("media session: lagged {n} updates");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Republish only when the derived metadata changed; snapshot revisions
    /// bump on plenty of changes the surface does not care about.
    pub fn sync(&mut self, snapshot: &PlayerSnapshot) {
        let metadata = metadata_from_snapshot(snapshot);
        if metadata == self.last_published {
            return;
        }
        let result = match &metadata {
            Some(m) => self.sink.publish(m),
            None => self.sink.clear(),
        };
        if let Err(e) = result {
            warn!("media session: publish failed: {e}");
            return;
        }
        self.last_published = metadata;
    }
}

/// Forward a transport action into the controller loop.
pub async fn forward_transport(
    event_tx: &mpsc::Sender<PlayerEvent>,
    cmd: TransportCommand,
) -> bool {
    event_tx
        .send(PlayerEvent::Command(map_transport_command(cmd)))
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_core::station::{NowPlaying, Station};
    use std::sync::Mutex;

    fn snapshot_with(station: Station) -> PlayerSnapshot {
        PlayerSnapshot {
            rev: 1,
            selected_slug: Some(station.slug.clone()),
            stations: vec![station],
            playback_state: PlaybackState::Playing,
            volume: 50,
        }
    }

    fn station() -> Station {
        Station {
            id: 1,
            slug: "radio-one".into(),
            title: "Radio One".into(),
            ..Station::default()
        }
    }

    #[test]
    fn track_metadata_prefers_now_playing() {
        let mut st = station();
        st.now_playing = Some(NowPlaying {
            song: "Song".into(),
            artist: "Artist".into(),
            thumbnail_url: Some("https://art/track.png".into()),
        });
        let m = metadata_from_snapshot(&snapshot_with(st)).unwrap();
        assert_eq!(m.title, "Song");
        assert_eq!(m.artist, "Artist");
        assert_eq!(m.artwork_url, "https://art/track.png");
    }

    #[test]
    fn artwork_falls_back_station_then_default() {
        let mut st = station();
        st.thumbnail_url = Some("https://art/station.png".into());
        let m = metadata_from_snapshot(&snapshot_with(st)).unwrap();
        assert_eq!(m.artwork_url, "https://art/station.png");

        let m = metadata_from_snapshot(&snapshot_with(station())).unwrap();
        assert_eq!(m.artwork_url, DEFAULT_ARTWORK_URL);
        assert_eq!(m.title, "Radio One");
    }

    #[test]
    fn no_selection_means_no_metadata() {
        let mut snapshot = snapshot_with(station());
        snapshot.selected_slug = None;
        assert!(metadata_from_snapshot(&snapshot).is_none());
    }

    #[test]
    fn transport_commands_map_to_station_granularity() {
        assert!(matches!(
            map_transport_command(TransportCommand::Play),
            PlayerCommand::Start
        ));
        assert!(matches!(
            map_transport_command(TransportCommand::Pause),
            PlayerCommand::Stop
        ));
        assert!(matches!(
            map_transport_command(TransportCommand::NextTrack),
            PlayerCommand::NextStation
        ));
        assert!(matches!(
            map_transport_command(TransportCommand::PreviousTrack),
            PlayerCommand::PrevStation
        ));
    }

    struct CountingSink {
        publishes: Mutex<Vec<TrackMetadata>>,
        clears: Mutex<usize>,
    }

    impl MediaSessionSink for &'static CountingSink {
        fn publish(&self, metadata: &TrackMetadata) -> anyhow::Result<()> {
            self.publishes.lock().unwrap().push(metadata.clone());
            Ok(())
        }
        fn clear(&self) -> anyhow::Result<()> {
            *self.clears.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn bridge_republishes_only_on_change() {
        let sink: &'static CountingSink = Box::leak(Box::new(CountingSink {
            publishes: Mutex::new(Vec::new()),
            clears: Mutex::new(0),
        }));
        let state = Arc::new(StateManager::new(
            std::env::temp_dir().join(format!("radio-bridge-{}.json", std::process::id())),
            50,
        ));
        let mut bridge = MediaSessionBridge::new(Arc::clone(&state), Box::new(sink));

        let snapshot = snapshot_with(station());
        bridge.sync(&snapshot);
        bridge.sync(&snapshot);
        assert_eq!(sink.publishes.lock().unwrap().len(), 1);

        // Volume-only changes bump rev but not metadata.
        let mut louder = snapshot.clone();
        louder.rev += 1;
        louder.volume = 80;
        bridge.sync(&louder);
        assert_eq!(sink.publishes.lock().unwrap().len(), 1);

        // Playback state changes are metadata.
        let mut stopped = snapshot.clone();
        stopped.playback_state = PlaybackState::Stopped;
        bridge.sync(&stopped);
        assert_eq!(sink.publishes.lock().unwrap().len(), 2);

        // Deselection clears.
        let mut none = snapshot.clone();
        none.selected_slug = None;
        bridge.sync(&none);
        assert_eq!(*sink.clears.lock().unwrap(), 1);
    }
}
