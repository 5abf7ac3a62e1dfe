//! PlaybackController — single-owner event loop for all playback state.
//!
//! Every task that wants to influence playback (HTTP API, media-session
//! bridge, catalog poller, sink reader) sends a `PlayerEvent` into this
//! loop.  The controller owns the `PlaybackSession` and the decoder
//! exclusively; no other task touches the sink's source or volume.
//!
//! The state machine is small and closed:
//!
//! ```text
//!   Stopped --start--> Started --sink playing--> Playing
//!   Started|Playing --sink waiting--> Buffering --sink playing--> Playing
//!   Started|Buffering|Playing --fatal--> fallback (next candidate or stop)
//!   any --stop/station change--> Stopped
//! ```
//!
//! Fallback policy: candidates are attempted strictly in the order produced
//! by `order_candidates`; exhaustion of the candidate list stops playback
//! outright (no wrap-around), and only that exhaustion is surfaced to the
//! user.  A stall with no fatal signal is never timed out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use radio_core::candidates::{order_candidates, StreamCandidate};
use radio_core::catalog::streams_changed;
use radio_core::state::{PlaybackState, StateManager};
use radio_core::station::Station;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::decoder::StreamDecoder;
use crate::diagnostics::{DiagnosticsReporter, FailureContext};
use crate::session::SessionTagger;
use crate::sink::{MediaSink, SinkEvent};

// ── inbound events ────────────────────────────────────────────────────────────

/// User / UI intents.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Start,
    Stop,
    Toggle,
    SelectStation { slug: String },
    NextStation,
    PrevStation,
    SetVolume { value: u8 },
}

/// All inputs into the controller loop.
///
/// Sink events carry the attach generation current when they were forwarded;
/// the controller drops any whose generation no longer matches, so signals
/// belonging to a torn-down attachment can never touch the live session.
#[derive(Debug)]
pub enum PlayerEvent {
    Command(PlayerCommand),
    Sink { event: SinkEvent, generation: u64 },
    Catalog(Vec<Station>),
    Shutdown,
}

/// Fan-out notifications for listeners (API, media-session bridge).
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    /// User-facing, non-blocking notice (connection exhaustion).
    Notice(String),
}

// ── session record ────────────────────────────────────────────────────────────

/// One playback session per selected station.  All fields are mutated only
/// inside the controller's transition handlers.
struct PlaybackSession {
    station_slug: String,
    station_title: String,
    candidates: Vec<StreamCandidate>,
    current_index: usize,
    retry_budget: u32,
    playback_state: PlaybackState,
    decoder: Option<StreamDecoder>,
}

impl PlaybackSession {
    fn new(station: &Station, retry_ceiling: u32) -> Self {
        Self {
            station_slug: station.slug.clone(),
            station_title: station.title.clone(),
            candidates: order_candidates(&station.streams),
            current_index: 0,
            retry_budget: retry_ceiling,
            playback_state: PlaybackState::Stopped,
            decoder: None,
        }
    }

    fn current_candidate(&self) -> Option<&StreamCandidate> {
        self.candidates.get(self.current_index)
    }
}

// ── controller ────────────────────────────────────────────────────────────────

pub struct PlaybackController {
    state_manager: Arc<StateManager>,
    sink: Arc<dyn MediaSink>,
    tagger: SessionTagger,
    diagnostics: Arc<dyn DiagnosticsReporter>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    retry_ceiling: u32,
    stations: Vec<Station>,
    session: Option<PlaybackSession>,
    /// Bumped on every attach attempt and session teardown.  Sink events
    /// stamped with an older value are stale and get dropped.
    attach_generation: Arc<AtomicU64>,
    /// Previously selected slugs, newest last; previous-track pops it.
    history: Vec<String>,
    volume: u8,
}

impl PlaybackController {
    pub fn new(
        state_manager: Arc<StateManager>,
        sink: Arc<dyn MediaSink>,
        tagger: SessionTagger,
        diagnostics: Arc<dyn DiagnosticsReporter>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        retry_ceiling: u32,
        initial_volume: u8,
    ) -> Self {
        Self {
            state_manager,
            sink,
            tagger,
            diagnostics,
            broadcast_tx,
            retry_ceiling,
            stations: Vec::new(),
            session: None,
            attach_generation: Arc::new(AtomicU64::new(0)),
            history: Vec::new(),
            volume: initial_volume.min(100),
        }
    }

    /// Shared counter for stamping forwarded sink events.
    pub fn attach_generation(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.attach_generation)
    }

    /// Run the event loop until `Shutdown` or channel closure.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("controller: starting event loop");
        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt).await {
                break;
            }
        }
        self.teardown().await;
        info!("controller: event loop finished");
        Ok(())
    }

    /// Process one event.  Returns false when the loop should exit.
    pub async fn handle_event(&mut self, evt: PlayerEvent) -> bool {
        match evt {
            PlayerEvent::Command(cmd) => {
                debug!("controller: command {:?}", cmd);
                self.handle_command(cmd).await;
                true
            }
            PlayerEvent::Sink { event, generation } => {
                self.handle_sink_event(event, generation).await;
                true
            }
            PlayerEvent::Catalog(stations) => {
                self.handle_catalog_update(stations).await;
                true
            }
            PlayerEvent::Shutdown => {
                info!("controller: shutdown requested");
                false
            }
        }
    }

    // ── introspection (used by the API layer and tests) ──────────────────────

    pub fn playback_state(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map(|s| s.playback_state)
            .unwrap_or(PlaybackState::Stopped)
    }

    pub fn current_candidate_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.current_index)
    }

    pub fn retry_budget(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.retry_budget)
    }

    pub fn has_decoder(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.decoder.is_some())
            .unwrap_or(false)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    // ── command handlers ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::Start => self.handle_start().await,
            PlayerCommand::Stop => self.handle_stop().await,
            PlayerCommand::Toggle => match self.playback_state() {
                PlaybackState::Stopped => self.handle_start().await,
                _ => self.handle_stop().await,
            },
            PlayerCommand::SelectStation { slug } => self.handle_select(slug, true).await,
            PlayerCommand::NextStation => self.handle_next().await,
            PlayerCommand::PrevStation => self.handle_prev().await,
            PlayerCommand::SetVolume { value } => self.handle_set_volume(value).await,
        }
    }

    async fn handle_start(&mut self) {
        let Some(session) = self.session.as_ref() else {
            warn!("controller: start with no station selected");
            return;
        };
        // Attach sequences run to completion inside one event-handler call,
        // so the serialized loop already rules out interleaved attaches; a
        // second start intent simply finds the session no longer Stopped and
        // is dropped, never queued.
        if session.playback_state != PlaybackState::Stopped {
            debug!("controller: start ignored, already active");
            return;
        }
        self.start_playback().await;
    }

    async fn handle_stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.playback_state == PlaybackState::Stopped {
            return;
        }
        info!("controller: stopping playback");
        // Detach, do not destroy: media-session metadata survives the pause
        // and an Hls decoder resumes without refetching the manifest.
        if let Some(decoder) = session.decoder.as_mut() {
            if let Err(e) = decoder.detach().await {
                warn!("controller: detach failed: {e}");
            }
        } else if let Err(e) = self.sink.pause().await {
            warn!("controller: pause failed: {e}");
        }
        session.playback_state = PlaybackState::Stopped;
        self.publish_playback_state(PlaybackState::Stopped).await;
    }

    async fn handle_select(&mut self, slug: String, push_history: bool) {
        let Some(station) = self.stations.iter().find(|s| s.slug == slug).cloned() else {
            warn!("controller: unknown station '{slug}'");
            return;
        };

        // Unconditional reset regardless of current state: tear down the old
        // decoder before anything belonging to the new session exists.
        // Anything the old attachment still emits is stale from here on.
        self.attach_generation.fetch_add(1, Ordering::Relaxed);
        if let Some(mut old) = self.session.take() {
            if let Some(mut decoder) = old.decoder.take() {
                decoder.destroy().await;
            }
            if push_history && old.station_slug != slug {
                self.history.push(old.station_slug);
            }
        }

        info!("controller: selecting station '{}'", station.title);
        self.session = Some(PlaybackSession::new(&station, self.retry_ceiling));
        if let Err(e) = self.state_manager.set_selected(Some(slug)).await {
            warn!("controller: could not persist selection: {e}");
        }
        self.publish_playback_state(PlaybackState::Stopped).await;

        // Selecting a station is a play intent.
        self.start_playback().await;
    }

    async fn handle_next(&mut self) {
        let up: Vec<&Station> = self.stations.iter().filter(|s| s.is_up).collect();
        if up.is_empty() {
            warn!("controller: no reachable stations for next");
            return;
        }
        let current = self.session.as_ref().map(|s| s.station_slug.clone());
        let next_idx = current
            .and_then(|slug| up.iter().position(|s| s.slug == slug))
            .map(|i| (i + 1) % up.len())
            .unwrap_or(0);
        let slug = up[next_idx].slug.clone();
        self.handle_select(slug, true).await;
    }

    async fn handle_prev(&mut self) {
        let Some(slug) = self.history.pop() else {
            debug!("controller: no history for previous");
            return;
        };
        self.handle_select(slug, false).await;
    }

    async fn handle_set_volume(&mut self, value: u8) {
        self.volume = value.min(100);
        if let Err(e) = self.state_manager.set_volume(self.volume).await {
            warn!("controller: could not persist volume: {e}");
        }
        if let Err(e) = self.sink.set_volume(self.volume as f32 / 100.0).await {
            warn!("controller: set_volume failed: {e}");
        }
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    // ── attach / fallback ─────────────────────────────────────────────────────

    /// Attach the candidate at `current_index`, walking forward through the
    /// fallback sequence on immediate failures until one attach settles or
    /// the session gives up.
    async fn start_playback(&mut self) {
        loop {
            // Every attach attempt opens a new generation; whatever the sink
            // still reports for an earlier one is dropped on arrival.
            self.attach_generation.fetch_add(1, Ordering::Relaxed);

            let candidate = {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                match session.current_candidate().cloned() {
                    Some(c) => {
                        session.playback_state = PlaybackState::Started;
                        c
                    }
                    None => {
                        // Zero candidates is a configuration failure: fail
                        // fast, no decoder work, no retry budget spent.
                        warn!(
                            "controller: station '{}' has no stream candidates",
                            session.station_title
                        );
                        session.playback_state = PlaybackState::Stopped;
                        self.publish_playback_state(PlaybackState::Stopped).await;
                        return;
                    }
                }
            };
            self.publish_playback_state(PlaybackState::Started).await;

            let tagged_url = self.tagger.tag(&candidate.url);

            // Cheap resume: same candidate, decoder merely detached.
            let reuse = self
                .session
                .as_ref()
                .and_then(|s| s.decoder.as_ref())
                .map(|d| d.is_detached() && d.url() == tagged_url)
                .unwrap_or(false);

            let outcome = if reuse {
                match self.session.as_mut().and_then(|s| s.decoder.as_mut()) {
                    Some(decoder) => decoder.resume().await,
                    None => Ok(()),
                }
            } else {
                // Exactly one live decoder: destroy the old instance before
                // the new one exists.
                if let Some(mut old) = self.session.as_mut().and_then(|s| s.decoder.take()) {
                    old.destroy().await;
                }
                match StreamDecoder::attach(candidate.kind, tagged_url, Arc::clone(&self.sink))
                    .await
                {
                    Ok(decoder) => {
                        if let Some(session) = self.session.as_mut() {
                            session.decoder = Some(decoder);
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(()) => {
                    // Attachment resets sink gain; reapply the user's volume.
                    if let Err(e) = self.sink.set_volume(self.volume as f32 / 100.0).await {
                        warn!("controller: volume reapply failed: {e}");
                    }
                    // Stay in Started until the sink reports audio flowing.
                    return;
                }
                Err(e) => {
                    self.report_candidate_failure(&candidate.url, format!("attach failed: {e}"));
                    if !self.advance_candidate() {
                        self.give_up().await;
                        return;
                    }
                    // Loop re-enters the start transition with the next candidate.
                }
            }
        }
    }

    /// Fallback bookkeeping.  Returns true when a next candidate may be
    /// attempted.  The retry budget is only spent on an actual advance: a
    /// failure on the final candidate is exhaustion, not a retry.
    fn advance_candidate(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.retry_budget == 0 {
            info!("controller: retry budget exhausted");
            return false;
        }
        if session.current_index + 1 >= session.candidates.len() {
            info!("controller: candidate list exhausted");
            return false;
        }
        session.retry_budget -= 1;
        session.current_index += 1;
        debug!(
            "controller: falling back to candidate {} (budget {})",
            session.current_index, session.retry_budget
        );
        true
    }

    /// Terminal per-station failure: settle to Stopped and surface the only
    /// user-visible notice this machine produces.
    async fn give_up(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let title = session.station_title.clone();
        error!("controller: could not connect to '{title}', giving up");
        if let Some(mut decoder) = session.decoder.take() {
            decoder.destroy().await;
        }
        session.playback_state = PlaybackState::Stopped;
        self.publish_playback_state(PlaybackState::Stopped).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(format!(
            "Could not connect to {title}. Please try again later."
        )));
    }

    // ── sink events ───────────────────────────────────────────────────────────

    async fn handle_sink_event(&mut self, ev: SinkEvent, generation: u64) {
        // Re-validate before acting: an event stamped for an earlier attach
        // belongs to a candidate or station that is already gone.
        if generation != self.attach_generation.load(Ordering::Relaxed) {
            debug!("controller: stale sink event {:?} dropped", ev);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            debug!("controller: sink event {:?} with no session, dropped", ev);
            return;
        };

        match ev {
            SinkEvent::Playing => match session.playback_state {
                PlaybackState::Started | PlaybackState::Buffering => {
                    session.playback_state = PlaybackState::Playing;
                    self.publish_playback_state(PlaybackState::Playing).await;
                }
                // Stale or redundant; a playing sink in Stopped state means
                // the event raced a stop/switch and no longer applies.
                _ => debug!("controller: Playing event in {:?}, dropped", session.playback_state),
            },
            SinkEvent::Waiting => match session.playback_state {
                PlaybackState::Started | PlaybackState::Playing => {
                    session.playback_state = PlaybackState::Buffering;
                    self.publish_playback_state(PlaybackState::Buffering).await;
                }
                _ => {}
            },
            SinkEvent::Paused => match session.playback_state {
                // A pause the controller did not initiate projects as
                // stopped.  Pauses during attach belong to decoder teardown
                // and are suppressed.
                PlaybackState::Playing | PlaybackState::Buffering => {
                    session.playback_state = PlaybackState::Stopped;
                    self.publish_playback_state(PlaybackState::Stopped).await;
                }
                _ => {}
            },
            SinkEvent::Error(detail) => {
                if session.playback_state == PlaybackState::Stopped {
                    debug!("controller: stale sink error dropped: {detail}");
                    return;
                }
                let url = session
                    .current_candidate()
                    .map(|c| c.url.clone())
                    .unwrap_or_default();
                self.report_candidate_failure(&url, detail);
                if let Some(mut decoder) = self.session.as_mut().and_then(|s| s.decoder.take()) {
                    decoder.destroy().await;
                }
                if self.advance_candidate() {
                    self.start_playback().await;
                } else {
                    self.give_up().await;
                }
            }
        }
    }

    // ── catalog updates ───────────────────────────────────────────────────────

    async fn handle_catalog_update(&mut self, stations: Vec<Station>) {
        let old = std::mem::replace(&mut self.stations, stations.clone());
        self.state_manager.set_stations(stations).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);

        // Restore the persisted selection once the catalog first arrives.
        if self.session.is_none() {
            let snapshot = self.state_manager.snapshot().await;
            if let Some(slug) = snapshot.selected_slug {
                if let Some(station) = self.stations.iter().find(|s| s.slug == slug) {
                    debug!("controller: restoring session for '{}'", station.title);
                    self.session = Some(PlaybackSession::new(station, self.retry_ceiling));
                }
            }
            return;
        }

        // Metadata churn must not disturb a live attachment; only an actual
        // endpoint change forces a reattach.
        let slug = match self.session.as_ref() {
            Some(s) => s.station_slug.clone(),
            None => return,
        };
        if !streams_changed(&old, &self.stations, &slug) {
            return;
        }

        let was_active = self.playback_state() != PlaybackState::Stopped;
        info!("controller: stream endpoints changed for '{slug}', rebuilding session");
        if let Some(mut session) = self.session.take() {
            if let Some(mut decoder) = session.decoder.take() {
                decoder.destroy().await;
            }
        }
        match self.stations.iter().find(|s| s.slug == slug).cloned() {
            Some(station) => {
                self.session = Some(PlaybackSession::new(&station, self.retry_ceiling));
                if was_active {
                    self.start_playback().await;
                } else {
                    self.publish_playback_state(PlaybackState::Stopped).await;
                }
            }
            None => {
                warn!("controller: station '{slug}' disappeared from catalog");
                self.publish_playback_state(PlaybackState::Stopped).await;
            }
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn report_candidate_failure(&self, url: &str, detail: String) {
        let (station, kind) = self
            .session
            .as_ref()
            .map(|s| {
                (
                    s.station_title.clone(),
                    s.current_candidate().map(|c| c.kind),
                )
            })
            .unwrap_or_default();
        self.diagnostics.report(FailureContext {
            station,
            candidate_url: url.to_string(),
            kind,
            detail,
        });
    }

    async fn publish_playback_state(&self, playback: PlaybackState) {
        self.state_manager.set_playback_state(playback).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(mut decoder) = session.decoder.take() {
                decoder.destroy().await;
            }
        }
        let _ = self.sink.pause().await;
    }
}
