//! End-to-end controller scenarios driven through the event interface with a
//! scriptable sink.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use radio_core::state::{PlaybackState, StateManager};
use radio_core::station::{NowPlaying, Station, StreamEndpoint, TransportKind};
use radio_player::controller::{
    BroadcastMessage, PlaybackController, PlayerCommand, PlayerEvent,
};
use radio_player::diagnostics::{DiagnosticsReporter, FailureContext};
use radio_player::session::SessionTagger;
use radio_player::sink::{MediaSink, SinkError, SinkEvent};
use tokio::sync::broadcast;

// ── test doubles ──────────────────────────────────────────────────────────────

/// Records every sink call; set_source fails for URLs containing a scripted
/// substring.
struct MockSink {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl MockSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    fn fail_sources_containing(&self, fragment: &str) {
        self.failing.lock().unwrap().insert(fragment.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_of(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl MediaSink for MockSink {
    async fn set_source(&self, url: &str) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(format!("set_source {url}"));
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|f| url.contains(f.as_str())) {
            return Err(SinkError::Command("scripted failure".into()));
        }
        Ok(())
    }
    async fn play(&self) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push("play".into());
        Ok(())
    }
    async fn pause(&self) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push("pause".into());
        Ok(())
    }
    async fn stop_load(&self) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push("stop_load".into());
        Ok(())
    }
    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(format!("set_volume {volume}"));
        Ok(())
    }
}

struct RecordingReporter {
    reports: Mutex<Vec<FailureContext>>,
}

impl RecordingReporter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl DiagnosticsReporter for RecordingReporter {
    fn report(&self, ctx: FailureContext) {
        self.reports.lock().unwrap().push(ctx);
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

fn endpoint(kind: TransportKind, url: &str, order: Option<u32>) -> StreamEndpoint {
    StreamEndpoint {
        kind,
        url: url.to_string(),
        order,
    }
}

fn station(slug: &str, streams: Vec<StreamEndpoint>) -> Station {
    Station {
        id: 1,
        slug: slug.to_string(),
        title: slug.to_uppercase(),
        is_up: true,
        streams,
        ..Station::default()
    }
}

struct Harness {
    controller: PlaybackController,
    sink: Arc<MockSink>,
    reporter: Arc<RecordingReporter>,
    generation: Arc<AtomicU64>,
    broadcast_rx: broadcast::Receiver<BroadcastMessage>,
}

fn harness(retry_ceiling: u32) -> Harness {
    let tag = format!(
        "{}-{}",
        std::process::id(),
        rand::random::<u32>()
    );
    let state_file = std::env::temp_dir().join(format!("radio-test-state-{tag}.json"));
    let session_file = std::env::temp_dir().join(format!("radio-test-session-{tag}.json"));

    let sink = MockSink::new();
    let reporter = RecordingReporter::new();
    let (broadcast_tx, broadcast_rx) = broadcast::channel(64);
    let controller = PlaybackController::new(
        Arc::new(StateManager::new(state_file, 50)),
        sink.clone(),
        SessionTagger::new(&session_file, "radio.example"),
        reporter.clone(),
        broadcast_tx,
        retry_ceiling,
        50,
    );
    let generation = controller.attach_generation();
    Harness {
        controller,
        sink,
        reporter,
        generation,
        broadcast_rx,
    }
}

impl Harness {
    async fn feed(&mut self, evt: PlayerEvent) {
        assert!(self.controller.handle_event(evt).await);
    }

    async fn command(&mut self, cmd: PlayerCommand) {
        self.feed(PlayerEvent::Command(cmd)).await;
    }

    /// Deliver a sink event stamped with the current attach generation.
    async fn sink(&mut self, event: SinkEvent) {
        let generation = self.generation.load(Ordering::Relaxed);
        self.feed(PlayerEvent::Sink { event, generation }).await;
    }

    fn notices(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.broadcast_rx.try_recv() {
            if let BroadcastMessage::Notice(text) = msg {
                out.push(text);
            }
        }
        out
    }
}

// ── scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_reaches_playing_through_buffering() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/one.m3u8", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Started);
    assert_eq!(h.sink.count_of("set_source https://cdn/one.m3u8"), 1);

    h.sink(SinkEvent::Waiting).await;
    assert_eq!(h.controller.playback_state(), PlaybackState::Buffering);

    h.sink(SinkEvent::Playing).await;
    assert_eq!(h.controller.playback_state(), PlaybackState::Playing);
    assert_eq!(h.controller.current_candidate_index(), Some(0));
    assert_eq!(h.controller.retry_budget(), Some(20));
    assert_eq!(h.reporter.count(), 0);
    assert!(h.notices().is_empty());
}

#[tokio::test]
async fn attach_failure_falls_back_in_candidate_order() {
    let mut h = harness(20);
    h.sink.fail_sources_containing("bad-stream");
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![
            endpoint(TransportKind::Hls, "https://cdn/bad-stream.m3u8", Some(1)),
            endpoint(TransportKind::Direct, "https://cdn/good-stream", Some(2)),
        ],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;

    // Walked past the failing candidate silently, budget spent once.
    assert_eq!(h.controller.current_candidate_index(), Some(1));
    assert_eq!(h.controller.retry_budget(), Some(19));
    assert_eq!(h.sink.count_of("set_source https://cdn/good-stream"), 1);
    assert_eq!(h.reporter.count(), 1);
    assert!(h.notices().is_empty());
}

#[tokio::test]
async fn exhaustion_stops_and_surfaces_one_notice() {
    let mut h = harness(20);
    h.sink.fail_sources_containing("cdn");
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/only.m3u8", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Stopped);
    // The sole candidate failing is exhaustion, not a retry: no budget spent.
    assert_eq!(h.controller.retry_budget(), Some(20));
    let notices = h.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("ONE"));

    // No wrap-around: nothing further happens until a new start intent.
    assert_eq!(h.sink.count_of("set_source"), 1);
}

#[tokio::test]
async fn zero_budget_gives_up_before_advancing() {
    let mut h = harness(0);
    h.sink.fail_sources_containing("first");
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![
            endpoint(TransportKind::Hls, "https://cdn/first.m3u8", Some(1)),
            endpoint(TransportKind::Direct, "https://cdn/second", Some(2)),
        ],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Stopped);
    assert_eq!(h.controller.current_candidate_index(), Some(0));
    assert_eq!(h.sink.count_of("set_source https://cdn/second"), 0);
    assert_eq!(h.notices().len(), 1);
}

#[tokio::test]
async fn stop_detaches_and_start_resumes_without_reattach() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/one.m3u8", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.sink(SinkEvent::Playing).await;

    h.command(PlayerCommand::Stop).await;
    assert_eq!(h.controller.playback_state(), PlaybackState::Stopped);
    // Manifest-based candidate: pause and halt segment loading.
    assert!(h.sink.calls().contains(&"stop_load".to_string()));
    assert!(h.controller.has_decoder());

    let sources_before = h.sink.count_of("set_source");
    h.command(PlayerCommand::Start).await;
    assert_eq!(h.controller.playback_state(), PlaybackState::Started);
    // Resume reuses the detached instance.
    assert_eq!(h.sink.count_of("set_source"), sources_before);

    h.sink(SinkEvent::Playing).await;
    assert_eq!(h.controller.playback_state(), PlaybackState::Playing);
}

#[tokio::test]
async fn overlapping_start_intents_are_dropped() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Direct, "https://cdn/one", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;

    // Attach settled, sink has not reported Playing yet.
    assert_eq!(h.controller.playback_state(), PlaybackState::Started);
    h.command(PlayerCommand::Start).await;
    h.command(PlayerCommand::Start).await;
    assert_eq!(h.sink.count_of("set_source"), 1);
}

#[tokio::test]
async fn station_change_resets_budget_and_candidates() {
    let mut h = harness(20);
    h.sink.fail_sources_containing("one-bad");
    h.feed(PlayerEvent::Catalog(vec![
        station(
            "one",
            vec![
                endpoint(TransportKind::Hls, "https://cdn/one-bad.m3u8", Some(1)),
                endpoint(TransportKind::Direct, "https://cdn/one-ok", Some(2)),
            ],
        ),
        station(
            "two",
            vec![endpoint(TransportKind::Hls, "https://cdn/two.m3u8", Some(1))],
        ),
    ]))
    .await;

    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    assert_eq!(h.controller.retry_budget(), Some(19));

    h.command(PlayerCommand::SelectStation { slug: "two".into() })
        .await;
    assert_eq!(h.controller.retry_budget(), Some(20));
    assert_eq!(h.controller.current_candidate_index(), Some(0));
}

#[tokio::test]
async fn previous_returns_to_the_prior_station() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![
        station(
            "one",
            vec![endpoint(TransportKind::Direct, "https://cdn/one", Some(1))],
        ),
        station(
            "two",
            vec![endpoint(TransportKind::Direct, "https://cdn/two", Some(1))],
        ),
    ]))
    .await;

    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.command(PlayerCommand::SelectStation { slug: "two".into() })
        .await;
    h.command(PlayerCommand::PrevStation).await;

    // Back on station one, attaching again.
    assert_eq!(h.sink.count_of("set_source https://cdn/one"), 2);
}

#[tokio::test]
async fn next_station_cycles_only_reachable_stations() {
    let mut h = harness(20);
    let mut down = station(
        "down",
        vec![endpoint(TransportKind::Direct, "https://cdn/down", Some(1))],
    );
    down.is_up = false;
    h.feed(PlayerEvent::Catalog(vec![
        station(
            "one",
            vec![endpoint(TransportKind::Direct, "https://cdn/one", Some(1))],
        ),
        down,
        station(
            "two",
            vec![endpoint(TransportKind::Direct, "https://cdn/two", Some(1))],
        ),
    ]))
    .await;

    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.command(PlayerCommand::NextStation).await;
    assert_eq!(h.sink.count_of("set_source https://cdn/two"), 1);
    assert_eq!(h.sink.count_of("set_source https://cdn/down"), 0);

    // Wraps past the end back to the first reachable station.
    h.command(PlayerCommand::NextStation).await;
    assert_eq!(h.sink.count_of("set_source https://cdn/one"), 2);
}

#[tokio::test]
async fn runtime_sink_error_triggers_fallback() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![
            endpoint(TransportKind::Hls, "https://cdn/one.m3u8", Some(1)),
            endpoint(TransportKind::Direct, "https://cdn/one-direct", Some(2)),
        ],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.sink(SinkEvent::Playing).await;

    h.sink(SinkEvent::Error("network".into())).await;

    assert_eq!(h.controller.current_candidate_index(), Some(1));
    assert_eq!(h.controller.retry_budget(), Some(19));
    assert_eq!(h.sink.count_of("set_source https://cdn/one-direct"), 1);
    assert_eq!(h.reporter.count(), 1);
}

#[tokio::test]
async fn sink_errors_while_stopped_are_ignored() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Direct, "https://cdn/one", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.command(PlayerCommand::Stop).await;

    let sources = h.sink.count_of("set_source");
    h.sink(SinkEvent::Error("late network error".into()))
        .await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Stopped);
    assert_eq!(h.sink.count_of("set_source"), sources);
    assert_eq!(h.reporter.count(), 0);
}

#[tokio::test]
async fn errors_from_a_previous_station_are_dropped() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![
        station(
            "one",
            vec![endpoint(TransportKind::Hls, "https://cdn/one.m3u8", Some(1))],
        ),
        station(
            "two",
            vec![
                endpoint(TransportKind::Hls, "https://cdn/two.m3u8", Some(1)),
                endpoint(TransportKind::Direct, "https://cdn/two-direct", Some(2)),
            ],
        ),
    ]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.sink(SinkEvent::Playing).await;
    let old_generation = h.generation.load(Ordering::Relaxed);

    h.command(PlayerCommand::SelectStation { slug: "two".into() })
        .await;

    // The first station's decoder reports its death after the switch.
    h.feed(PlayerEvent::Sink {
        event: SinkEvent::Error("network".into()),
        generation: old_generation,
    })
    .await;

    // The new session keeps its preferred candidate, full budget, and a
    // clean diagnostics record.
    assert_eq!(h.controller.current_candidate_index(), Some(0));
    assert_eq!(h.controller.retry_budget(), Some(20));
    assert_eq!(h.controller.playback_state(), PlaybackState::Started);
    assert_eq!(h.reporter.count(), 0);
    assert_eq!(h.sink.count_of("set_source https://cdn/two-direct"), 0);
}

#[tokio::test]
async fn metadata_churn_does_not_disturb_playback() {
    let mut h = harness(20);
    let mut st = station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/one.m3u8", Some(1))],
    );
    h.feed(PlayerEvent::Catalog(vec![st.clone()])).await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.sink(SinkEvent::Playing).await;

    st.now_playing = Some(NowPlaying {
        song: "New Song".into(),
        artist: "Artist".into(),
        thumbnail_url: None,
    });
    h.feed(PlayerEvent::Catalog(vec![st])).await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Playing);
    assert_eq!(h.sink.count_of("set_source"), 1);
}

#[tokio::test]
async fn endpoint_change_rebuilds_and_reattaches_when_active() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/old.m3u8", Some(1))],
    )]))
    .await;
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    h.sink(SinkEvent::Playing).await;

    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Hls, "https://cdn/new.m3u8", Some(1))],
    )]))
    .await;

    assert_eq!(h.sink.count_of("set_source https://cdn/new.m3u8"), 1);
    assert_eq!(h.controller.retry_budget(), Some(20));
}

#[tokio::test]
async fn volume_is_applied_on_change_and_after_attach() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station(
        "one",
        vec![endpoint(TransportKind::Direct, "https://cdn/one", Some(1))],
    )]))
    .await;

    h.command(PlayerCommand::SetVolume { value: 80 }).await;
    assert_eq!(h.controller.volume(), 80);
    assert_eq!(h.sink.count_of("set_volume 0.8"), 1);

    // Attach resets sink gain; the controller reapplies.
    h.command(PlayerCommand::SelectStation { slug: "one".into() })
        .await;
    assert_eq!(h.sink.count_of("set_volume 0.8"), 2);

    h.command(PlayerCommand::SetVolume { value: 200 }).await;
    assert_eq!(h.controller.volume(), 100);
}

#[tokio::test]
async fn station_with_no_streams_fails_fast() {
    let mut h = harness(20);
    h.feed(PlayerEvent::Catalog(vec![station("empty", vec![])]))
        .await;
    h.command(PlayerCommand::SelectStation {
        slug: "empty".into(),
    })
    .await;

    assert_eq!(h.controller.playback_state(), PlaybackState::Stopped);
    assert_eq!(h.controller.retry_budget(), Some(20));
    assert_eq!(h.sink.count_of("set_source"), 0);
}
