use std::sync::atomic::Ordering;
use std::sync::Arc;

use radio_core::config::Config;
use radio_core::favorites::FavoriteSet;
use radio_core::state::StateManager;
use radio_player::api;
use radio_player::catalog::CatalogPoller;
use radio_player::controller::{BroadcastMessage, PlaybackController, PlayerEvent};
use radio_player::diagnostics::LogReporter;
use radio_player::media_session::{JsonExportSink, MediaSessionBridge};
use radio_player::session::SessionTagger;
use radio_player::sink::mpv::MpvSink;
use radio_player::sink::{MediaSink, SinkEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging
    let data_dir = radio_core::config::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("radio-player.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,radio_player=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    // Event channel — all external inputs funnel into the controller
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);

    let state_manager = Arc::new(StateManager::new(
        config.paths.state_file.clone(),
        config.playback.default_volume,
    ));
    let favorites = Arc::new(FavoriteSet::load(&config.paths.favorites_file));
    let tagger = SessionTagger::new(&config.paths.session_file, &config.catalog.referrer);

    // Audio sink; its events flow into the controller like everything else
    let (sink_event_tx, mut sink_event_rx) = mpsc::channel::<SinkEvent>(64);
    let (mpv, mut mpv_child) = MpvSink::spawn(sink_event_tx).await?;
    let sink: Arc<dyn MediaSink> = Arc::new(mpv);

    let initial_volume = state_manager.snapshot().await.volume;
    let controller = PlaybackController::new(
        Arc::clone(&state_manager),
        sink,
        tagger,
        Arc::new(LogReporter),
        broadcast_tx.clone(),
        config.playback.retry_ceiling,
        initial_volume,
    );

    // Forwarded sink events are stamped with the attach generation current
    // at forwarding time; the controller drops mismatches as stale.
    {
        let event_tx = event_tx.clone();
        let attach_generation = controller.attach_generation();
        tokio::spawn(async move {
            while let Some(event) = sink_event_rx.recv().await {
                let generation = attach_generation.load(Ordering::Relaxed);
                if event_tx
                    .send(PlayerEvent::Sink { event, generation })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    // Catalog poller
    let poller = CatalogPoller::new(
        config.catalog.url.clone(),
        config.catalog.poll_interval_secs,
        event_tx.clone(),
    );
    tokio::spawn(poller.run());

    // Media-session bridge
    let bridge = MediaSessionBridge::new(
        Arc::clone(&state_manager),
        Box::new(JsonExportSink::new(config.paths.now_playing_file.clone())),
    );
    tokio::spawn(bridge.run(broadcast_tx.subscribe()));

    // HTTP API if enabled
    if config.api.enabled {
        let api_state = api::ApiState {
            state_manager: Arc::clone(&state_manager),
            favorites: Arc::clone(&favorites),
            event_tx: event_tx.clone(),
        };
        let bind = config.api.bind_address.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(bind, port, api_state).await {
                error!("api server failed: {e}");
            }
        });
    }

    // Ctrl-C drains through the event loop so the sink is torn down cleanly
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = event_tx.send(PlayerEvent::Shutdown).await;
            }
        });
    }

    info!("Player initialised, running event loop");
    controller.run(event_rx).await?;

    // Take the idle mpv process down with us.
    let _ = mpv_child.kill().await;

    Ok(())
}
