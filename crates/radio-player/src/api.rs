//! HTTP control surface.
//!
//! A small localhost API for UI layers and scripts.  Reads come straight
//! from the shared snapshot; every mutation goes through the controller's
//! event channel so this layer never touches playback state directly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use radio_core::favorites::FavoriteSet;
use radio_core::state::{PlaybackState, StateManager};
use radio_core::station::NowPlaying;
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::controller::{PlayerCommand, PlayerEvent};
use crate::media_session::{forward_transport, TransportCommand};

#[derive(Clone)]
pub struct ApiState {
    pub state_manager: Arc<StateManager>,
    pub favorites: Arc<FavoriteSet>,
    pub event_tx: mpsc::Sender<PlayerEvent>,
}

#[derive(Debug, Serialize)]
struct StationView {
    slug: String,
    title: String,
    thumbnail_url: Option<String>,
    is_up: bool,
    is_favorite: bool,
    now_playing: Option<NowPlaying>,
}

#[derive(Debug, Serialize)]
struct StateResponse {
    rev: u64,
    playback_state: PlaybackState,
    volume: u8,
    selected_slug: Option<String>,
    stations: Vec<StationView>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/toggle", post(toggle))
        .route("/api/stop", post(stop))
        .route("/api/play/:slug", post(play_station))
        .route("/api/next", post(next_station))
        .route("/api/prev", post(prev_station))
        .route("/api/volume/:value", post(set_volume))
        .route("/api/transport/:action", post(transport))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind_address: String, port: u16, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("{bind_address}:{port}");
    info!("api: listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// GET /api/state - Full player snapshot with favorite flags merged in
async fn get_state(State(api): State<ApiState>) -> Json<StateResponse> {
    let snapshot = api.state_manager.snapshot().await;
    let stations = snapshot
        .stations
        .iter()
        .map(|s| StationView {
            slug: s.slug.clone(),
            title: s.title.clone(),
            thumbnail_url: s.thumbnail_url.clone(),
            is_up: s.is_up,
            is_favorite: api.favorites.is_favorite(&s.slug),
            now_playing: s.now_playing.clone(),
        })
        .collect();
    Json(StateResponse {
        rev: snapshot.rev,
        playback_state: snapshot.playback_state,
        volume: snapshot.volume,
        selected_slug: snapshot.selected_slug,
        stations,
    })
}

async fn send(api: &ApiState, cmd: PlayerCommand) -> StatusCode {
    match api.event_tx.send(PlayerEvent::Command(cmd)).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// POST /api/toggle - Start when stopped, stop otherwise
async fn toggle(State(api): State<ApiState>) -> StatusCode {
    send(&api, PlayerCommand::Toggle).await
}

/// POST /api/stop - Stop playback, keep the selection
async fn stop(State(api): State<ApiState>) -> StatusCode {
    send(&api, PlayerCommand::Stop).await
}

/// POST /api/play/:slug - Select a station and start playing it
async fn play_station(State(api): State<ApiState>, Path(slug): Path<String>) -> StatusCode {
    let snapshot = api.state_manager.snapshot().await;
    if !snapshot.stations.iter().any(|s| s.slug == slug) {
        return StatusCode::NOT_FOUND;
    }
    send(&api, PlayerCommand::SelectStation { slug }).await
}

/// POST /api/next - Cycle forward through reachable stations
async fn next_station(State(api): State<ApiState>) -> StatusCode {
    send(&api, PlayerCommand::NextStation).await
}

/// POST /api/prev - Return to the previously selected station
async fn prev_station(State(api): State<ApiState>) -> StatusCode {
    send(&api, PlayerCommand::PrevStation).await
}

/// POST /api/volume/:value - Set volume, 0..100
async fn set_volume(State(api): State<ApiState>, Path(value): Path<u8>) -> StatusCode {
    if value > 100 {
        return StatusCode::BAD_REQUEST;
    }
    send(&api, PlayerCommand::SetVolume { value }).await
}

/// POST /api/transport/:action - Media-key style controls
/// (play / pause / next / previous)
async fn transport(State(api): State<ApiState>, Path(action): Path<String>) -> StatusCode {
    let Some(cmd) = TransportCommand::parse(&action) else {
        return StatusCode::BAD_REQUEST;
    };
    if forward_transport(&api.event_tx, cmd).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
