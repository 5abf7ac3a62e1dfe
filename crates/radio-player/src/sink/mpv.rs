//! mpv-backed [`MediaSink`].
//!
//! One mpv process in `--idle` mode is the audio output for the whole
//! player.  Control flows over the JSON IPC socket through split
//! reader/writer tasks:
//!
//! ```text
//!   MpvSink::spawn()
//!         │
//!         ├── writer_task   ← receives requests via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (request_id) → matched oneshot
//!                                └── property-change / end-file → SinkEvent
//! ```
//!
//! Observed properties are translated into the sink-event vocabulary the
//! controller understands: `core-idle` false means audio flows (`Playing`),
//! `core-idle` true with a loaded source means starvation (`Waiting`),
//! `pause` maps to `Paused`, and `end-file` with an error-class reason
//! becomes `Error`.

use super::{MediaSink, SinkError, SinkEvent};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// Fixed observe_property IDs, matched in property-change events.
const OBS_CORE_IDLE: u64 = 1;
const OBS_PAUSE: u64 = 2;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<Result<Value, SinkError>>,
}

fn socket_path() -> PathBuf {
    std::env::temp_dir().join("radio-player-mpv.sock")
}

fn find_mpv_binary() -> Option<PathBuf> {
    let name = if cfg!(windows) { "mpv.exe" } else { "mpv" };
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

/// Production sink driving an mpv process.  Cheap to clone.
#[derive(Clone)]
pub struct MpvSink {
    tx: mpsc::Sender<PendingRequest>,
    /// URL of the source last handed to `set_source`.  `play()` re-issues
    /// the load when `stop_load()` unloaded it, so callers get resume
    /// semantics without tracking mpv internals.
    current_source: Arc<Mutex<Option<String>>>,
    loaded: Arc<AtomicBool>,
}

impl MpvSink {
    /// Spawn mpv, connect to its IPC socket, and start the IO tasks.
    /// Sink events are pushed into `event_tx`.
    #[cfg(unix)]
    pub async fn spawn(event_tx: mpsc::Sender<SinkEvent>) -> anyhow::Result<(Self, tokio::process::Child)> {
        let socket = socket_path();
        let _ = tokio::fs::remove_file(&socket).await;

        let binary = find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv sink: spawning {}", binary.display());

        let child = tokio::process::Command::new(binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(format!("--input-ipc-server={}", socket.display()))
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            // The process must not outlive the player.
            .kill_on_drop(true)
            .spawn()?;

        // Wait for the socket to appear.
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket.exists() {
                break;
            }
        }
        if !socket.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket).await?;
        info!("mpv sink: connected to IPC socket");

        let sink = Self::start_io_tasks(stream, event_tx);
        sink.observe_properties().await;
        Ok((sink, child))
    }

    #[cfg(unix)]
    fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<SinkEvent>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        // pending map: req_id → reply channel.  Writer inserts, reader resolves.
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SinkError>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
        let loaded = Arc::new(AtomicBool::new(false));

        tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
        tokio::spawn(reader_task(reader, pending, event_tx, loaded.clone()));

        Self {
            tx: cmd_tx,
            current_source: Arc::new(Mutex::new(None)),
            loaded,
        }
    }

    async fn send(&self, command: Value) -> Result<Value, SinkError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)
            .map_err(|e| SinkError::Command(e.to_string()))?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SinkError::Unavailable("mpv writer task gone".into()))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| SinkError::Unavailable(format!("mpv IPC timeout req={req_id}")))?
            .map_err(|_| SinkError::Unavailable(format!("mpv reply dropped req={req_id}")))?
    }

    async fn observe_properties(&self) {
        for (id, name) in [(OBS_CORE_IDLE, "core-idle"), (OBS_PAUSE, "pause")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv sink: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv sink: observe_property {} failed: {}", name, e),
            }
        }
    }
}

#[async_trait]
impl MediaSink for MpvSink {
    async fn set_source(&self, url: &str) -> Result<(), SinkError> {
        self.send(json!(["loadfile", url])).await?;
        *self.current_source.lock().await = Some(url.to_string());
        self.loaded.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn play(&self) -> Result<(), SinkError> {
        if !self.loaded.load(Ordering::Relaxed) {
            // stop_load unloaded the item; reload the remembered source.
            let source = self.current_source.lock().await.clone();
            match source {
                Some(url) => {
                    self.send(json!(["loadfile", url])).await?;
                    self.loaded.store(true, Ordering::Relaxed);
                }
                None => return Err(SinkError::PlayRejected("no source set".into())),
            }
        }
        self.send(json!(["set_property", "pause", false]))
            .await
            .map_err(|e| SinkError::PlayRejected(e.to_string()))?;
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.send(json!(["set_property", "pause", true])).await?;
        Ok(())
    }

    async fn stop_load(&self) -> Result<(), SinkError> {
        self.send(json!(["stop"])).await?;
        self.loaded.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SinkError>>>>>,
    event_tx: mpsc::Sender<SinkEvent>,
    loaded: Arc<AtomicBool>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv sink reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(SinkError::Unavailable("mpv IPC closed".into())));
                }
                let _ = event_tx.send(SinkEvent::Error("mpv exited".into())).await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv sink reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error");
                            Err(SinkError::Command(err.to_string()))
                        };
                        let _ = tx.send(result);
                    }
                } else if let Some(event) = translate_event(&val, &loaded) {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv sink reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(SinkError::Unavailable(e.to_string())));
                }
                break;
            }
        }
    }
}

/// Map an unsolicited mpv event onto the sink-event vocabulary.  Returns
/// `None` for events the controller has no use for.
fn translate_event(val: &Value, loaded: &AtomicBool) -> Option<SinkEvent> {
    if val.get("event")?.as_str()? == "property-change" {
        let id = val.get("id")?.as_u64()?;
        let data = val.get("data").unwrap_or(&Value::Null);
        return match id {
            OBS_CORE_IDLE => match data.as_bool() {
                Some(false) => Some(SinkEvent::Playing),
                Some(true) if loaded.load(Ordering::Relaxed) => Some(SinkEvent::Waiting),
                _ => None,
            },
            OBS_PAUSE => match data.as_bool() {
                Some(true) => Some(SinkEvent::Paused),
                _ => None,
            },
            _ => None,
        };
    }

    match val.get("event").and_then(|v| v.as_str()) {
        Some("end-file") => {
            let reason = val.get("reason").and_then(|v| v.as_str()).unwrap_or("unknown");
            match reason {
                // A live stream has no legitimate end; eof is a failure too.
                "error" | "network" | "eof" => {
                    loaded.store(false, Ordering::Relaxed);
                    Some(SinkEvent::Error(format!("end-file reason={reason}")))
                }
                _ => {
                    loaded.store(false, Ordering::Relaxed);
                    None
                }
            }
        }
        _ => None,
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SinkError>>>>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register the reply channel before writing so the reader can match it.
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv sink writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(SinkError::Unavailable(e.to_string())));
            }
            break;
        }
    }
    debug!("mpv sink writer: task exiting");
}
