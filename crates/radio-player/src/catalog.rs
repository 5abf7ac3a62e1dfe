//! Catalog poller.
//!
//! Fetches the station list on a fixed interval and forwards it into the
//! controller loop.  Identical payloads are dropped here so the controller
//! only sees actual changes; fetch failures keep the last known catalog and
//! retry on the next tick.

use std::time::Duration;

use radio_core::station::{CatalogPayload, Station};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::controller::PlayerEvent;

pub struct CatalogPoller {
    client: reqwest::Client,
    url: String,
    interval: Duration,
    event_tx: mpsc::Sender<PlayerEvent>,
}

impl CatalogPoller {
    pub fn new(url: String, poll_interval_secs: u64, event_tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            // A zero interval would busy-loop against the backend.
            interval: Duration::from_secs(poll_interval_secs.max(1)),
            event_tx,
        }
    }

    /// Poll until the controller side of the channel goes away.
    pub async fn run(self) {
        info!("catalog: polling {} every {:?}", self.url, self.interval);
        let mut last: Option<Vec<Station>> = None;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let stations = match self.fetch().await {
                Ok(stations) => stations,
                Err(e) => {
                    warn!("catalog: fetch failed: {e}");
                    continue;
                }
            };

            if last.as_ref() == Some(&stations) {
                debug!("catalog: unchanged, skipping");
                continue;
            }

            last = Some(stations.clone());
            if self
                .event_tx
                .send(PlayerEvent::Catalog(stations))
                .await
                .is_err()
            {
                debug!("catalog: controller gone, stopping poller");
                return;
            }
        }
    }

    async fn fetch(&self) -> anyhow::Result<Vec<Station>> {
        let payload: CatalogPayload = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(payload.stations)
    }
}
