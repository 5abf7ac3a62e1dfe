//! Decoder adapter.
//!
//! Wraps the media sink behind one attach/detach/resume/destroy surface so
//! the controller treats manifest-based and progressive candidates the same
//! way.  Exactly one instance exists per playback session; the controller
//! destroys the old one before creating the next.

use crate::sink::{MediaSink, SinkError};
use radio_core::station::TransportKind;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Attached,
    Detached,
    Destroyed,
}

pub struct StreamDecoder {
    kind: TransportKind,
    url: String,
    sink: Arc<dyn MediaSink>,
    lifecycle: Lifecycle,
}

impl StreamDecoder {
    /// Hand the candidate to the sink and start playback.  For `Hls` the URL
    /// is the manifest; for `Proxied`/`Direct` it is the stream itself.  The
    /// play step may reject; the caller treats that as a per-candidate
    /// failure.
    pub async fn attach(
        kind: TransportKind,
        url: String,
        sink: Arc<dyn MediaSink>,
    ) -> Result<Self, SinkError> {
        debug!("decoder: attach kind={:?} url={}", kind, url);
        sink.set_source(&url).await?;
        sink.play().await?;
        Ok(Self {
            kind,
            url,
            sink,
            lifecycle: Lifecycle::Attached,
        })
    }

    /// Pause the sink and, for manifest-based streams, halt segment loading.
    /// The instance stays usable: `resume` picks playback back up without a
    /// full reattach.
    pub async fn detach(&mut self) -> Result<(), SinkError> {
        debug_assert!(self.lifecycle != Lifecycle::Destroyed);
        debug!("decoder: detach url={}", self.url);
        self.sink.pause().await?;
        if self.kind == TransportKind::Hls {
            self.sink.stop_load().await?;
        }
        self.lifecycle = Lifecycle::Detached;
        Ok(())
    }

    /// Resume a detached instance.
    pub async fn resume(&mut self) -> Result<(), SinkError> {
        debug_assert!(self.lifecycle == Lifecycle::Detached);
        debug!("decoder: resume url={}", self.url);
        self.sink.play().await?;
        self.lifecycle = Lifecycle::Attached;
        Ok(())
    }

    /// Irreversible teardown: stop network activity and release the media
    /// binding.  Errors are swallowed — the instance is being discarded and
    /// there is nothing useful to do with a failed teardown.
    pub async fn destroy(&mut self) {
        debug!("decoder: destroy url={}", self.url);
        let _ = self.sink.pause().await;
        let _ = self.sink.stop_load().await;
        self.lifecycle = Lifecycle::Destroyed;
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_detached(&self) -> bool {
        self.lifecycle == Lifecycle::Detached
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == Lifecycle::Destroyed
    }
}
