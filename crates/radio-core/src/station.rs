use serde::{Deserialize, Serialize};

/// How a stream endpoint is delivered.
///
/// Precedence when preference orders tie: `Hls` beats `Proxied` beats
/// `Direct`.  The serde aliases match the names catalog backends commonly
/// use on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Segmented, manifest-described stream (the decoder manages buffering).
    #[serde(alias = "HLS")]
    Hls,
    /// Operator-proxied continuous stream.
    #[serde(alias = "proxied_stream")]
    Proxied,
    /// Continuous stream straight from the source origin.
    #[serde(alias = "direct_stream")]
    Direct,
}

impl TransportKind {
    /// Rank used to break order ties — lower is preferred.
    pub fn precedence(self) -> u8 {
        match self {
            TransportKind::Hls => 0,
            TransportKind::Proxied => 1,
            TransportKind::Direct => 2,
        }
    }
}

/// One raw stream endpoint as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub kind: TransportKind,
    pub url: String,
    /// Explicit preference order, ascending = preferred.  Missing means
    /// "after everything that has one".
    #[serde(default)]
    pub order: Option<u32>,
}

/// What the station is currently broadcasting, per the catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NowPlaying {
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Station {
    pub id: u64,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Liveness flag from the catalog's uptime probe; next-station
    /// navigation only cycles through stations where this is true.
    #[serde(default)]
    pub is_up: bool,
    #[serde(default)]
    pub streams: Vec<StreamEndpoint>,
    #[serde(default)]
    pub now_playing: Option<NowPlaying>,
}

/// Catalog response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPayload {
    #[serde(default)]
    pub stations: Vec<Station>,
}
