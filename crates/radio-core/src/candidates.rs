//! Stream-candidate ordering.
//!
//! Turns a station's raw endpoint list into the deterministic, deduplicated
//! sequence the playback controller walks on failure.  Pure functions; the
//! controller recomputes only when the endpoint list itself changes.

use crate::station::{StreamEndpoint, TransportKind};

/// Endpoints without an explicit order sort after everything that has one.
const ORDER_SENTINEL: u32 = 999;

/// One concrete attempt in the fallback sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCandidate {
    pub kind: TransportKind,
    pub url: String,
}

/// Sort ascending by explicit order (missing = sentinel), break ties by
/// transport precedence (Hls > Proxied > Direct), then drop duplicate URLs
/// keeping the preferred occurrence.  Empty input yields an empty sequence;
/// the caller treats that as "nothing playable".
pub fn order_candidates(endpoints: &[StreamEndpoint]) -> Vec<StreamCandidate> {
    let mut indexed: Vec<&StreamEndpoint> = endpoints.iter().collect();
    indexed.sort_by_key(|e| (e.order.unwrap_or(ORDER_SENTINEL), e.kind.precedence()));

    let mut out: Vec<StreamCandidate> = Vec::with_capacity(indexed.len());
    for e in indexed {
        if out.iter().any(|c| c.url == e.url) {
            continue;
        }
        out.push(StreamCandidate {
            kind: e.kind,
            url: e.url.clone(),
        });
    }
    out
}
