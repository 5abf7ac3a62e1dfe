//! Catalog diffing helpers.
//!
//! The poller refreshes the full station list every few seconds, but most of
//! what changes is now-playing churn.  A live attachment must only be
//! disturbed when the selected station's stream endpoints actually differ.

use crate::station::Station;

/// True when the stream endpoint list of `slug` differs between the two
/// snapshots (including the station appearing or disappearing).  Metadata
/// such as now-playing, artwork, or uptime never counts.
pub fn streams_changed(old: &[Station], new: &[Station], slug: &str) -> bool {
    let old_streams = old.iter().find(|s| s.slug == slug).map(|s| &s.streams);
    let new_streams = new.iter().find(|s| s.slug == slug).map(|s| &s.streams);
    old_streams != new_streams
}

/// True when anything user-visible about `slug` changed (title, artwork,
/// now-playing, liveness).  Drives metadata republication without touching
/// playback.
pub fn metadata_changed(old: &[Station], new: &[Station], slug: &str) -> bool {
    let find = |list: &[Station]| {
        list.iter()
            .find(|s| s.slug == slug)
            .map(|s| (s.title.clone(), s.thumbnail_url.clone(), s.now_playing.clone(), s.is_up))
    };
    find(old) != find(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{NowPlaying, StreamEndpoint, TransportKind};

    fn station(slug: &str, urls: &[&str]) -> Station {
        Station {
            id: 1,
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            is_up: true,
            streams: urls
                .iter()
                .map(|u| StreamEndpoint {
                    kind: TransportKind::Direct,
                    url: u.to_string(),
                    order: None,
                })
                .collect(),
            ..Station::default()
        }
    }

    #[test]
    fn now_playing_churn_is_not_a_stream_change() {
        let old = vec![station("one", &["https://a/s"])];
        let mut new = old.clone();
        new[0].now_playing = Some(NowPlaying {
            song: "Song".into(),
            artist: "Artist".into(),
            thumbnail_url: None,
        });
        assert!(!streams_changed(&old, &new, "one"));
        assert!(metadata_changed(&old, &new, "one"));
    }

    #[test]
    fn endpoint_difference_is_a_stream_change() {
        let old = vec![station("one", &["https://a/s"])];
        let new = vec![station("one", &["https://b/s"])];
        assert!(streams_changed(&old, &new, "one"));
    }

    #[test]
    fn station_disappearing_is_a_stream_change() {
        let old = vec![station("one", &["https://a/s"])];
        assert!(streams_changed(&old, &[], "one"));
    }

    #[test]
    fn unrelated_station_churn_is_ignored() {
        let old = vec![station("one", &["https://a/s"]), station("two", &["https://b/s"])];
        let new = vec![station("one", &["https://a/s"]), station("two", &["https://c/s"])];
        assert!(!streams_changed(&old, &new, "one"));
        assert!(!metadata_changed(&old, &new, "one"));
    }
}
