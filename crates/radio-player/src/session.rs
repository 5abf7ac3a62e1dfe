//! Stream-URL session tagging.
//!
//! Stream operators correlate listener sessions through a stable identifier
//! carried on the stream URL.  The identifier is minted once per
//! installation and reused forever; it has no influence on candidate
//! selection.  Tagging is best-effort — a URL that fails to parse is handed
//! back untouched rather than blocking playback.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

const SESSION_ID_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    session_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionTagger {
    session_id: String,
    referrer: String,
}

impl SessionTagger {
    /// Load the durable session identifier, minting and persisting a fresh
    /// one when the file is missing.  If the store cannot be written the
    /// tagger degrades to an ephemeral identifier for this process.
    pub fn new(session_file: &Path, referrer: &str) -> Self {
        let session_id = match Self::load(session_file) {
            Some(id) => id,
            None => {
                let id = mint_session_id();
                if let Err(e) = Self::store(session_file, &id) {
                    warn!("session tagger: could not persist session id: {e}");
                }
                id
            }
        };
        Self {
            session_id,
            referrer: referrer.to_string(),
        }
    }

    /// Append the session identifier and referrer as query parameters.
    /// Returns a new string; the input is never mutated.
    pub fn tag(&self, url: &str) -> String {
        match reqwest::Url::parse(url) {
            Ok(mut parsed) => {
                parsed
                    .query_pairs_mut()
                    .append_pair("s", &self.session_id)
                    .append_pair("ref", &self.referrer);
                parsed.to_string()
            }
            Err(e) => {
                warn!("session tagger: unparseable url '{url}': {e}");
                url.to_string()
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn load(session_file: &Path) -> Option<String> {
        let content = std::fs::read_to_string(session_file).ok()?;
        let stored: StoredSession = serde_json::from_str(&content).ok()?;
        if stored.session_id.is_empty() {
            None
        } else {
            Some(stored.session_id)
        }
    }

    fn store(session_file: &Path, id: &str) -> anyhow::Result<()> {
        if let Some(parent) = session_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&StoredSession {
            session_id: id.to_string(),
        })?;
        std::fs::write(session_file, json)?;
        Ok(())
    }
}

fn mint_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("radio-session-{}-{}", std::process::id(), name))
    }

    #[test]
    fn tag_appends_session_and_referrer() {
        let file = temp_file("tag.json");
        let tagger = SessionTagger::new(&file, "radio.example");
        let tagged = tagger.tag("https://cdn.example/stream");
        assert!(tagged.contains(&format!("s={}", tagger.session_id())));
        assert!(tagged.contains("ref=radio.example"));
        let _ = std::fs::remove_file(&file);
    }

    #[test]
    fn identifier_is_stable_across_instances() {
        let file = temp_file("stable.json");
        let first = SessionTagger::new(&file, "radio.example");
        let second = SessionTagger::new(&file, "radio.example");
        assert_eq!(first.session_id(), second.session_id());
        let _ = std::fs::remove_file(&file);
    }

    #[test]
    fn unwritable_store_still_yields_an_identifier() {
        let file = PathBuf::from("/proc/radio-player-cannot-write/session.json");
        let tagger = SessionTagger::new(&file, "radio.example");
        assert_eq!(tagger.session_id().len(), SESSION_ID_LEN);
    }

    #[test]
    fn unparseable_url_passes_through() {
        let file = temp_file("bad-url.json");
        let tagger = SessionTagger::new(&file, "radio.example");
        assert_eq!(tagger.tag("not a url"), "not a url");
        let _ = std::fs::remove_file(&file);
    }

    #[test]
    fn existing_query_parameters_survive() {
        let file = temp_file("query.json");
        let tagger = SessionTagger::new(&file, "radio.example");
        let tagged = tagger.tag("https://cdn.example/stream?bitrate=128");
        assert!(tagged.contains("bitrate=128"));
        assert!(tagged.contains("ref=radio.example"));
        let _ = std::fs::remove_file(&file);
    }
}
