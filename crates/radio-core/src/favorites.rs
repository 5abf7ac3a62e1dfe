//! Read-only view of the favorites collaborator.
//!
//! Favorites are owned and written elsewhere; the player only answers
//! "is this station favorited" for the UI projection.  A missing or
//! malformed file simply means no favorites.

use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct FavoriteSet {
    slugs: HashSet<String>,
}

impl FavoriteSet {
    pub fn load(path: &Path) -> Self {
        let slugs = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<Vec<String>>(&content).ok())
            .map(|list| list.into_iter().collect())
            .unwrap_or_default();
        Self { slugs }
    }

    pub fn is_favorite(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}
