//! The user's favorite movies, mirrored to durable storage.
//!
//! The in-memory list is authoritative. Every mutation rewrites the whole list
//! under [`FAVORITES_KEY`]; there is no incremental diffing.

use crate::models::{CatalogMovie, MovieId, MovieSummary};
use crate::storage::KeyValueStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const FAVORITES_KEY: &str = "movieFavorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Added,
    Removed,
}

pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStore>,
    favorites: Vec<MovieSummary>,
    last_write_error: Option<String>,
}

impl FavoritesStore {
    /// Loads the persisted favorites. Never fails: unreadable or corrupted data
    /// yields an empty list, and corrupted data is erased from storage.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        let favorites = hydrate(storage.as_ref());
        info!("Loaded {} favorites", favorites.len());
        Self {
            storage,
            favorites,
            last_write_error: None,
        }
    }

    pub fn favorites(&self) -> &[MovieSummary] {
        &self.favorites
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
    }

    pub fn is_favorite(&self, id: &MovieId) -> bool {
        self.favorites.iter().any(|m| m.id.matches(id))
    }

    /// Returns `false` when the movie was already a favorite.
    pub fn add_favorite(&mut self, movie: &CatalogMovie) -> bool {
        if self.is_favorite(&movie.id) {
            return false;
        }
        if movie.id.normalize().is_none() {
            warn!("Refusing favorite with non-numeric id '{}'", movie.id);
            return false;
        }
        self.favorites.push(MovieSummary::from(movie));
        debug!("Added favorite {} '{}'", movie.id, movie.title);
        self.persist();
        true
    }

    /// Returns `false` when nothing matched.
    pub fn remove_favorite(&mut self, id: &MovieId) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|m| !m.id.matches(id));
        if self.favorites.len() == before {
            return false;
        }
        debug!("Removed favorite {}", id);
        self.persist();
        true
    }

    /// Returns `None` when the movie was absent and could not be added
    /// (its id is not numeric).
    pub fn toggle_favorite(&mut self, movie: &CatalogMovie) -> Option<Toggle> {
        if self.is_favorite(&movie.id) {
            self.remove_favorite(&movie.id);
            Some(Toggle::Removed)
        } else if self.add_favorite(movie) {
            Some(Toggle::Added)
        } else {
            None
        }
    }

    /// The error from the most recent write, cleared by the next successful one.
    /// In-memory state is never rolled back when a write fails.
    pub fn last_write_error(&self) -> Option<&str> {
        self.last_write_error.as_deref()
    }

    fn persist(&mut self) {
        let result = serde_json::to_vec(&self.favorites)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.storage
                    .set(FAVORITES_KEY, &bytes)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => self.last_write_error = None,
            Err(e) => {
                error!("Failed to persist {} favorites: {}", self.favorites.len(), e);
                self.last_write_error = Some(e);
            }
        }
    }
}

fn hydrate(storage: &dyn KeyValueStore) -> Vec<MovieSummary> {
    let raw = match storage.get(FAVORITES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!("Failed to read favorites from storage: {}", e);
            return Vec::new();
        }
    };

    let parsed: Vec<MovieSummary> = match serde_json::from_slice(&raw) {
        Ok(list) => list,
        Err(e) => {
            warn!("Failed to parse stored favorites, resetting: {}", e);
            if let Err(e) = storage.remove(FAVORITES_KEY) {
                error!("Failed to clear corrupted favorites: {}", e);
            }
            return Vec::new();
        }
    };

    let mut favorites: Vec<MovieSummary> = Vec::with_capacity(parsed.len());
    for movie in parsed {
        if movie.id.normalize().is_none() {
            warn!("Dropping stored favorite with non-numeric id '{}'", movie.id);
            continue;
        }
        if favorites.iter().any(|m| m.id.matches(&movie.id)) {
            warn!("Dropping duplicate stored favorite {}", movie.id);
            continue;
        }
        favorites.push(movie);
    }
    favorites
}
