pub mod error;
pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use seenlog_schema::{Character, CharacterId, Episode};
use serde::{Deserialize, Serialize};

pub use error::CatalogError;
pub use http::HttpCatalogClient;

pub const DEFAULT_API_BASE: &str = "https://rickandmortyapi.com/api";

/// Read-only source of episodes and characters.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Single-page fetch of the full episode catalog.
    async fn fetch_episodes(&self) -> Result<Vec<Episode>, CatalogError>;

    /// One batched lookup for the whole id list.
    async fn fetch_characters(&self, ids: &[CharacterId]) -> Result<Vec<Character>, CatalogError>;
}

// ============================================================
// Catalog Configuration
// ============================================================

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CatalogConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Build the process-wide catalog handle from configuration.
pub fn create_catalog(config: &CatalogConfig) -> Arc<dyn CatalogClient> {
    tracing::info!(base_url = %config.base_url, "using http catalog");
    Arc::new(HttpCatalogClient::new(
        config.base_url.clone(),
        config.timeout_secs,
    ))
}

// ============================================================
// Static catalog
// ============================================================

/// In-process catalog serving fixed data. Records every character lookup so
/// callers can assert on batching.
#[derive(Default)]
pub struct StaticCatalog {
    episodes: Vec<Episode>,
    characters: HashMap<CharacterId, Character>,
    episode_error: Option<CatalogError>,
    delay: Option<Duration>,
    lookups: Mutex<Vec<Vec<CharacterId>>>,
}

impl StaticCatalog {
    pub fn new(episodes: Vec<Episode>) -> Self {
        Self {
            episodes,
            ..Default::default()
        }
    }

    pub fn with_characters(mut self, characters: Vec<Character>) -> Self {
        self.characters = characters.into_iter().map(|c| (c.id, c)).collect();
        self
    }

    /// Make every episode fetch fail with `err`.
    pub fn failing(err: CatalogError) -> Self {
        Self {
            episode_error: Some(err),
            ..Default::default()
        }
    }

    /// Delay every episode fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookups(&self) -> Vec<Vec<CharacterId>> {
        self.lookups
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn fetch_episodes(&self) -> Result<Vec<Episode>, CatalogError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.episode_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.episodes.clone()),
        }
    }

    async fn fetch_characters(&self, ids: &[CharacterId]) -> Result<Vec<Character>, CatalogError> {
        if let Ok(mut lookups) = self.lookups.lock() {
            lookups.push(ids.to_vec());
        }
        // Mirror the remote: results come back in id order, not request order.
        let mut found: Vec<Character> = ids
            .iter()
            .filter_map(|id| self.characters.get(id).cloned())
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }
}
