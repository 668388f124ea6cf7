//! Per-user store of seen-episode records.
//!
//! Records are filed under `(user_id, episode_id)` where `episode_id` is the
//! decimal string of the catalog id. A record's existence is what marks an
//! episode as seen; its payload is informational only.

pub mod memory;
pub mod sqlite_store;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemorySeenStore;
use seenlog_schema::SeenRecord;
pub use sqlite_store::SqliteSeenStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("seen store unavailable: {0}")]
    Unavailable(String),

    #[error("seen store backend error: {0}")]
    Backend(String),

    #[error("seen record payload could not be encoded: {0}")]
    Encode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Ids of every record the user has.
    async fn list_seen(&self, user_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn get(&self, user_id: &str, episode_id: &str)
        -> Result<Option<SeenRecord>, StoreError>;

    /// Create the record, or merge `payload` into the existing one.
    async fn upsert(
        &self,
        user_id: &str,
        episode_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Deleting a missing record succeeds.
    async fn delete(&self, user_id: &str, episode_id: &str) -> Result<(), StoreError>;
}

/// Field-level merge: top-level keys of `incoming` overwrite those of
/// `existing`, keys only present in `existing` survive. Non-object payloads
/// are replaced wholesale.
pub fn merge_payload(existing: serde_json::Value, incoming: serde_json::Value) -> serde_json::Value {
    match (existing, incoming) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

// ============================================================
// Store Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

fn default_store_path() -> String {
    "data/seen.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Relative paths are resolved against the config root.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self, root: &Path) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            path
        } else {
            root.join(path)
        }
    }
}

/// Build the process-wide store handle from configuration.
pub fn open_store(config: &StoreConfig, root: &Path) -> Result<Arc<dyn SeenStore>, StoreError> {
    let store: Arc<dyn SeenStore> = match config.kind {
        StoreKind::Sqlite => {
            let path = config.resolved_path(root);
            tracing::info!(path = %path.display(), "opening sqlite seen store");
            Arc::new(SqliteSeenStore::open(&path)?)
        }
        StoreKind::Memory => {
            tracing::info!("using in-memory seen store");
            Arc::new(MemorySeenStore::new())
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_and_keeps_fields() {
        let existing = json!({"id": 1, "name": "Pilot", "note": "rewatch"});
        let incoming = json!({"id": 1, "name": "Pilot (remastered)"});
        let merged = merge_payload(existing, incoming);
        assert_eq!(
            merged,
            json!({"id": 1, "name": "Pilot (remastered)", "note": "rewatch"})
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let incoming = json!({"id": 7, "seen": true});
        let once = merge_payload(json!({}), incoming.clone());
        let twice = merge_payload(once.clone(), incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_non_object_replaces() {
        assert_eq!(merge_payload(json!([1, 2]), json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge_payload(json!({"a": 1}), json!(null)), json!(null));
    }

    #[test]
    fn store_config_defaults_to_sqlite() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.kind, StoreKind::Sqlite);
        assert_eq!(config.path, "data/seen.db");
    }

    #[test]
    fn resolved_path_is_relative_to_root() {
        let config = StoreConfig::default();
        let root = Path::new("/home/u/.seenlog");
        assert_eq!(
            config.resolved_path(root),
            PathBuf::from("/home/u/.seenlog/data/seen.db")
        );

        let absolute = StoreConfig {
            kind: StoreKind::Sqlite,
            path: "/var/lib/seenlog/seen.db".into(),
        };
        assert_eq!(
            absolute.resolved_path(root),
            PathBuf::from("/var/lib/seenlog/seen.db")
        );
    }

    #[tokio::test]
    async fn open_memory_store() {
        let config = StoreConfig {
            kind: StoreKind::Memory,
            path: String::new(),
        };
        let store = open_store(&config, Path::new(".")).unwrap();
        assert!(store.list_seen("u1").await.unwrap().is_empty());
    }
}
