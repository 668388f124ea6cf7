use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use seenlog_schema::SeenRecord;
use tokio::sync::RwLock;

use crate::{merge_payload, SeenStore, StoreError};

type UserRecords = HashMap<String, SeenRecord>;

/// Seen store kept in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    users: RwLock<HashMap<String, UserRecords>>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, user_id: &str) -> usize {
        self.users
            .read()
            .await
            .get(user_id)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn list_seen(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        user_id: &str,
        episode_id: &str,
    ) -> Result<Option<SeenRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .and_then(|records| records.get(episode_id))
            .cloned())
    }

    async fn upsert(
        &self,
        user_id: &str,
        episode_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let records = users.entry(user_id.to_string()).or_default();
        let merged = match records.remove(episode_id) {
            Some(existing) => merge_payload(existing.payload, payload),
            None => payload,
        };
        records.insert(
            episode_id.to_string(),
            SeenRecord {
                user_id: user_id.to_string(),
                episode_id: episode_id.to_string(),
                payload: merged,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, user_id: &str, episode_id: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(records) = users.get_mut(user_id) {
            records.remove(episode_id);
        }
        Ok(())
    }
}
