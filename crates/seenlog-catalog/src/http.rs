use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use seenlog_schema::{Character, CharacterId, Episode, EpisodePage};
use serde::Deserialize;

use crate::{CatalogClient, CatalogError};

const BODY_EXCERPT_LEN: usize = 200;

/// Catalog client for the public episode API (`/episode`, `/character/{ids}`).
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    api_base: String,
    timeout_secs: u64,
}

/// The character endpoint answers a single id with a bare object and
/// several ids with an array.
#[derive(Deserialize)]
#[serde(untagged)]
enum CharacterPayload {
    Many(Vec<Character>),
    One(Character),
}

impl From<CharacterPayload> for Vec<Character> {
    fn from(payload: CharacterPayload) -> Self {
        match payload {
            CharacterPayload::Many(list) => list,
            CharacterPayload::One(c) => vec![c],
        }
    }
}

impl HttpCatalogClient {
    pub fn new(api_base: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_text(&self, url: String) -> Result<String, CatalogError> {
        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(CatalogError::Timeout(self.timeout_secs)),
            Err(e) if e.is_connect() => return Err(CatalogError::Connect(e.to_string())),
            Err(e) => return Err(CatalogError::Transport(e.to_string())),
        };

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            tracing::warn!(%url, status = status.as_u16(), "catalog request failed");
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_episodes(&self) -> Result<Vec<Episode>, CatalogError> {
        let url = format!("{}/episode", self.api_base);
        let text = self.get_text(url).await?;
        let page: EpisodePage =
            serde_json::from_str(&text).map_err(|e| CatalogError::Decode(e.to_string()))?;
        tracing::debug!(count = page.results.len(), "fetched episode page");
        Ok(page.results)
    }

    async fn fetch_characters(&self, ids: &[CharacterId]) -> Result<Vec<Character>, CatalogError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = join_ids(ids);
        let url = format!("{}/character/{}", self.api_base, joined);
        let text = self.get_text(url).await?;
        let payload: CharacterPayload =
            serde_json::from_str(&text).map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(payload.into())
    }
}

/// Comma-joined id list as the character endpoint expects it ("1,2,35").
pub fn join_ids(ids: &[CharacterId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_LEN).collect()
}
