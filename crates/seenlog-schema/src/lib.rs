use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EpisodeId = u32;
pub type CharacterId = u32;

/// One episode as delivered by the catalog.
///
/// `seen` is never read from the wire; it is filled in by reconciliation and
/// only reflects the seen store as of the last cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub id: EpisodeId,
    /// Season/episode code, e.g. "S01E01"
    #[serde(rename = "episode")]
    pub code: String,
    #[serde(rename = "name")]
    pub title: String,
    #[serde(default)]
    pub air_date: String,
    /// Absolute character locators ending in `/{id}`
    #[serde(rename = "characters", default)]
    pub character_refs: Vec<String>,
    #[serde(default)]
    pub seen: bool,
}

impl Episode {
    pub fn new(id: EpisodeId, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            title: title.into(),
            air_date: String::new(),
            character_refs: Vec::new(),
            seen: false,
        }
    }

    pub fn with_air_date(mut self, air_date: impl Into<String>) -> Self {
        self.air_date = air_date.into();
        self
    }

    pub fn with_character_refs(mut self, refs: Vec<String>) -> Self {
        self.character_refs = refs;
        self
    }

    /// Key under which the seen store files this episode.
    pub fn document_id(&self) -> String {
        self.id.to_string()
    }
}

/// Root object of the episode listing endpoint. Pagination metadata under
/// `info` is not consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodePage {
    #[serde(default)]
    pub results: Vec<Episode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    /// Image locator, passed through untouched
    #[serde(rename = "image")]
    pub image_ref: String,
}

/// Existence of a record means "seen". The payload is a convenience copy of
/// the episode and is never used for identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeenRecord {
    pub user_id: String,
    pub episode_id: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    ReloadRequested {
        reason: String,
    },
    CycleCompleted {
        cycle: u64,
        episodes: usize,
        seen: usize,
    },
    CatalogLoadFailed {
        cycle: u64,
        error: String,
    },
    BatchCompleted {
        batch_id: Uuid,
        mark_seen: bool,
        succeeded: Vec<EpisodeId>,
        failed: Vec<EpisodeId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_deserializes_from_catalog_shape() {
        let json = serde_json::json!({
            "id": 1,
            "name": "Pilot",
            "air_date": "December 2, 2013",
            "episode": "S01E01",
            "characters": [
                "https://rickandmortyapi.com/api/character/1",
                "https://rickandmortyapi.com/api/character/2"
            ],
            "url": "https://rickandmortyapi.com/api/episode/1",
            "created": "2017-11-10T12:56:33.798Z"
        });

        let ep: Episode = serde_json::from_value(json).unwrap();
        assert_eq!(ep.id, 1);
        assert_eq!(ep.code, "S01E01");
        assert_eq!(ep.title, "Pilot");
        assert_eq!(ep.air_date, "December 2, 2013");
        assert_eq!(ep.character_refs.len(), 2);
        assert!(!ep.seen);
    }

    #[test]
    fn page_ignores_info_block() {
        let json = serde_json::json!({
            "info": {"count": 51, "pages": 3, "next": "https://x/api/episode?page=2", "prev": null},
            "results": [
                {"id": 2, "name": "Lawnmower Dog", "episode": "S01E02", "air_date": "", "characters": []}
            ]
        });
        let page: EpisodePage = serde_json::from_value(json).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].title, "Lawnmower Dog");
    }

    #[test]
    fn character_maps_image_field() {
        let json = r#"{"id": 35, "name": "Bepisian", "image": "https://x/avatar/35.jpeg", "status": "Alive"}"#;
        let c: Character = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, 35);
        assert_eq!(c.image_ref, "https://x/avatar/35.jpeg");
    }

    #[test]
    fn document_id_is_decimal_id() {
        assert_eq!(Episode::new(24, "S02E03", "x").document_id(), "24");
    }
}
