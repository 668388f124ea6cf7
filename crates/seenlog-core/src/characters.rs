use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use seenlog_catalog::CatalogClient;
use seenlog_schema::{Character, CharacterId};

use crate::CoreError;

/// Id at the end of a character locator, e.g. `.../character/35` -> 35.
pub fn parse_character_ref(reference: &str) -> Result<CharacterId, CoreError> {
    reference
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<CharacterId>().ok())
        .ok_or_else(|| CoreError::malformed_reference(reference))
}

/// Distinct ids in first-occurrence order. Malformed references are skipped.
pub fn character_ids(refs: &[String]) -> Vec<CharacterId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for reference in refs {
        match parse_character_ref(reference) {
            Ok(id) => {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            Err(err) => tracing::warn!(error = %err, "skipping character reference"),
        }
    }
    ids
}

/// Turns an episode's character references into display records with a
/// single catalog round-trip.
#[derive(Clone)]
pub struct CharacterResolver {
    catalog: Arc<dyn CatalogClient>,
}

impl CharacterResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }

    /// Results follow the first-occurrence order of `refs`. Ids the catalog
    /// does not return are simply absent.
    pub async fn resolve(&self, refs: &[String]) -> Result<Vec<Character>, CoreError> {
        let ids = character_ids(refs);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self.catalog.fetch_characters(&ids).await?;
        let mut by_id: HashMap<CharacterId, Character> =
            fetched.into_iter().map(|c| (c.id, c)).collect();

        let ordered: Vec<Character> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        tracing::debug!(
            requested = ids.len(),
            resolved = ordered.len(),
            "resolved characters"
        );
        Ok(ordered)
    }
}
