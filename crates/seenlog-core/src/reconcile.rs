//! Catalog ∪ seen-overlay merge and the projections derived from it.
//!
//! Everything here is pure: no I/O, no state carried between calls, inputs
//! are never mutated.

use std::collections::HashSet;

use seenlog_schema::{Episode, EpisodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    All,
    SeenOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub seen_count: usize,
    pub total: usize,
    /// Truncated, never rounded: 1 of 3 is 33.
    pub percent: u32,
}

/// Annotate every catalog episode with `seen = seen_ids.contains(id)`.
/// Catalog order is display order and is preserved.
pub fn reconcile(catalog: &[Episode], seen_ids: &HashSet<EpisodeId>) -> Vec<Episode> {
    catalog
        .iter()
        .map(|episode| Episode {
            seen: seen_ids.contains(&episode.id),
            ..episode.clone()
        })
        .collect()
}

pub fn filter(reconciled: &[Episode], mode: FilterMode) -> Vec<Episode> {
    match mode {
        FilterMode::All => reconciled.to_vec(),
        FilterMode::SeenOnly => reconciled.iter().filter(|e| e.seen).cloned().collect(),
    }
}

/// Seen count is taken from the reconciled catalog, so store records for
/// episodes the catalog no longer lists do not count.
pub fn aggregate_progress(reconciled: &[Episode]) -> Progress {
    let total = reconciled.len();
    let seen_count = reconciled.iter().filter(|e| e.seen).count();
    let percent = if total == 0 {
        0
    } else {
        (seen_count * 100 / total) as u32
    };
    Progress {
        seen_count,
        total,
        percent,
    }
}

/// Convert store document ids to episode ids. Ids that are not decimal
/// integers cannot match a catalog entry and are dropped.
pub fn seen_ids_from_documents(documents: &HashSet<String>) -> HashSet<EpisodeId> {
    documents
        .iter()
        .filter_map(|doc| match doc.parse::<EpisodeId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(document = %doc, "ignoring seen record with non-numeric id");
                None
            }
        })
        .collect()
}
