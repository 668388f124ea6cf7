use std::collections::{BTreeSet, HashSet};

use seenlog_schema::{Episode, EpisodeId};

/// Episodes picked for a batch mutation. Selection mode is active while the
/// set is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<EpisodeId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: EpisodeId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: EpisodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Deselect every id in `ids`, leaving any others untouched.
    pub fn remove_all(&mut self, ids: &HashSet<EpisodeId>) {
        self.ids.retain(|id| !ids.contains(id));
    }

    pub fn ids(&self) -> Vec<EpisodeId> {
        self.ids.iter().copied().collect()
    }

    /// Drop ids not present in `visible`; returns the dropped ids.
    pub fn retain_visible(&mut self, visible: &[Episode]) -> Vec<EpisodeId> {
        let keep: HashSet<EpisodeId> = visible.iter().map(|e| e.id).collect();
        let dropped: Vec<EpisodeId> = self
            .ids
            .iter()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();
        for id in &dropped {
            self.ids.remove(id);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let mut sel = SelectionSet::new();
        assert!(sel.toggle(3));
        assert!(sel.contains(3));
        assert!(!sel.toggle(3));
        assert!(sel.is_empty());
    }

    #[test]
    fn remove_all_keeps_other_ids() {
        let mut sel = SelectionSet::new();
        sel.toggle(1);
        sel.toggle(2);
        sel.toggle(3);

        sel.remove_all(&HashSet::from([1, 2, 9]));

        assert_eq!(sel.ids(), vec![3]);
    }

    #[test]
    fn retain_visible_drops_hidden() {
        let mut sel = SelectionSet::new();
        sel.toggle(1);
        sel.toggle(2);
        sel.toggle(5);

        let visible = vec![Episode::new(2, "S01E02", "b"), Episode::new(5, "S01E05", "e")];
        let dropped = sel.retain_visible(&visible);

        assert_eq!(dropped, vec![1]);
        assert_eq!(sel.ids(), vec![2, 5]);
    }
}
