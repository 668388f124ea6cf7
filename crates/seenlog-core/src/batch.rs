//! Fan-out of per-episode seen-store writes, tracked to joint completion.
//!
//! Each episode is an independent store operation; there is no rollback. A
//! batch is complete once every issued write has resolved, whatever the mix
//! of successes and failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use seenlog_bus::BusPublisher;
use seenlog_schema::{BusMessage, Episode, EpisodeId};
use seenlog_store::{SeenStore, StoreError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub mark_seen: bool,
    pub succeeded: Vec<EpisodeId>,
    pub failed: Vec<(EpisodeId, StoreError)>,
}

impl BatchReport {
    fn empty(batch_id: Uuid, mark_seen: bool) -> Self {
        Self {
            batch_id,
            mark_seen,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counts resolutions for a fixed set of issued writes and yields the report
/// exactly once, when the last one resolves. Late or repeated resolutions
/// are ignored.
#[derive(Debug)]
pub struct BatchTracker {
    batch_id: Uuid,
    mark_seen: bool,
    outcomes: HashMap<EpisodeId, Option<Result<(), StoreError>>>,
    resolved: usize,
    fired: bool,
}

impl BatchTracker {
    pub fn new(batch_id: Uuid, mark_seen: bool, ids: impl IntoIterator<Item = EpisodeId>) -> Self {
        Self {
            batch_id,
            mark_seen,
            outcomes: ids.into_iter().map(|id| (id, None)).collect(),
            resolved: 0,
            fired: false,
        }
    }

    pub fn expected(&self) -> usize {
        self.outcomes.len()
    }

    pub fn resolved(&self) -> usize {
        self.resolved
    }

    pub fn is_complete(&self) -> bool {
        self.fired
    }

    pub fn record(&mut self, id: EpisodeId, result: Result<(), StoreError>) -> Option<BatchReport> {
        let Some(slot) = self.outcomes.get_mut(&id) else {
            tracing::warn!(batch_id = %self.batch_id, episode_id = id, "resolution for unknown write ignored");
            return None;
        };
        if slot.is_some() {
            tracing::warn!(batch_id = %self.batch_id, episode_id = id, "duplicate resolution ignored");
            return None;
        }
        *slot = Some(result);
        self.resolved += 1;

        if self.fired || self.resolved < self.outcomes.len() {
            return None;
        }
        self.fired = true;
        Some(self.report())
    }

    fn report(&self) -> BatchReport {
        let mut report = BatchReport::empty(self.batch_id, self.mark_seen);
        let mut ids: Vec<&EpisodeId> = self.outcomes.keys().collect();
        ids.sort();
        for id in ids {
            match &self.outcomes[id] {
                Some(Ok(())) => report.succeeded.push(*id),
                Some(Err(err)) => report.failed.push((*id, err.clone())),
                None => {}
            }
        }
        report
    }
}

/// Issues the writes of a batch against the seen store.
#[derive(Clone)]
pub struct BatchMutationCoordinator {
    store: Arc<dyn SeenStore>,
    user_id: String,
    bus: Option<BusPublisher>,
}

impl BatchMutationCoordinator {
    pub fn new(store: Arc<dyn SeenStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: BusPublisher) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Upsert (`mark_seen`) or delete one record per distinct episode. All
    /// writes are in flight at once and may resolve in any order.
    pub async fn commit(&self, selection: Vec<Episode>, mark_seen: bool) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let unique: BTreeMap<EpisodeId, Episode> =
            selection.into_iter().map(|e| (e.id, e)).collect();

        if unique.is_empty() {
            return BatchReport::empty(batch_id, mark_seen);
        }

        let mut tracker = BatchTracker::new(batch_id, mark_seen, unique.keys().copied());
        let mut writes: FuturesUnordered<_> = unique
            .into_values()
            .map(|episode| self.write_one(episode, mark_seen))
            .collect();

        let mut report = None;
        while let Some((id, result)) = writes.next().await {
            if let Err(err) = &result {
                tracing::warn!(%batch_id, episode_id = id, error = %err, "seen store write failed");
            } else {
                tracing::debug!(%batch_id, episode_id = id, mark_seen, "seen store write ok");
            }
            if let Some(done) = tracker.record(id, result) {
                report = Some(done);
            }
        }
        let report = report.unwrap_or_else(|| BatchReport::empty(batch_id, mark_seen));

        tracing::info!(
            %batch_id,
            mark_seen,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch complete"
        );
        if let Some(bus) = &self.bus {
            let _ = bus
                .publish(BusMessage::BatchCompleted {
                    batch_id,
                    mark_seen,
                    succeeded: report.succeeded.clone(),
                    failed: report.failed.iter().map(|(id, _)| *id).collect(),
                })
                .await;
        }
        report
    }

    async fn write_one(
        &self,
        episode: Episode,
        mark_seen: bool,
    ) -> (EpisodeId, Result<(), StoreError>) {
        let id = episode.id;
        let document_id = episode.document_id();
        let result = if mark_seen {
            let snapshot = Episode {
                seen: true,
                ..episode
            };
            match serde_json::to_value(&snapshot) {
                Ok(payload) => self.store.upsert(&self.user_id, &document_id, payload).await,
                Err(e) => Err(StoreError::from(e)),
            }
        } else {
            self.store.delete(&self.user_id, &document_id).await
        };
        (id, result)
    }
}
