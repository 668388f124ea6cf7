//! The episode list view context.
//!
//! Owns the reconciled snapshot, the active filter and the selection set.
//! All mutation goes through these methods; the state lock serializes
//! concurrent callers. Load cycles are numbered and a cycle whose result
//! arrives after a newer cycle has started is discarded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use seenlog_bus::BusPublisher;
use seenlog_catalog::CatalogClient;
use seenlog_schema::{BusMessage, Character, Episode, EpisodeId};
use seenlog_store::SeenStore;
use tokio::sync::Mutex;

use crate::batch::{BatchMutationCoordinator, BatchReport};
use crate::characters::CharacterResolver;
use crate::reconcile::{
    aggregate_progress, filter, reconcile, seen_ids_from_documents, FilterMode, Progress,
};
use crate::selection::SelectionSet;
use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied {
        cycle: u64,
        episodes: usize,
        seen: usize,
    },
    /// A newer cycle started before this one finished.
    Superseded { cycle: u64, latest: u64 },
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub report: BatchReport,
    /// Only present when every write succeeded.
    pub reload: Option<Result<LoadOutcome, CoreError>>,
}

#[derive(Debug, Clone)]
pub struct EpisodeDetail {
    pub episode: Episode,
    pub characters: Vec<Character>,
}

#[derive(Debug, Default)]
struct ViewState {
    snapshot: Vec<Episode>,
    /// Cycle that produced `snapshot`, 0 before the first load.
    applied_cycle: u64,
    loaded: bool,
    filter: FilterMode,
    selection: SelectionSet,
}

impl ViewState {
    fn visible(&self) -> Vec<Episode> {
        filter(&self.snapshot, self.filter)
    }

    fn prune_selection(&mut self) {
        let visible = self.visible();
        let dropped = self.selection.retain_visible(&visible);
        if !dropped.is_empty() {
            tracing::debug!(?dropped, "selection pruned to visible episodes");
        }
    }

    fn set_seen_flags(&mut self, ids: &HashSet<EpisodeId>, seen: bool) {
        self.snapshot = self
            .snapshot
            .iter()
            .map(|e| {
                if ids.contains(&e.id) {
                    Episode {
                        seen,
                        ..e.clone()
                    }
                } else {
                    e.clone()
                }
            })
            .collect();
    }
}

pub struct EpisodeView {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn SeenStore>,
    user_id: String,
    coordinator: BatchMutationCoordinator,
    resolver: CharacterResolver,
    bus: Option<BusPublisher>,
    cycle: AtomicU64,
    state: Mutex<ViewState>,
}

impl EpisodeView {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn SeenStore>,
        user_id: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            coordinator: BatchMutationCoordinator::new(store.clone(), user_id.clone()),
            resolver: CharacterResolver::new(catalog.clone()),
            catalog,
            store,
            user_id,
            bus: None,
            cycle: AtomicU64::new(0),
            state: Mutex::new(ViewState::default()),
        }
    }

    pub fn with_bus(mut self, bus: BusPublisher) -> Self {
        self.coordinator = self.coordinator.with_bus(bus.clone());
        self.bus = Some(bus);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Number of the most recently started load cycle.
    pub fn current_cycle(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }

    /// Run one reconciliation cycle: fetch both legs concurrently, merge,
    /// and replace the snapshot unless a newer cycle has started meanwhile.
    ///
    /// A seen-store failure fails open to "nothing seen". A catalog failure
    /// leaves the previous snapshot in place and is returned.
    pub async fn load(&self) -> Result<LoadOutcome, CoreError> {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;

        let (seen_ids, episodes) = tokio::join!(
            fetch_seen_ids(self.store.as_ref(), &self.user_id),
            self.catalog.fetch_episodes()
        );

        let episodes = match episodes {
            Ok(episodes) => episodes,
            Err(err) => {
                let latest = self.current_cycle();
                if latest != cycle {
                    tracing::debug!(cycle, latest, error = %err, "discarding superseded load failure");
                    return Ok(LoadOutcome::Superseded { cycle, latest });
                }
                tracing::warn!(cycle, error = %err, "catalog fetch failed");
                self.publish(BusMessage::CatalogLoadFailed {
                    cycle,
                    error: err.to_string(),
                })
                .await;
                return Err(err.into());
            }
        };

        let reconciled = reconcile(&episodes, &seen_ids);

        let mut state = self.state.lock().await;
        let latest = self.current_cycle();
        if latest != cycle {
            tracing::debug!(cycle, latest, "discarding superseded load");
            return Ok(LoadOutcome::Superseded { cycle, latest });
        }

        let seen = reconciled.iter().filter(|e| e.seen).count();
        let count = reconciled.len();
        state.snapshot = reconciled;
        state.applied_cycle = cycle;
        state.loaded = true;
        state.prune_selection();
        drop(state);

        tracing::info!(cycle, episodes = count, seen, "reconciliation applied");
        self.publish(BusMessage::CycleCompleted {
            cycle,
            episodes: count,
            seen,
        })
        .await;
        Ok(LoadOutcome::Applied {
            cycle,
            episodes: count,
            seen,
        })
    }

    /// Reload on return to the view, but only once something was loaded.
    pub async fn resume(&self) -> Option<Result<LoadOutcome, CoreError>> {
        if !self.state.lock().await.loaded {
            return None;
        }
        Some(self.load().await)
    }

    pub async fn snapshot(&self) -> Vec<Episode> {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn visible(&self) -> Vec<Episode> {
        self.state.lock().await.visible()
    }

    pub async fn filter_mode(&self) -> FilterMode {
        self.state.lock().await.filter
    }

    /// Switch the filter. Selected episodes that are no longer visible are
    /// deselected.
    pub async fn set_filter(&self, mode: FilterMode) -> Vec<Episode> {
        let mut state = self.state.lock().await;
        state.filter = mode;
        state.prune_selection();
        state.visible()
    }

    pub async fn progress(&self) -> Progress {
        aggregate_progress(&self.state.lock().await.snapshot)
    }

    /// Returns whether the episode is selected afterwards. Only visible
    /// episodes can be selected.
    pub async fn toggle_selection(&self, id: EpisodeId) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        if !state.visible().iter().any(|e| e.id == id) {
            return Err(CoreError::UnknownEpisode(id));
        }
        Ok(state.selection.toggle(id))
    }

    pub async fn selection(&self) -> Vec<EpisodeId> {
        self.state.lock().await.selection.ids()
    }

    pub async fn is_selecting(&self) -> bool {
        !self.state.lock().await.selection.is_empty()
    }

    pub async fn clear_selection(&self) {
        self.state.lock().await.selection.clear();
    }

    /// Write the selection to the seen store.
    ///
    /// The local `seen` flags are updated before the writes are issued. The
    /// committed ids leave the selection once every write has resolved; ids
    /// selected while the batch was in flight stay selected. A reload follows
    /// only when all writes succeeded; after a partial failure the local
    /// flags of failed items stay out of step with the store until the next
    /// cycle.
    pub async fn commit_selection(&self, mark_seen: bool) -> CommitOutcome {
        let (ids, episodes) = {
            let mut state = self.state.lock().await;
            let ids: HashSet<EpisodeId> = state.selection.ids().into_iter().collect();
            let picked: Vec<Episode> = state
                .snapshot
                .iter()
                .filter(|e| ids.contains(&e.id))
                .cloned()
                .collect();
            state.set_seen_flags(&ids, mark_seen);
            (ids, picked)
        };

        let report = self.coordinator.commit(episodes, mark_seen).await;
        self.state.lock().await.selection.remove_all(&ids);

        if !report.all_succeeded() {
            tracing::warn!(
                failed = report.failed.len(),
                "batch finished with failures, skipping reload"
            );
            return CommitOutcome {
                report,
                reload: None,
            };
        }
        if report.total() == 0 {
            return CommitOutcome {
                report,
                reload: None,
            };
        }

        self.publish(BusMessage::ReloadRequested {
            reason: format!("batch {} committed", report.batch_id),
        })
        .await;
        let reload = Some(self.load().await);
        CommitOutcome { report, reload }
    }

    /// Mark or unmark a single episode. The local flag is reverted when the
    /// store write fails, unless a newer cycle replaced the snapshot while the
    /// write was in flight.
    pub async fn set_seen(&self, id: EpisodeId, seen: bool) -> Result<(), CoreError> {
        let (episode, previous, applied_cycle) = {
            let mut state = self.state.lock().await;
            let episode = state
                .snapshot
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(CoreError::UnknownEpisode(id))?;
            let previous = episode.seen;
            state.set_seen_flags(&HashSet::from([id]), seen);
            (episode, previous, state.applied_cycle)
        };

        let report = self.coordinator.commit(vec![episode], seen).await;
        if let Some((_, err)) = report.failed.into_iter().next() {
            let mut state = self.state.lock().await;
            if state.applied_cycle == applied_cycle {
                state.set_seen_flags(&HashSet::from([id]), previous);
            } else {
                tracing::debug!(episode_id = id, "snapshot replaced during write, keeping its flag");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// The reconciled episode together with its resolved characters.
    pub async fn detail(&self, id: EpisodeId) -> Result<EpisodeDetail, CoreError> {
        let episode = self
            .state
            .lock()
            .await
            .snapshot
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(CoreError::UnknownEpisode(id))?;
        let characters = self.resolver.resolve(&episode.character_refs).await?;
        Ok(EpisodeDetail {
            episode,
            characters,
        })
    }

    async fn publish(&self, msg: BusMessage) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(msg).await;
        }
    }
}

async fn fetch_seen_ids(store: &dyn SeenStore, user_id: &str) -> HashSet<EpisodeId> {
    match store.list_seen(user_id).await {
        Ok(documents) => seen_ids_from_documents(&documents),
        Err(err) => {
            tracing::warn!(error = %err, "seen store read failed, treating nothing as seen");
            HashSet::new()
        }
    }
}

/// Stand-alone progress computation with its own fetch cycle.
pub async fn load_progress(
    catalog: &dyn CatalogClient,
    store: &dyn SeenStore,
    user_id: &str,
) -> Result<Progress, CoreError> {
    let (seen_ids, episodes) = tokio::join!(fetch_seen_ids(store, user_id), catalog.fetch_episodes());
    let reconciled = reconcile(&episodes?, &seen_ids);
    Ok(aggregate_progress(&reconciled))
}
