//! Task-source synchronization.
//!
//! Computes the minimal diff between the task sources recorded for the
//! order's bound version and the sources carried by the in-memory tree,
//! then applies it through a persistence sink. Three sink modes exist:
//! full persistence, persist-but-keep-orphans (a fork must never delete
//! data inherited from the parent scenario, only shadow it), and an
//! in-memory dry run used when a cached planning state is re-retrieved.

use tracing::debug;

use crate::models::{Order, TaskSource};
use crate::stores::TaskSourceStore;

/// One synchronization action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSourceSynchronization {
    /// A tree source with no recorded counterpart.
    Add(TaskSource),
    /// A tree source already recorded for the version.
    Update(TaskSource),
    /// A recorded source whose task left the tree.
    Remove(TaskSource),
}

/// How synchronization actions hit the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistMode {
    /// Writes and removals both reach the store.
    Persist,
    /// Writes reach the store; removals only shadow in memory.
    KeepOrphans,
    /// Nothing reaches the store.
    NoPersist,
}

/// A persistence sink for synchronization actions.
pub struct TaskSourcePersistence<'a> {
    mode: PersistMode,
    store: Option<&'a dyn TaskSourceStore>,
}

impl<'a> TaskSourcePersistence<'a> {
    /// Full persistence: writes and removals.
    pub fn persist(store: &'a dyn TaskSourceStore) -> Self {
        Self {
            mode: PersistMode::Persist,
            store: Some(store),
        }
    }

    /// Writes reach the store, removals never do.
    pub fn persist_but_keep_orphans(store: &'a dyn TaskSourceStore) -> Self {
        Self {
            mode: PersistMode::KeepOrphans,
            store: Some(store),
        }
    }

    /// In-memory dry run; no store interaction at all.
    pub fn no_persist() -> Self {
        Self {
            mode: PersistMode::NoPersist,
            store: None,
        }
    }
}

/// Computes the actions needed to make the recorded sources of the
/// order's bound version match the in-memory tree.
pub fn synchronizations_needed(order: &Order) -> Vec<TaskSourceSynchronization> {
    let Some(info) = order.current_version_info() else {
        return Vec::new();
    };
    let version_id = info.version.id.clone();

    let mut result = Vec::new();
    let tree: Vec<&TaskSource> = order.tree_sources_bottom_up();

    for source in &tree {
        let recorded = order
            .recorded_sources_for(&version_id)
            .and_then(|map| map.get(&source.task_id));
        match recorded {
            Some(_) => result.push(TaskSourceSynchronization::Update((*source).clone())),
            None => result.push(TaskSourceSynchronization::Add((*source).clone())),
        }
    }

    if let Some(recorded) = order.recorded_sources_for(&version_id) {
        for source in recorded.values() {
            let still_in_tree = tree.iter().any(|s| s.task_id == source.task_id);
            if !still_in_tree {
                result.push(TaskSourceSynchronization::Remove(source.clone()));
            }
        }
    }

    result
}

/// Applies synchronization actions to the order's recorded snapshot
/// and, mode permitting, to the store.
pub fn apply(
    order: &mut Order,
    actions: Vec<TaskSourceSynchronization>,
    persistence: &TaskSourcePersistence<'_>,
) {
    let Some(info) = order.current_version_info() else {
        return;
    };
    let version_id = info.version.id.clone();
    debug!(
        order = %order.id,
        version = %version_id,
        actions = actions.len(),
        "applying task-source synchronizations"
    );

    for action in actions {
        match action {
            TaskSourceSynchronization::Add(source)
            | TaskSourceSynchronization::Update(source) => {
                if persistence.mode != PersistMode::NoPersist {
                    if let Some(store) = persistence.store {
                        store.persist(&source);
                    }
                }
                order.record_source(&version_id, source);
            }
            TaskSourceSynchronization::Remove(source) => {
                if persistence.mode == PersistMode::Persist {
                    if let Some(store) = persistence.store {
                        store.remove(&source.id);
                    }
                }
                order.unrecord_source(&version_id, &source.task_id);
            }
        }
    }
}
