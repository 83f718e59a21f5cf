//! Per-scope undo bookkeeping for one table.

use super::TableState;
use crate::types::RecordId;
use std::collections::BTreeMap;

/// What must be reverted to return a table to its pre-scope state.
///
/// One layer exists per table per open scope. Every create, modify, and
/// remove issued while the scope is topmost records into it; the layer
/// is consumed by [`undo`](Self::undo), folded by
/// [`squash_into`](Self::squash_into), or discarded on commit.
#[derive(Debug)]
pub(crate) struct UndoLayer<T> {
    /// The table's `next_id` when the scope opened. Every id at or above
    /// this was created inside the scope.
    pub(crate) first_new_id: RecordId,

    /// Pre-scope snapshots of records modified during the scope.
    /// First modification wins.
    pub(crate) old_values: BTreeMap<RecordId, T>,

    /// Pre-scope snapshots of records removed during the scope.
    pub(crate) removed_values: BTreeMap<RecordId, T>,
}

impl<T: Clone> UndoLayer<T> {
    pub(crate) fn new(first_new_id: RecordId) -> Self {
        Self {
            first_new_id,
            old_values: BTreeMap::new(),
            removed_values: BTreeMap::new(),
        }
    }

    /// Record that the pre-existing record `id`, currently holding
    /// `current`, is about to be overwritten.
    pub(crate) fn record_modify(&mut self, id: RecordId, current: &T) {
        if id >= self.first_new_id || self.old_values.contains_key(&id) {
            return;
        }
        self.old_values.insert(id, current.clone());
    }

    /// Record that `id` has been erased; `current` is the value it held.
    ///
    /// If the record was already modified under this layer, the original
    /// pre-scope snapshot is what must ultimately be restored, not the
    /// just-prior-to-removal value.
    pub(crate) fn record_remove(&mut self, id: RecordId, current: T) {
        if id >= self.first_new_id {
            // Created inside the scope: erasing it leaves nothing to
            // remember, and the id stays retired.
            return;
        }
        let snapshot = self.old_values.remove(&id).unwrap_or(current);
        self.removed_values.insert(id, snapshot);
    }

    /// Revert every effect the layer recorded.
    ///
    /// Speculative creations are erased first, then removed records are
    /// re-inserted, then modified records are overwritten with their
    /// snapshots, and finally the id counter is wound back. Restoring
    /// removed values before modified ones avoids transient unique-key
    /// collisions in the common case; a cyclic swap of unique keys
    /// folded across a squash boundary can still alias a key mid-undo.
    /// That window is invisible outside the table lock and entries
    /// resolve by id, but lookups made through such a key prefer the
    /// lowest id. This ordering is a known, accepted limitation; do not
    /// reorder the phases.
    pub(crate) fn undo(self, state: &mut TableState<T>) {
        let created: Vec<RecordId> = state
            .live
            .range(self.first_new_id..)
            .map(|(id, _)| *id)
            .collect();
        for id in created {
            state.erase_raw(id);
        }

        for (id, snapshot) in self.removed_values {
            state.insert_raw(id, snapshot);
        }

        for (id, snapshot) in self.old_values {
            state.replace_raw(id, snapshot);
        }

        state.next_id = self.first_new_id;
    }

    /// Fold this layer into the next-older `parent` so that undoing the
    /// parent afterward is equivalent to undoing both layers in order.
    ///
    /// Ids at or above the parent's `first_new_id` fold to nothing: the
    /// parent's new-id range already owns them, whether they are still
    /// live (absorbed as the parent's own creations) or already erased
    /// (permanently retired).
    pub(crate) fn squash_into(self, parent: &mut UndoLayer<T>) {
        for (id, snapshot) in self.old_values {
            if id >= parent.first_new_id || parent.old_values.contains_key(&id) {
                // The parent's earlier snapshot is the truer one.
                continue;
            }
            parent.old_values.insert(id, snapshot);
        }

        for (id, snapshot) in self.removed_values {
            if id >= parent.first_new_id {
                continue;
            }
            match parent.old_values.remove(&id) {
                Some(original) => {
                    parent.removed_values.insert(id, original);
                }
                None => {
                    parent.removed_values.insert(id, snapshot);
                }
            }
        }
    }
}
