//! Tables: indexed record collections with per-scope undo bookkeeping.

mod index;
mod undo;

pub use index::Schema;

pub(crate) use index::{AnyIndex, KeyIndex};
pub(crate) use undo::UndoLayer;

use crate::error::{Result, StoreError};
use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// A record type stored in a [`Table`].
pub trait Stored: Clone + Send + Sync + 'static {
    /// Table name used in errors and diagnostics.
    const TABLE: &'static str;

    /// Declare secondary orderings. The default declares none.
    fn orderings(_schema: &mut Schema<Self>) {}
}

/// Mutable state of one table: the live record set, its orderings, and
/// one undo layer per open scope (bottom = oldest).
pub(crate) struct TableState<T> {
    pub(crate) next_id: RecordId,
    pub(crate) live: BTreeMap<RecordId, T>,
    pub(crate) indexes: Vec<Box<dyn AnyIndex<T>>>,
    pub(crate) layers: VecDeque<UndoLayer<T>>,
}

impl<T: Clone> TableState<T> {
    /// Erase `id` from the live set and every ordering. Missing ids are
    /// left alone.
    pub(crate) fn erase_raw(&mut self, id: RecordId) {
        if let Some(rec) = self.live.remove(&id) {
            for idx in &mut self.indexes {
                idx.remove(id, &rec);
            }
        }
    }

    /// Insert without constraint checks. Used by undo, which restores a
    /// previously valid state.
    pub(crate) fn insert_raw(&mut self, id: RecordId, rec: T) {
        for idx in &mut self.indexes {
            idx.insert(id, &rec);
        }
        self.live.insert(id, rec);
    }

    /// Overwrite `id` with `rec`, re-keying every ordering.
    pub(crate) fn replace_raw(&mut self, id: RecordId, rec: T) {
        let prev = self.live.insert(id, rec.clone());
        for idx in &mut self.indexes {
            if let Some(prev) = &prev {
                idx.remove(id, prev);
            }
            idx.insert(id, &rec);
        }
    }
}

/// An ordered collection of records keyed by identity.
///
/// All methods take `&self`; an internal lock serializes access, so a
/// handle can be shared freely. The mutation API is non-reentrant: an
/// initializer or mutator must not call back into the same table.
///
/// Lookups return owned values. References never survive an undo, so
/// callers hold a [`RecordId`] and re-resolve after any scope-closing
/// call.
pub struct Table<T: Stored> {
    state: RwLock<TableState<T>>,
}

impl<T: Stored> Table<T> {
    pub(crate) fn new(open_layers: u64) -> Self {
        let mut schema = Schema::new();
        T::orderings(&mut schema);

        let mut state = TableState {
            next_id: RecordId(0),
            live: BTreeMap::new(),
            indexes: schema.indexes,
            layers: VecDeque::new(),
        };
        for _ in 0..open_layers {
            state.layers.push_back(UndoLayer::new(state.next_id));
        }

        Self {
            state: RwLock::new(state),
        }
    }

    // --- Mutation ---

    /// Create a record, assigning the next identity.
    ///
    /// The initializer receives the assigned id. On a uniqueness
    /// violation nothing is inserted and the identity is not consumed.
    pub fn create<F>(&self, init: F) -> Result<(RecordId, T)>
    where
        F: FnOnce(RecordId) -> T,
    {
        let mut state = self.state.write();
        let id = state.next_id;
        let rec = init(id);
        Self::check_constraints(&state, id, &rec)?;

        state.next_id = id.next();
        state.insert_raw(id, rec.clone());
        Ok((id, rec))
    }

    /// Apply a mutation to an existing record, returning the new value.
    ///
    /// The mutator runs against a copy. If the result violates a unique
    /// ordering the whole call fails, the record keeps its pre-call
    /// value, and no undo entry is produced.
    pub fn modify<F>(&self, id: RecordId, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write();
        let current = match state.live.get(&id) {
            Some(rec) => rec.clone(),
            None => {
                return Err(StoreError::RecordNotFound {
                    table: T::TABLE,
                    id,
                })
            }
        };

        let mut next = current.clone();
        mutate(&mut next);
        Self::check_constraints(&state, id, &next)?;

        if let Some(layer) = state.layers.back_mut() {
            layer.record_modify(id, &current);
        }
        state.replace_raw(id, next.clone());
        Ok(next)
    }

    /// Remove a record. The identity is never reassigned.
    pub fn remove(&self, id: RecordId) -> Result<()> {
        let mut state = self.state.write();
        let rec = match state.live.remove(&id) {
            Some(rec) => rec,
            None => {
                return Err(StoreError::RecordNotFound {
                    table: T::TABLE,
                    id,
                })
            }
        };

        let TableState {
            indexes, layers, ..
        } = &mut *state;
        for idx in indexes.iter_mut() {
            idx.remove(id, &rec);
        }
        if let Some(layer) = layers.back_mut() {
            layer.record_remove(id, rec);
        }
        Ok(())
    }

    // --- Lookup ---

    /// Look up a record by identity.
    pub fn find(&self, id: RecordId) -> Option<T> {
        self.state.read().live.get(&id).cloned()
    }

    /// Look up a record by identity, failing loudly on a miss.
    pub fn get(&self, id: RecordId) -> Result<T> {
        self.find(id).ok_or(StoreError::RecordNotFound {
            table: T::TABLE,
            id,
        })
    }

    /// Look up a record through a declared ordering.
    ///
    /// A missing key is `Ok(None)`; an unknown ordering name or a key of
    /// the wrong type is an error.
    pub fn find_by<K>(&self, ordering: &str, key: &K) -> Result<Option<(RecordId, T)>>
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        let state = self.state.read();
        let index = Self::key_index::<K>(&state, ordering)?;
        Ok(index
            .first(key)
            .and_then(|id| state.live.get(&id).map(|rec| (id, rec.clone()))))
    }

    /// Look up a record through a declared ordering, failing loudly on a
    /// missing key.
    pub fn get_by<K>(&self, ordering: &str, key: &K) -> Result<(RecordId, T)>
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        let state = self.state.read();
        let index = Self::key_index::<K>(&state, ordering)?;
        let name = index.name;
        index
            .first(key)
            .and_then(|id| state.live.get(&id).map(|rec| (id, rec.clone())))
            .ok_or_else(|| StoreError::KeyNotFound {
                table: T::TABLE,
                ordering: name,
                key: format!("{key:?}"),
            })
    }

    /// Next record in identity order after `after` (`None` starts from
    /// the beginning).
    ///
    /// Restartable: feed the last id seen back in to resume, regardless
    /// of mutations or scope closures in between.
    pub fn next_after(&self, after: Option<RecordId>) -> Option<(RecordId, T)> {
        let state = self.state.read();
        match after {
            Some(id) => state
                .live
                .range((Bound::Excluded(id), Bound::Unbounded))
                .next(),
            None => state.live.iter().next(),
        }
        .map(|(id, rec)| (*id, rec.clone()))
    }

    /// Next record in `(key, identity)` order for the given ordering.
    ///
    /// The returned key and id form the cursor for the following call.
    pub fn next_by_after<K>(
        &self,
        ordering: &str,
        after: Option<(&K, RecordId)>,
    ) -> Result<Option<(K, RecordId, T)>>
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        let state = self.state.read();
        let index = Self::key_index::<K>(&state, ordering)?;
        Ok(index.next_entry(after).and_then(|(key, id)| {
            state.live.get(&id).map(|rec| (key, id, rec.clone()))
        }))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.state.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().live.is_empty()
    }

    /// The identity the next `create` will assign.
    pub fn next_id(&self) -> RecordId {
        self.state.read().next_id
    }

    // --- Scope plumbing (driven by the store) ---

    pub(crate) fn open_layer(&self) {
        let mut state = self.state.write();
        let first_new_id = state.next_id;
        state.layers.push_back(UndoLayer::new(first_new_id));
    }

    pub(crate) fn undo_topmost(&self) {
        let mut state = self.state.write();
        let layer = state
            .layers
            .pop_back()
            .expect("table layers out of step with the scope stack");
        layer.undo(&mut state);
    }

    pub(crate) fn squash_topmost(&self) {
        let mut state = self.state.write();
        let child = state
            .layers
            .pop_back()
            .expect("table layers out of step with the scope stack");
        let parent = state
            .layers
            .back_mut()
            .expect("squash requires a parent layer");
        child.squash_into(parent);
    }

    pub(crate) fn commit_bottom(&self) {
        let mut state = self.state.write();
        state
            .layers
            .pop_front()
            .expect("table layers out of step with the scope stack");
    }

    // --- Internal ---

    fn check_constraints(state: &TableState<T>, id: RecordId, rec: &T) -> Result<()> {
        for idx in &state.indexes {
            if let Err(key) = idx.check(id, rec) {
                return Err(StoreError::UniqueViolation {
                    table: T::TABLE,
                    ordering: idx.name(),
                    key,
                });
            }
        }
        Ok(())
    }

    fn key_index<'a, K>(state: &'a TableState<T>, ordering: &str) -> Result<&'a KeyIndex<T, K>>
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        let index = state
            .indexes
            .iter()
            .find(|idx| idx.name() == ordering)
            .ok_or_else(|| StoreError::UnknownOrdering {
                table: T::TABLE,
                ordering: ordering.to_string(),
            })?;
        let name = index.name();
        index
            .as_any()
            .downcast_ref::<KeyIndex<T, K>>()
            .ok_or(StoreError::OrderingTypeMismatch {
                table: T::TABLE,
                ordering: name,
            })
    }
}

/// Shared, cloneable reference to a registered [`Table`].
pub struct TableHandle<T: Stored> {
    pub(crate) table: Arc<Table<T>>,
}

impl<T: Stored> Clone for TableHandle<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Stored> std::ops::Deref for TableHandle<T> {
    type Target = Table<T>;

    fn deref(&self) -> &Table<T> {
        &self.table
    }
}
