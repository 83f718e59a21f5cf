//! The store: a context object owning every table plus the scope stack.

use crate::error::{Result, StoreError};
use crate::scopes::{CloseMode, ScopeHandle, ScopeStack};
use crate::table::{Stored, Table, TableHandle};
use crate::types::StoreStats;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::debug;

/// Type-erased interface the store uses to drive one table's undo
/// layers in step with the scope stack.
pub(crate) trait AnyTable: Send + Sync {
    fn push_layer(&self);
    fn undo_layer(&self);
    fn squash_layer(&self);
    fn drop_bottom_layer(&self);
    fn live_records(&self) -> usize;
}

impl<T: Stored> AnyTable for Table<T> {
    fn push_layer(&self) {
        self.open_layer();
    }

    fn undo_layer(&self) {
        self.undo_topmost();
    }

    fn squash_layer(&self) {
        self.squash_topmost();
    }

    fn drop_bottom_layer(&self) {
        self.commit_bottom();
    }

    fn live_records(&self) -> usize {
        self.len()
    }
}

struct Registered {
    type_id: TypeId,
    erased: Arc<dyn AnyTable>,
    /// A `TableHandle<T>` behind `Any`, recovered by [`Store::table`].
    typed: Box<dyn Any + Send + Sync>,
}

/// Shared interior of a [`Store`], also held by every [`ScopeHandle`].
///
/// Lock order is fixed: scope bookkeeping, then the table registry,
/// then individual tables.
pub(crate) struct StoreInner {
    tables: RwLock<Vec<Registered>>,
    scopes: Mutex<ScopeStack>,
}

impl StoreInner {
    pub(crate) fn open_scope(&self) -> u64 {
        let mut scopes = self.scopes.lock();
        let tables = self.tables.read();
        scopes.revision += 1;
        for entry in tables.iter() {
            entry.erased.push_layer();
        }
        debug!(revision = scopes.revision, "scope opened");
        scopes.revision
    }

    pub(crate) fn close_topmost(&self, revision: u64, mode: CloseMode) {
        let mut scopes = self.scopes.lock();
        assert_eq!(
            revision, scopes.revision,
            "scope at revision {revision} is not the topmost open scope (top is {})",
            scopes.revision
        );
        assert!(
            scopes.depth() > 0,
            "scope at revision {revision} was already committed"
        );

        let tables = self.tables.read();
        match mode {
            CloseMode::Undo => {
                for entry in tables.iter() {
                    entry.erased.undo_layer();
                }
                scopes.revision -= 1;
                debug!(revision = scopes.revision, "scope undone");
            }
            CloseMode::Squash => {
                if scopes.depth() == 1 {
                    // No parent layer: the fold is a permanent commit.
                    for entry in tables.iter() {
                        entry.erased.drop_bottom_layer();
                    }
                    scopes.commit_floor = scopes.revision;
                    debug!(revision = scopes.revision, "bottom scope committed");
                } else {
                    for entry in tables.iter() {
                        entry.erased.squash_layer();
                    }
                    scopes.revision -= 1;
                    debug!(revision = scopes.revision, "scope squashed");
                }
            }
        }
    }

    pub(crate) fn commit(&self, target: u64) {
        let mut scopes = self.scopes.lock();
        assert!(
            scopes.commit_floor <= target && target <= scopes.revision,
            "commit target {target} outside {}..={}",
            scopes.commit_floor,
            scopes.revision
        );

        let tables = self.tables.read();
        while scopes.commit_floor < target {
            for entry in tables.iter() {
                entry.erased.drop_bottom_layer();
            }
            scopes.commit_floor += 1;
        }
        debug!(commit_floor = scopes.commit_floor, "committed");
    }

    pub(crate) fn undo_all(&self) {
        let mut scopes = self.scopes.lock();
        let tables = self.tables.read();
        while scopes.depth() > 0 {
            for entry in tables.iter() {
                entry.erased.undo_layer();
            }
            scopes.revision -= 1;
        }
        debug!(revision = scopes.revision, "undid all open scopes");
    }

    pub(crate) fn undo_topmost(&self) -> bool {
        let mut scopes = self.scopes.lock();
        if scopes.depth() == 0 {
            return false;
        }
        let tables = self.tables.read();
        for entry in tables.iter() {
            entry.erased.undo_layer();
        }
        scopes.revision -= 1;
        debug!(revision = scopes.revision, "scope undone");
        true
    }
}

/// The versioned store.
///
/// Owns every registered table plus the scope stack, so the single-
/// writer discipline is a property of one object rather than ambient
/// state. Cloning shares the same store.
///
/// ## Scope protocol
///
/// [`start_scope`](Self::start_scope) opens a speculative scope and
/// returns the one handle that may close it. Scopes close strictly
/// LIFO; the handle's drop reverts the scope, so speculative work is
/// exception-safe by default. [`commit`](Self::commit) makes the oldest
/// open scopes permanent and raises the commit floor, the oldest
/// revision undo can ever reach again.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(Vec::new()),
                scopes: Mutex::new(ScopeStack::default()),
            }),
        }
    }

    // --- Tables ---

    /// Register the table for `T`.
    ///
    /// A table registered while scopes are open receives one empty undo
    /// layer per open scope, so closing them stays uniform across
    /// tables.
    pub fn register_table<T: Stored>(&self) -> Result<TableHandle<T>> {
        let scopes = self.inner.scopes.lock();
        let mut tables = self.inner.tables.write();
        if tables.iter().any(|entry| entry.type_id == TypeId::of::<T>()) {
            return Err(StoreError::TableExists(T::TABLE));
        }

        let table = Arc::new(Table::<T>::new(scopes.depth()));
        tables.push(Registered {
            type_id: TypeId::of::<T>(),
            erased: table.clone(),
            typed: Box::new(TableHandle {
                table: Arc::clone(&table),
            }),
        });
        debug!(table = T::TABLE, "table registered");
        Ok(TableHandle { table })
    }

    /// Fetch the handle for a previously registered table.
    pub fn table<T: Stored>(&self) -> Result<TableHandle<T>> {
        let tables = self.inner.tables.read();
        tables
            .iter()
            .find(|entry| entry.type_id == TypeId::of::<T>())
            .and_then(|entry| entry.typed.downcast_ref::<TableHandle<T>>())
            .cloned()
            .ok_or(StoreError::TableNotRegistered(T::TABLE))
    }

    // --- Scopes ---

    /// Open a new speculative scope and return the handle that closes
    /// it.
    pub fn start_scope(&self) -> ScopeHandle {
        let revision = self.inner.open_scope();
        ScopeHandle {
            store: Arc::clone(&self.inner),
            revision,
            armed: true,
        }
    }

    /// Revision of the most recently opened scope.
    pub fn revision(&self) -> u64 {
        self.inner.scopes.lock().revision
    }

    /// Oldest revision still reachable by undo.
    pub fn commit_floor(&self) -> u64 {
        self.inner.scopes.lock().commit_floor
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> u64 {
        self.inner.scopes.lock().depth()
    }

    /// Permanently fold every open scope with revision at or below
    /// `target`, oldest first, raising the commit floor to `target`.
    ///
    /// Scopes above `target` stay open and untouched. A `target` equal
    /// to the commit floor is a no-op.
    ///
    /// # Panics
    ///
    /// Panics unless `commit_floor <= target <= revision`.
    pub fn commit(&self, target: u64) {
        self.inner.commit(target);
    }

    /// Undo every open scope, stopping at the commit floor.
    pub fn undo_all(&self) {
        self.inner.undo_all();
    }

    /// Undo the single topmost open scope.
    ///
    /// Returns false when nothing is open. This is the closing path for
    /// scopes whose handles were pushed.
    pub fn undo(&self) -> bool {
        self.inner.undo_topmost()
    }

    /// Snapshot of store-wide counters.
    pub fn stats(&self) -> StoreStats {
        let scopes = self.inner.scopes.lock();
        let tables = self.inner.tables.read();
        StoreStats {
            table_count: tables.len(),
            record_count: tables
                .iter()
                .map(|entry| entry.erased.live_records() as u64)
                .sum(),
            revision: scopes.revision,
            commit_floor: scopes.commit_floor,
            open_scopes: scopes.depth(),
        }
    }
}
