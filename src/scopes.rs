//! Scope lifecycle: the revision stack and the handle that closes it.

use crate::store::StoreInner;
use std::sync::Arc;

/// Revision bookkeeping for the stack of open scopes.
///
/// `revision` rises by one for every scope opened and falls by one when
/// a scope is undone or squashed into its parent. `commit_floor` is the
/// oldest revision still reachable by undo; it only rises, and only
/// through a commit or a bottommost squash. The number of open scopes is
/// always `revision - commit_floor`.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    pub(crate) revision: u64,
    pub(crate) commit_floor: u64,
}

impl ScopeStack {
    pub(crate) fn depth(&self) -> u64 {
        self.revision - self.commit_floor
    }
}

/// How a scope leaves the stack.
#[derive(Clone, Copy, Debug)]
pub(crate) enum CloseMode {
    Undo,
    Squash,
}

/// Single-use capability over one open scope.
///
/// Returned by [`Store::start_scope`]. Exactly one terminal action
/// consumes it: [`push`](Self::push), [`squash`](Self::squash), or
/// [`undo`](Self::undo). Dropping a handle that was never consumed
/// undoes its scope, so a failure partway through a mutation leaves no
/// partial trace once the handle unwinds.
///
/// [`Store::start_scope`]: crate::Store::start_scope
pub struct ScopeHandle {
    pub(crate) store: Arc<StoreInner>,
    pub(crate) revision: u64,
    pub(crate) armed: bool,
}

impl ScopeHandle {
    /// Revision of the scope this handle controls.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Leave the scope open but give up the obligation to close it.
    ///
    /// Whoever next references the revision closes the scope:
    /// [`Store::commit`] folds it permanently, [`Store::undo_all`] or
    /// [`Store::undo`] reverts it.
    ///
    /// [`Store::commit`]: crate::Store::commit
    /// [`Store::undo_all`]: crate::Store::undo_all
    /// [`Store::undo`]: crate::Store::undo
    pub fn push(mut self) {
        self.armed = false;
    }

    /// Fold the scope into its parent, or commit it permanently if it is
    /// the bottommost open scope.
    ///
    /// With `keep_alive`, a fresh empty scope opens at the vacated depth
    /// and the same handle comes back armed over it.
    ///
    /// # Panics
    ///
    /// Panics if the scope is not the topmost open one.
    pub fn squash(self, keep_alive: bool) -> Option<ScopeHandle> {
        self.close(CloseMode::Squash, keep_alive)
    }

    /// Revert every change made under the scope and close it.
    ///
    /// With `keep_alive`, a fresh empty scope opens in its place and the
    /// same handle comes back armed over it.
    ///
    /// # Panics
    ///
    /// Panics if the scope is not the topmost open one.
    pub fn undo(self, keep_alive: bool) -> Option<ScopeHandle> {
        self.close(CloseMode::Undo, keep_alive)
    }

    fn close(mut self, mode: CloseMode, keep_alive: bool) -> Option<ScopeHandle> {
        // Disarm before closing so the drop guard cannot fire twice if
        // the close panics.
        self.armed = false;
        self.store.close_topmost(self.revision, mode);
        if keep_alive {
            self.revision = self.store.open_scope();
            self.armed = true;
            Some(self)
        } else {
            None
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if self.armed {
            self.store.close_topmost(self.revision, CloseMode::Undo);
        }
    }
}
