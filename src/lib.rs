//! # Versioned Record Store
//!
//! An in-memory store of indexed record sets that can be mutated
//! speculatively, then committed permanently or rolled back exactly,
//! with arbitrarily deep nesting of speculative scopes.
//!
//! ## Core Concepts
//!
//! - **Records**: versioned entities with permanent, never-reused ids
//! - **Tables**: ordered record sets with declared secondary orderings
//! - **Scopes**: nested levels of speculative mutation, closed LIFO
//! - **Handles**: single-use capabilities that undo their scope on drop
//!
//! ## Example
//!
//! ```ignore
//! use revstore::{Schema, Store, Stored};
//!
//! #[derive(Clone)]
//! struct Account {
//!     name: String,
//!     balance: u64,
//! }
//!
//! impl Stored for Account {
//!     const TABLE: &'static str = "accounts";
//!
//!     fn orderings(schema: &mut Schema<Self>) {
//!         schema.unique("name", |a| Some(a.name.clone()));
//!     }
//! }
//!
//! let store = Store::new();
//! let accounts = store.register_table::<Account>()?;
//!
//! let scope = store.start_scope();
//! let (id, _) = accounts.create(|_| Account { name: "alice".into(), balance: 10 })?;
//! accounts.modify(id, |a| a.balance += 5)?;
//! scope.squash(false); // keep the changes
//! ```

pub mod error;
pub mod scopes;
pub mod store;
pub mod table;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use scopes::ScopeHandle;
pub use store::Store;
pub use table::{Schema, Stored, Table, TableHandle};
pub use types::{RecordId, StoreStats};
