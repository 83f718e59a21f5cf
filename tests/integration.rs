//! Integration tests for the versioned store.

use revstore::{RecordId, Schema, Store, Stored, TableHandle};
use serde_json::json;

#[derive(Clone, Debug, PartialEq)]
struct Account {
    name: String,
    balance: u64,
}

impl Stored for Account {
    const TABLE: &'static str = "accounts";

    fn orderings(schema: &mut Schema<Self>) {
        schema.unique("name", |a| Some(a.name.clone()));
        schema.ordered("balance", |a| Some(a.balance));
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Grant {
    owner: String,
    amount: u64,
}

impl Stored for Grant {
    const TABLE: &'static str = "grants";
}

fn account(name: &str, balance: u64) -> Account {
    Account {
        name: name.into(),
        balance,
    }
}

fn test_store() -> (Store, TableHandle<Account>) {
    let store = Store::new();
    let accounts = store.register_table::<Account>().unwrap();
    (store, accounts)
}

fn dump(accounts: &TableHandle<Account>) -> Vec<(RecordId, Account)> {
    let mut out = Vec::new();
    let mut cursor = None;
    while let Some((id, rec)) = accounts.next_after(cursor) {
        cursor = Some(id);
        out.push((id, rec));
    }
    out
}

// --- Scope Lifecycle ---

#[test]
fn test_bottom_squash_is_permanent() {
    let (store, accounts) = test_store();

    let scope = store.start_scope();
    assert_eq!(store.revision(), 1);

    let (id, _) = accounts.create(|_| account("a", 1)).unwrap();
    accounts.modify(id, |a| a.balance = 2).unwrap();
    scope.squash(false);

    assert_eq!(accounts.get(id).unwrap().balance, 2);
    assert_eq!(store.commit_floor(), 1);
    assert_eq!(store.revision(), 1);

    // Nothing left to undo.
    store.undo_all();
    assert_eq!(accounts.get(id).unwrap().balance, 2);
    assert_eq!(store.revision(), 1);
}

#[test]
fn test_nested_undo_restores_pre_nested_state() {
    let (store, accounts) = test_store();

    let outer = store.start_scope();
    let (id, _) = accounts.create(|_| account("b", 7)).unwrap();
    let next_id_before = accounts.next_id();

    let inner = store.start_scope();
    accounts.modify(id, |a| a.balance = 99).unwrap();
    accounts.remove(id).unwrap();
    assert!(accounts.find(id).is_none());

    inner.undo(false);

    // The record reappears exactly as the outer scope left it.
    assert_eq!(accounts.get(id).unwrap(), account("b", 7));
    assert_eq!(accounts.next_id(), next_id_before);

    outer.undo(false);
    assert!(accounts.is_empty());
}

#[test]
fn test_undo_frees_unique_key() {
    let (store, accounts) = test_store();

    let scope = store.start_scope();
    accounts.create(|_| account("k", 1)).unwrap();
    scope.undo(false);

    let retry = store.start_scope();
    let (id, _) = accounts.create(|_| account("k", 2)).unwrap();
    assert_eq!(accounts.get(id).unwrap().balance, 2);
    retry.squash(false);
}

#[test]
fn test_squash_then_undo_restores_pre_outer_value() {
    let (store, accounts) = test_store();

    let (id, _) = accounts.create(|_| account("x", 1)).unwrap();

    let outer = store.start_scope();
    accounts.modify(id, |a| a.balance = 2).unwrap();

    let inner = store.start_scope();
    accounts.modify(id, |a| a.balance = 3).unwrap();
    inner.squash(false);

    assert_eq!(accounts.get(id).unwrap().balance, 3);

    outer.undo(false);
    // Restored to the value from before the outer scope opened, not its
    // outer-scope-time value.
    assert_eq!(accounts.get(id).unwrap().balance, 1);
}

#[test]
fn test_lifo_closure_restores_everything() {
    let (store, accounts) = test_store();
    let before = dump(&accounts);

    let s1 = store.start_scope();
    accounts.create(|_| account("a", 1)).unwrap();
    let s2 = store.start_scope();
    accounts.create(|_| account("b", 2)).unwrap();
    let s3 = store.start_scope();
    accounts.create(|_| account("c", 3)).unwrap();
    let s4 = store.start_scope();
    accounts.create(|_| account("d", 4)).unwrap();
    assert_eq!(store.revision(), 4);

    // Mixed closures, always topmost-first.
    s4.squash(false);
    s3.undo(false);
    s2.squash(false);
    s1.undo(false);

    assert_eq!(store.revision(), 0);
    assert_eq!(dump(&accounts), before);
    assert_eq!(accounts.next_id(), RecordId(0));
}

#[test]
fn test_create_remove_in_same_scope_leaves_no_trace() {
    let (store, accounts) = test_store();

    let outer = store.start_scope();
    let inner = store.start_scope();
    let (id, _) = accounts.create(|_| account("gone", 1)).unwrap();
    accounts.remove(id).unwrap();
    inner.squash(false);

    assert!(accounts.find(id).is_none());
    // The id is retired, not reassigned.
    let (next, _) = accounts.create(|_| account("next", 2)).unwrap();
    assert_eq!(next, id.next());

    outer.undo(false);
    assert!(accounts.is_empty());
    assert_eq!(accounts.next_id(), RecordId(0));
}

#[test]
fn test_drop_undoes_open_scope() {
    let (store, accounts) = test_store();
    let (id, _) = accounts.create(|_| account("base", 1)).unwrap();

    {
        let _scope = store.start_scope();
        accounts.modify(id, |a| a.balance = 100).unwrap();
        accounts.create(|_| account("temp", 2)).unwrap();
        // Dropped without push/squash/undo: behaves as undo.
    }

    assert_eq!(store.revision(), 0);
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts.get(id).unwrap().balance, 1);
}

// --- Commit ---

#[test]
fn test_commit_floor_monotonicity() {
    let (store, accounts) = test_store();

    for i in 0..3u64 {
        let scope = store.start_scope();
        accounts
            .create(|_| account(&format!("r{i}"), i))
            .unwrap();
        scope.push();
    }
    assert_eq!(store.revision(), 3);

    store.commit(2);
    assert_eq!(store.commit_floor(), 2);
    assert_eq!(store.revision(), 3);

    // Undo stops at the floor: the third scope reverts, the first two
    // are permanent.
    store.undo_all();
    assert_eq!(store.revision(), 2);
    assert_eq!(accounts.len(), 2);
    assert!(accounts
        .find_by("name", &"r2".to_string())
        .unwrap()
        .is_none());

    store.undo_all();
    assert_eq!(store.revision(), 2);
}

#[test]
fn test_commit_to_floor_is_noop() {
    let (store, accounts) = test_store();

    let scope = store.start_scope();
    accounts.create(|_| account("a", 1)).unwrap();
    scope.push();

    store.commit(store.commit_floor());
    assert_eq!(store.commit_floor(), 0);
    assert_eq!(store.depth(), 1);

    assert!(store.undo());
    assert!(accounts.is_empty());
}

#[test]
fn test_push_transfers_closing_to_commit() {
    let (store, accounts) = test_store();

    let scope = store.start_scope();
    accounts.create(|_| account("kept", 1)).unwrap();
    let revision = scope.revision();
    scope.push();

    // Still open; the push only disarmed the handle.
    assert_eq!(store.depth(), 1);

    store.commit(revision);
    assert_eq!(store.commit_floor(), revision);
    store.undo_all();
    assert!(accounts
        .find_by("name", &"kept".to_string())
        .unwrap()
        .is_some());
}

#[test]
fn test_store_undo_closes_pushed_scope() {
    let (store, accounts) = test_store();

    let scope = store.start_scope();
    accounts.create(|_| account("pending", 1)).unwrap();
    scope.push();

    assert!(store.undo());
    assert!(accounts.is_empty());
    assert!(!store.undo());
}

// --- Keep-Alive ---

#[test]
fn test_keep_alive_squash_loop() {
    let (store, accounts) = test_store();

    let mut scope = store.start_scope();
    for i in 0..5u64 {
        accounts
            .create(|_| account(&format!("tx{i}"), i))
            .unwrap();
        scope = scope.squash(true).unwrap();
    }

    // Each bottom squash committed permanently and reopened a scope at
    // the vacated depth.
    assert_eq!(accounts.len(), 5);
    assert_eq!(store.commit_floor(), 5);
    assert_eq!(store.revision(), 6);
    assert_eq!(store.depth(), 1);

    scope.undo(false);
    assert_eq!(accounts.len(), 5);
}

#[test]
fn test_keep_alive_undo_loop() {
    let (store, accounts) = test_store();
    let (id, _) = accounts.create(|_| account("base", 0)).unwrap();

    let mut scope = store.start_scope();
    for i in 1..4u64 {
        accounts.modify(id, |a| a.balance = i).unwrap();
        scope = scope.undo(true).unwrap();
        assert_eq!(accounts.get(id).unwrap().balance, 0);
    }
    assert_eq!(store.depth(), 1);
    scope.undo(false);
    assert_eq!(store.depth(), 0);
}

// --- Tables ---

#[test]
fn test_multiple_tables_one_scope() {
    let store = Store::new();
    let accounts = store.register_table::<Account>().unwrap();
    let grants = store.register_table::<Grant>().unwrap();

    let scope = store.start_scope();
    accounts.create(|_| account("a", 1)).unwrap();
    grants
        .create(|_| Grant {
            owner: "a".into(),
            amount: 10,
        })
        .unwrap();
    scope.undo(false);

    assert!(accounts.is_empty());
    assert!(grants.is_empty());
}

#[test]
fn test_register_table_inside_open_scope() {
    let store = Store::new();
    let scope = store.start_scope();

    let accounts = store.register_table::<Account>().unwrap();
    accounts.create(|_| account("a", 1)).unwrap();

    scope.undo(false);
    assert!(accounts.is_empty());
    assert_eq!(accounts.next_id(), RecordId(0));
}

#[test]
fn test_table_lookup_by_type() {
    let store = Store::new();
    store.register_table::<Account>().unwrap();

    let accounts = store.table::<Account>().unwrap();
    accounts.create(|_| account("a", 1)).unwrap();
    assert_eq!(store.table::<Account>().unwrap().len(), 1);
}

#[test]
fn test_mutations_without_scope_are_permanent() {
    let (store, accounts) = test_store();

    let (id, _) = accounts.create(|_| account("a", 1)).unwrap();
    accounts.modify(id, |a| a.balance = 2).unwrap();

    store.undo_all();
    assert_eq!(accounts.get(id).unwrap().balance, 2);
}

#[test]
fn test_stats() {
    let store = Store::new();
    let accounts = store.register_table::<Account>().unwrap();
    let grants = store.register_table::<Grant>().unwrap();

    accounts.create(|_| account("a", 1)).unwrap();
    grants
        .create(|_| Grant {
            owner: "a".into(),
            amount: 10,
        })
        .unwrap();
    let scope = store.start_scope();
    accounts.create(|_| account("b", 2)).unwrap();

    let stats = store.stats();
    assert_eq!(stats.table_count, 2);
    assert_eq!(stats.record_count, 3);
    assert_eq!(stats.revision, 1);
    assert_eq!(stats.commit_floor, 0);
    assert_eq!(stats.open_scopes, 1);

    scope.undo(false);
    assert_eq!(store.stats().record_count, 2);
}

// --- Orderings ---

#[test]
fn test_json_payload_round_trip() {
    #[derive(Clone, Debug, PartialEq)]
    struct Document {
        body: serde_json::Value,
    }

    impl Stored for Document {
        const TABLE: &'static str = "documents";
    }

    let store = Store::new();
    let docs = store.register_table::<Document>().unwrap();
    let (id, _) = docs
        .create(|_| Document {
            body: json!({"height": 1, "txs": []}),
        })
        .unwrap();

    let scope = store.start_scope();
    docs.modify(id, |d| d.body["height"] = json!(2)).unwrap();
    assert_eq!(docs.get(id).unwrap().body["height"], json!(2));
    scope.undo(false);

    assert_eq!(docs.get(id).unwrap().body["height"], json!(1));
}

#[test]
fn test_non_unique_ordering_iteration() {
    let (_store, accounts) = test_store();
    accounts.create(|_| account("a", 5)).unwrap();
    accounts.create(|_| account("b", 5)).unwrap();
    accounts.create(|_| account("c", 1)).unwrap();

    let mut balances = Vec::new();
    let mut cursor: Option<(u64, RecordId)> = None;
    while let Some((key, id, _)) = accounts
        .next_by_after("balance", cursor.as_ref().map(|(k, id)| (k, *id)))
        .unwrap()
    {
        balances.push(key);
        cursor = Some((key, id));
    }
    assert_eq!(balances, vec![1, 5, 5]);
}
