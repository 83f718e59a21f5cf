//! Secondary orderings over a table's live records.

use crate::types::RecordId;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

/// Collects the secondary orderings a record type declares.
///
/// Passed to [`Stored::orderings`] when a table is registered.
///
/// [`Stored::orderings`]: crate::Stored::orderings
pub struct Schema<T> {
    pub(crate) indexes: Vec<Box<dyn AnyIndex<T>>>,
}

impl<T: 'static> Schema<T> {
    pub(crate) fn new() -> Self {
        Self {
            indexes: Vec::new(),
        }
    }

    /// Declare a unique ordering: no two live records may share a key.
    ///
    /// A record whose extractor returns `None` stays out of the ordering
    /// entirely.
    pub fn unique<K>(&mut self, name: &'static str, key: fn(&T) -> Option<K>)
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        self.indexes.push(Box::new(KeyIndex {
            name,
            unique: true,
            key,
            map: BTreeMap::new(),
        }));
    }

    /// Declare a non-unique ordering.
    pub fn ordered<K>(&mut self, name: &'static str, key: fn(&T) -> Option<K>)
    where
        K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    {
        self.indexes.push(Box::new(KeyIndex {
            name,
            unique: false,
            key,
            map: BTreeMap::new(),
        }));
    }
}

/// Type-erased interface the table uses to maintain one ordering.
pub(crate) trait AnyIndex<T>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Err(rendered key) if inserting `rec` under `id` would collide
    /// with a different record in a unique ordering.
    fn check(&self, id: RecordId, rec: &T) -> Result<(), String>;

    fn insert(&mut self, id: RecordId, rec: &T);

    /// Remove the entry `rec` derives for `id`. Removal is by id, so an
    /// entry another record now owns is left alone.
    fn remove(&mut self, id: RecordId, rec: &T);

    fn as_any(&self) -> &dyn Any;
}

/// One ordering: `(key, id)` entries kept sorted.
///
/// Unique orderings hold one id per key except transiently inside an
/// undo (see [`UndoLayer::undo`]); lookups resolve an aliased key to the
/// lowest id.
///
/// [`UndoLayer::undo`]: super::undo::UndoLayer::undo
pub(crate) struct KeyIndex<T, K: Ord> {
    pub(crate) name: &'static str,
    pub(crate) unique: bool,
    key: fn(&T) -> Option<K>,
    map: BTreeMap<K, Vec<RecordId>>,
}

impl<T, K> KeyIndex<T, K>
where
    K: Ord + Clone,
{
    /// Lowest id under `key`, if any.
    pub(crate) fn first(&self, key: &K) -> Option<RecordId> {
        self.map.get(key).and_then(|ids| ids.first().copied())
    }

    /// Next entry in `(key, id)` order after the given cursor.
    pub(crate) fn next_entry(&self, after: Option<(&K, RecordId)>) -> Option<(K, RecordId)> {
        let (key, id) = match after {
            None => {
                return self
                    .map
                    .iter()
                    .next()
                    .and_then(|(k, ids)| ids.first().map(|&id| (k.clone(), id)));
            }
            Some(cursor) => cursor,
        };

        if let Some(ids) = self.map.get(key) {
            if let Some(&next) = ids.iter().find(|&&e| e > id) {
                return Some((key.clone(), next));
            }
        }

        self.map
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .and_then(|(k, ids)| ids.first().map(|&id| (k.clone(), id)))
    }
}

impl<T, K> AnyIndex<T> for KeyIndex<T, K>
where
    T: 'static,
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, id: RecordId, rec: &T) -> Result<(), String> {
        if !self.unique {
            return Ok(());
        }
        match (self.key)(rec) {
            None => Ok(()),
            Some(key) => match self.map.get(&key) {
                Some(ids) if ids.iter().any(|&e| e != id) => Err(format!("{key:?}")),
                _ => Ok(()),
            },
        }
    }

    fn insert(&mut self, id: RecordId, rec: &T) {
        if let Some(key) = (self.key)(rec) {
            let ids = self.map.entry(key).or_default();
            if let Err(pos) = ids.binary_search(&id) {
                ids.insert(pos, id);
            }
        }
    }

    fn remove(&mut self, id: RecordId, rec: &T) {
        if let Some(key) = (self.key)(rec) {
            if let Some(ids) = self.map.get_mut(&key) {
                ids.retain(|&e| e != id);
                if ids.is_empty() {
                    self.map.remove(&key);
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
