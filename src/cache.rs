//! Struct interning by canonical key.

use crate::types::Struct;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Fields are being resolved; references may point here already.
    InProgress,
    Resolved(Struct),
}

/// Insertion-ordered struct cache.
///
/// A failed resolution truncates back to the point where its marker was
/// installed, so every remaining entry only refers to entries before it or
/// to itself.
#[derive(Debug, Clone, Default)]
pub struct StructCache {
    slots: IndexMap<String, Slot>,
}

/// Length of the cache at some point, for [`StructCache::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl StructCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    pub fn get(&self, key: &str) -> Option<&Struct> {
        match self.slots.get(key)? {
            Slot::Resolved(s) => Some(s),
            Slot::InProgress => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Installs the in-progress marker for `key`.
    pub fn begin(&mut self, key: &str) -> Checkpoint {
        let cp = self.checkpoint();
        self.slots.insert(key.to_owned(), Slot::InProgress);
        cp
    }

    /// Replaces the marker with the finished struct.
    pub fn finish(&mut self, key: &str, value: Struct) {
        if let Some(slot) = self.slots.get_mut(key) {
            *slot = Slot::Resolved(value);
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.slots.len())
    }

    /// Drops every entry added since `cp`.
    pub fn rollback(&mut self, cp: Checkpoint) {
        self.slots.truncate(cp.0);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Finished structs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Struct)> {
        self.slots.iter().filter_map(|(k, s)| match s {
            Slot::Resolved(s) => Some((k.as_str(), s)),
            Slot::InProgress => None,
        })
    }
}
