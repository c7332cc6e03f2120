//! Reference-counted store of distinct values
//!
//! Every data record in the tree refers to its value by content key. The
//! store holds one copy per key and counts the records that reference it,
//! so a value disappears as soon as the last record holding it is
//! overwritten or merged away.

use crate::data_section::{ContentKey, DataValue};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct Entry {
    value: DataValue,
    refs: u32,
}

/// Content-addressed value store
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    entries: FxHashMap<ContentKey, Entry>,
}

impl DedupStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` and take one reference to it
    pub fn store(&mut self, key: ContentKey, value: DataValue) {
        self.entries
            .entry(key)
            .and_modify(|e| e.refs += 1)
            .or_insert(Entry { value, refs: 1 });
    }

    /// Take an extra reference to an already stored key
    pub fn retain(&mut self, key: ContentKey) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.refs += 1;
        }
    }

    /// Drop one reference, removing the value when none remain
    pub fn release(&mut self, key: ContentKey) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                self.entries.remove(&key);
            }
        }
    }

    /// Stored value for a key
    pub fn get(&self, key: ContentKey) -> Option<&DataValue> {
        self.entries.get(&key).map(|e| &e.value)
    }

    /// Number of live references to a key
    pub fn refs(&self, key: ContentKey) -> u32 {
        self.entries.get(&key).map_or(0, |e| e.refs)
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no values are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_counts_references() {
        let mut store = DedupStore::new();
        let value = DataValue::from("shared");
        let key = value.content_key().unwrap();

        store.store(key, value.clone());
        store.store(key, value.clone());
        store.retain(key);
        assert_eq!(store.len(), 1);
        assert_eq!(store.refs(key), 3);

        store.release(key);
        store.release(key);
        assert_eq!(store.get(key), Some(&value));

        store.release(key);
        assert!(store.is_empty());
        assert_eq!(store.refs(key), 0);
    }

    #[test]
    fn test_release_unknown_key_is_ignored() {
        let mut store = DedupStore::new();
        store.release(42);
        store.retain(42);
        assert!(store.is_empty());
    }
}
