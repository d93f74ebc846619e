use crate::core::favourites::FavouriteRecord;
use std::collections::HashMap;

/// Favourites of the signed in identity, keyed by place key.
/// Only the sync controller mutates it.
#[derive(Debug, Default)]
pub struct FavouriteCache {
    entries: HashMap<String, FavouriteRecord>,
}

impl FavouriteCache {
    pub fn set(&mut self, key: impl Into<String>, record: FavouriteRecord) -> Option<FavouriteRecord> {
        self.entries.insert(key.into(), record)
    }

    pub fn delete(&mut self, key: &str) -> Option<FavouriteRecord> {
        self.entries.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FavouriteRecord> {
        self.entries.get(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces everything with a fresh snapshot
    pub fn replace(&mut self, records: impl IntoIterator<Item = FavouriteRecord>) {
        self.entries.clear();
        for record in records {
            self.entries.insert(record.key.clone(), record);
        }
    }

    /// All records, newest first
    pub fn values(&self) -> Vec<FavouriteRecord> {
        let mut values: Vec<FavouriteRecord> = self.entries.values().cloned().collect();
        values.sort_by(FavouriteRecord::newest_first);
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str) -> FavouriteRecord {
        FavouriteRecord {
            key: key.into(),
            name: key.to_uppercase(),
            address: String::new(),
            coordinates: None,
            server_created_at: None,
            client_created_at: None,
        }
    }

    #[test]
    fn test_set_has_delete() {
        let mut cache = FavouriteCache::default();
        assert!(!cache.has("a"));

        assert!(cache.set("a", record("a")).is_none());
        assert!(cache.has("a"));
        assert!(cache.set("a", record("a")).is_some());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.delete("a"), Some(record("a")));
        assert!(cache.delete("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_drops_previous_entries() {
        let mut cache = FavouriteCache::default();
        cache.set("stale", record("stale"));

        cache.replace(vec![record("a"), record("b")]);

        assert!(!cache.has("stale"));
        let keys: Vec<String> = cache.values().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
