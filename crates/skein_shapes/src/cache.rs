use std::collections::BTreeMap;

/// A cheap fingerprint of the environment state cached results depend on:
/// the replacement count and the divisibility-fact count. Comparing counts
/// instead of contents is sound only while both sets grow monotonically
/// over the environment's lifetime.
pub type Version = (usize, usize);

/// A memo table stamped with the [`Version`] it was filled under. Any
/// access under a different version discards the whole table first.
#[derive(Clone, Debug)]
pub struct VersionCache<K, V> {
    version: Version,
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V: Clone> VersionCache<K, V> {
    pub fn new() -> VersionCache<K, V> {
        VersionCache {
            version: (0, 0),
            entries: BTreeMap::new(),
        }
    }

    fn roll(&mut self, version: Version) {
        if self.version != version {
            self.version = version;
            self.entries.clear();
        }
    }

    pub fn get(&mut self, version: Version, key: &K) -> Option<V> {
        self.roll(version);
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, version: Version, key: K, value: V) {
        self.roll(version);
        self.entries.insert(key, value);
    }
}

impl<K: Ord, V: Clone> Default for VersionCache<K, V> {
    fn default() -> Self {
        VersionCache::new()
    }
}
