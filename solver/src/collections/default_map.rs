use std::hash::Hash;

use hashbrown::HashMap;

/// A map with a fallback value: lookups of keys without an explicit entry
/// yield the default instead of failing.
#[derive(Clone, Debug)]
pub struct DefaultMap<K, V> {
    entries: HashMap<K, V>,
    default: V,
}

impl<K: Eq + Hash, V: Clone> DefaultMap<K, V> {
    pub fn new(default: V) -> Self {
        DefaultMap {
            entries: HashMap::new(),
            default,
        }
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (K, V)>, default: V) -> Self {
        DefaultMap {
            entries: entries.into_iter().collect(),
            default,
        }
    }

    /// The explicit value for `key`, or the default.
    pub fn get(&self, key: &K) -> V {
        self.entries.get(key).cloned().unwrap_or_else(|| self.default.clone())
    }

    /// The explicit value for `key`, ignoring the default.
    pub fn get_explicit(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn default_value(&self) -> &V {
        &self.default
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}

/// A two-key table with no default: entries are keyed on an ordered pair.
#[derive(Clone, Debug)]
pub struct TwoKeyMap<K, V> {
    entries: HashMap<K, HashMap<K, V>>,
}

impl<K: Eq + Hash + Copy, V: Clone> Default for TwoKeyMap<K, V> {
    fn default() -> Self {
        TwoKeyMap {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy, V: Clone> TwoKeyMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: &K, b: &K) -> Option<&V> {
        self.entries.get(a).and_then(|inner| inner.get(b))
    }

    pub fn insert(&mut self, a: K, b: K, value: V) {
        self.entries.entry(a).or_default().insert(b, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &HashMap<K, V>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Copy, V: Clone + Ord> TwoKeyMap<K, V> {
    /// Keeps the maximum of the existing entry and `value`.
    pub fn insert_max(&mut self, a: K, b: K, value: V) {
        let slot = self.entries.entry(a).or_default().entry(b);
        slot.and_modify(|old| {
            if *old < value {
                *old = value.clone();
            }
        })
        .or_insert(value);
    }

    /// Keeps the minimum of the existing entry and `value`.
    pub fn insert_min(&mut self, a: K, b: K, value: V) {
        let slot = self.entries.entry(a).or_default().entry(b);
        slot.and_modify(|old| {
            if *old > value {
                *old = value.clone();
            }
        })
        .or_insert(value);
    }
}

/// Two-key table with a default value for absent pairs.
#[derive(Clone, Debug)]
pub struct DefaultTwoKeyMap<K, V> {
    entries: TwoKeyMap<K, V>,
    default: V,
}

impl<K: Eq + Hash + Copy, V: Clone> DefaultTwoKeyMap<K, V> {
    pub fn new(default: V) -> Self {
        DefaultTwoKeyMap {
            entries: TwoKeyMap::new(),
            default,
        }
    }

    pub fn get(&self, a: &K, b: &K) -> V {
        self.entries
            .get(a, b)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn get_explicit(&self, a: &K, b: &K) -> Option<&V> {
        self.entries.get(a, b)
    }

    pub fn insert(&mut self, a: K, b: K, value: V) {
        self.entries.insert(a, b, value);
    }

    pub fn default_value(&self) -> &V {
        &self.default
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &HashMap<K, V>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_falls_back() {
        let mut map = DefaultMap::new(7);
        map.insert(1u32, 3);
        assert_eq!(map.get(&1), 3);
        assert_eq!(map.get(&2), 7);
        assert_eq!(map.get_explicit(&2), None);
    }

    #[test]
    fn two_key_map_max_min() {
        let mut map: TwoKeyMap<u32, i64> = TwoKeyMap::new();
        map.insert_max(1, 2, 10);
        map.insert_max(1, 2, 5);
        assert_eq!(map.get(&1, &2), Some(&10));
        map.insert_min(1, 2, 5);
        assert_eq!(map.get(&1, &2), Some(&5));
        map.insert_min(1, 2, 8);
        assert_eq!(map.get(&1, &2), Some(&5));
    }
}
