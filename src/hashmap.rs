//! An open-addressed hash map with linear probing and tombstone deletes.
//!
//! Slots are tagged by their stored hash, reserving two sentinel values so
//! a slot's state never needs a separate enum: `0` is empty, `1` is a
//! tombstone (a deleted entry that must still be probed through), and any
//! other value marks an occupied slot holding the real (possibly
//! collided-down-to-`0`-or-`1`, rehashed away from the sentinels) hash.

use std::hash::{Hash, Hasher};

const LOAD_MAX_PERCENT: usize = 75;
const LOAD_MIN_PERCENT: usize = 25;
const MIN_CAPACITY: usize = 8;

enum SlotState {
    Empty,
    Tomb,
    Occupied,
}

struct Slot<K, V> {
    hash: u64,
    entry: Option<(K, V)>,
}

impl<K, V> Slot<K, V> {
    fn empty() -> Self {
        Self { hash: 0, entry: None }
    }

    fn state(&self) -> SlotState {
        match self.hash {
            0 => SlotState::Empty,
            1 => SlotState::Tomb,
            _ => SlotState::Occupied,
        }
    }
}

/// An open-addressed `HashMap<K, V>` alternative, preserving the
/// `hash == 0` empty / `hash == 1` tombstone / `hash >= 2` occupied
/// encoding rather than using a separate state enum per slot.
pub struct OpenHashMap<K, V> {
    slots: Vec<Slot<K, V>>,
    len: usize,
    tombs: usize,
}

impl<K: Hash + Eq + Clone, V> Default for OpenHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> OpenHashMap<K, V> {
    pub fn new() -> Self {
        Self {
            slots: (0..MIN_CAPACITY).map(|_| Slot::empty()).collect(),
            len: 0,
            tombs: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let h = hasher.finish();
        // Never produce a sentinel value for a real occupied slot.
        if h < 2 {
            h + 2
        } else {
            h
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Probe for `key`, returning the index of its slot (occupied) or the
    /// first tombstone/empty slot suitable for inserting it.
    fn probe(&self, key: &K, hash: u64) -> usize {
        let cap = self.capacity();
        let mut idx = (hash as usize) % cap;
        let mut first_tomb = None;
        loop {
            match self.slots[idx].state() {
                SlotState::Empty => return first_tomb.unwrap_or(idx),
                SlotState::Tomb => {
                    if first_tomb.is_none() {
                        first_tomb = Some(idx);
                    }
                }
                SlotState::Occupied => {
                    if self.slots[idx].hash == hash {
                        if let Some((k, _)) = &self.slots[idx].entry {
                            if k == key {
                                return idx;
                            }
                        }
                    }
                }
            }
            idx = (idx + 1) % cap;
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = Self::hash_of(key);
        let idx = self.probe(key, hash);
        match self.slots[idx].state() {
            SlotState::Occupied => self.slots[idx].entry.as_ref().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if (self.len + self.tombs + 1) * 100 > self.capacity() * LOAD_MAX_PERCENT {
            self.resize(self.capacity() * 2);
        }
        let hash = Self::hash_of(&key);
        let idx = self.probe(&key, hash);
        let was_tomb = matches!(self.slots[idx].state(), SlotState::Tomb);
        let old = self.slots[idx].entry.take().map(|(_, v)| v);
        if old.is_none() && !was_tomb {
            self.len += 1;
        } else if was_tomb {
            self.len += 1;
            self.tombs -= 1;
        }
        self.slots[idx] = Slot {
            hash,
            entry: Some((key, value)),
        };
        old
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = Self::hash_of(key);
        let idx = self.probe(key, hash);
        if !matches!(self.slots[idx].state(), SlotState::Occupied) {
            return None;
        }
        let (_, v) = self.slots[idx].entry.take().unwrap();
        self.slots[idx].hash = 1; // tombstone
        self.len -= 1;
        self.tombs += 1;
        if self.capacity() > MIN_CAPACITY && self.len * 100 < self.capacity() * LOAD_MIN_PERCENT {
            self.resize((self.capacity() / 2).max(MIN_CAPACITY));
        }
        Some(v)
    }

    fn resize(&mut self, new_capacity: usize) {
        let old = std::mem::replace(&mut self.slots, (0..new_capacity).map(|_| Slot::empty()).collect());
        self.tombs = 0;
        self.len = 0;
        for slot in old {
            if let Some((k, v)) = slot.entry {
                self.insert(k, v);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().filter_map(|s| s.entry.as_ref().map(|(k, v)| (k, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut m: OpenHashMap<String, i32> = OpenHashMap::new();
        m.insert("a".into(), 1);
        m.insert("b".into(), 2);
        assert_eq!(m.get(&"a".to_string()), Some(&1));
        assert_eq!(m.remove(&"a".to_string()), Some(1));
        assert_eq!(m.get(&"a".to_string()), None);
        assert_eq!(m.get(&"b".to_string()), Some(&2));
    }

    #[test]
    fn survives_many_inserts_and_tombstoned_removals() {
        let mut m: OpenHashMap<i64, i64> = OpenHashMap::new();
        for i in 0..200 {
            m.insert(i, i * 2);
        }
        for i in (0..200).step_by(2) {
            assert_eq!(m.remove(&i), Some(i * 2));
        }
        for i in 0..200 {
            if i % 2 == 0 {
                assert_eq!(m.get(&i), None);
            } else {
                assert_eq!(m.get(&i), Some(&(i * 2)));
            }
        }
    }
}
