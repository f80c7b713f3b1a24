//! Open-addressing counting table
//!
//! Maps string keys to signed 64-bit counts. Capacity is always a power of
//! two and linear probing walks `(index + 1) & mask` on collision. The table
//! doubles before a new key would push occupancy past 70%, so the load
//! factor after any insert is at most 0.7.

use crate::rank::RankedSeq;
use std::fmt;

const MIN_CAPACITY: usize = 8;

// Load factor threshold as a fraction: 7 / 10
const LOAD_NUM: usize = 7;
const LOAD_DEN: usize = 10;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the key bytes
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Clone)]
struct Slot {
    hash: u64,
    key: String,
    count: i64,
}

/// Hash table from string key to count
#[derive(Clone)]
pub struct CountTable {
    slots: Vec<Option<Slot>>,
    len: usize,
}

impl Default for CountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CountTable {
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Table with at least `capacity` slots, rounded up to a power of two
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        Self {
            slots: empty_slots(capacity),
            len: 0,
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots (always a power of two)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        let hash = fnv1a(key.as_bytes());
        match self.find(hash, key) {
            Ok(idx) => self.slots[idx].as_ref().map(|s| s.count),
            Err(_) => None,
        }
    }

    /// Add `delta` to `key`, inserting it if absent. A zero delta is a no-op.
    pub fn increment(&mut self, key: &str, delta: i64) {
        if delta == 0 {
            return;
        }
        let hash = fnv1a(key.as_bytes());
        if let Ok(idx) = self.find(hash, key) {
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.count += delta;
            }
            return;
        }
        self.insert_new(hash, key.to_owned(), delta);
    }

    /// Same as [`increment`](Self::increment) but reuses the caller's allocation for new keys
    pub fn increment_owned(&mut self, key: String, delta: i64) {
        if delta == 0 {
            return;
        }
        let hash = fnv1a(key.as_bytes());
        if let Ok(idx) = self.find(hash, &key) {
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.count += delta;
            }
            return;
        }
        self.insert_new(hash, key, delta);
    }

    /// Add every entry of `other` into `self`
    pub fn merge(&mut self, other: &CountTable) {
        for (key, count) in other.iter() {
            self.increment(key, count);
        }
    }

    /// Live entries in slot order (arbitrary but stable for a given table)
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: self.slots.iter(),
        }
    }

    /// Entries in canonical rank order: count descending, then key ascending
    pub fn to_sorted_sequence(&self) -> RankedSeq<'_> {
        RankedSeq::from_table(self)
    }

    /// Sum of all counts
    pub fn total(&self) -> i64 {
        self.iter().map(|(_, c)| c).sum()
    }

    // Ok(idx) if `key` lives at idx, Err(idx) with the first empty slot otherwise
    fn find(&self, hash: u64, key: &str) -> Result<usize, usize> {
        let mask = self.slots.len() - 1;
        let mut idx = (hash as usize) & mask;
        loop {
            match &self.slots[idx] {
                None => return Err(idx),
                Some(slot) if slot.hash == hash && slot.key == key => return Ok(idx),
                Some(_) => idx = (idx + 1) & mask,
            }
        }
    }

    fn insert_new(&mut self, hash: u64, key: String, count: i64) {
        if (self.len + 1) * LOAD_DEN > self.slots.len() * LOAD_NUM {
            self.grow();
        }
        let idx = match self.find(hash, &key) {
            Ok(idx) | Err(idx) => idx,
        };
        self.slots[idx] = Some(Slot { hash, key, count });
        self.len += 1;
    }

    fn grow(&mut self) {
        let new_capacity = self.slots.len() << 1;
        let old = std::mem::replace(&mut self.slots, empty_slots(new_capacity));
        let mask = new_capacity - 1;
        for slot in old.into_iter().flatten() {
            let mut idx = (slot.hash as usize) & mask;
            while self.slots[idx].is_some() {
                idx = (idx + 1) & mask;
            }
            self.slots[idx] = Some(slot);
        }
    }
}

fn empty_slots(capacity: usize) -> Vec<Option<Slot>> {
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || None);
    slots
}

impl PartialEq for CountTable {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|(k, c)| other.get(k) == Some(c))
    }
}

impl Eq for CountTable {}

impl fmt::Debug for CountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<S: AsRef<str>> Extend<(S, i64)> for CountTable {
    fn extend<I: IntoIterator<Item = (S, i64)>>(&mut self, iter: I) {
        for (key, delta) in iter {
            self.increment(key.as_ref(), delta);
        }
    }
}

impl<S: AsRef<str>> FromIterator<(S, i64)> for CountTable {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut table = CountTable::new();
        table.extend(iter);
        table
    }
}

/// Iterator over `(key, count)` pairs of a [`CountTable`]
pub struct Iter<'a> {
    slots: std::slice::Iter<'a, Option<Slot>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, i64);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some(slot) = slot {
                return Some((slot.key.as_str(), slot.count));
            }
        }
        None
    }
}

impl<'a> IntoIterator for &'a CountTable {
    type Item = (&'a str, i64);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn increment_accumulates_and_ignores_zero() {
        let mut t = CountTable::new();
        t.increment("love", 1);
        t.increment("love", 2);
        t.increment("pain", 0);
        assert_eq!(t.get("love"), Some(3));
        assert_eq!(t.get("pain"), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn capacity_stays_power_of_two_under_load_threshold() {
        let mut t = CountTable::with_capacity(3);
        assert_eq!(t.capacity(), 8);
        for i in 0..10_000 {
            t.increment(&format!("k{i}"), 1);
            assert!(t.capacity().is_power_of_two());
            assert!(t.len() * LOAD_DEN <= t.capacity() * LOAD_NUM);
        }
        assert_eq!(t.len(), 10_000);
        for i in (0..10_000).step_by(997) {
            assert_eq!(t.get(&format!("k{i}")), Some(1));
        }
    }

    #[test]
    fn updating_existing_key_does_not_grow() {
        let mut t = CountTable::new();
        for k in ["a", "b", "c", "d", "e"] {
            t.increment(k, 1);
        }
        let cap = t.capacity();
        for _ in 0..100 {
            t.increment("a", 1);
        }
        assert_eq!(t.capacity(), cap);
        assert_eq!(t.get("a"), Some(101));
    }

    #[test]
    fn merge_adds_overlapping_keys() {
        let a: CountTable = [("x", 2), ("y", 1)].into_iter().collect();
        let b: CountTable = [("y", 4), ("z", 7)].into_iter().collect();

        let mut merged = a.clone();
        merged.merge(&b);
        assert_eq!(merged.get("y"), Some(5));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.total(), 14);
    }

    #[test]
    fn merge_skips_zero_counts() {
        let mut other = CountTable::new();
        other.increment("z", 1);
        other.increment("z", -1);
        let mut merged = CountTable::new();
        merged.merge(&other);
        assert!(merged.is_empty());
    }

    #[test]
    fn equality_ignores_capacity_and_insertion_order() {
        let mut a = CountTable::with_capacity(1024);
        let mut b = CountTable::new();
        for k in ["one", "two", "three"] {
            a.increment(k, 1);
        }
        for k in ["three", "one", "two"] {
            b.increment(k, 1);
        }
        assert_eq!(a, b);
        b.increment("two", 1);
        assert_ne!(a, b);
    }
}
