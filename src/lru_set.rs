//! Bounded insertion-ordered set with oldest eviction.
//!
//! `contains` and `add` both touch the item to most-recently-used.
//! Eviction removes the single least-recently-touched item once the set
//! exceeds `maxsize`. Both operations are O(1) amortized via lazy
//! deletion: a monotonically increasing generation counter per key plus
//! an order log that may contain stale entries, skipped on eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

pub struct LruSet<K: Eq + Hash + Clone> {
    maxsize: usize,
    generations: HashMap<K, u64>,
    order: VecDeque<(u64, K)>,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone> LruSet<K> {
    pub fn new(maxsize: usize) -> Self {
        LruSet {
            maxsize,
            generations: HashMap::new(),
            order: VecDeque::new(),
            next_generation: 0,
        }
    }

    /// Returns whether `item` is present; if present, marks it
    /// most-recently-used.
    pub fn contains(&mut self, item: &K) -> bool {
        if self.generations.contains_key(item) {
            self.touch(item.clone());
            true
        } else {
            false
        }
    }

    /// Insert `item` (or re-mark it if already present), evicting the
    /// oldest entry if the set now exceeds `maxsize`.
    pub fn add(&mut self, item: K) {
        self.touch(item);
        while self.generations.len() > self.maxsize {
            self.evict_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    fn touch(&mut self, item: K) {
        let gen = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(item.clone(), gen);
        self.order.push_back((gen, item));
    }

    fn evict_oldest(&mut self) {
        while let Some((gen, key)) = self.order.pop_front() {
            if self.generations.get(&key) == Some(&gen) {
                self.generations.remove(&key);
                return;
            }
            // Stale entry superseded by a later touch, skip it.
        }
    }
}
