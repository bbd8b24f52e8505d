use crate::core::utils::random::RandomSource;
use std::collections::HashMap;

/// Live set of particle indices with O(1) insert, erase, membership and uniform sampling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexTracker {
    items: Vec<usize>,
    positions: HashMap<usize, usize>,
}

impl IndexTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.positions.contains_key(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().copied()
    }

    /// Returns false if `index` was already tracked.
    pub fn insert(&mut self, index: usize) -> bool {
        if self.contains(index) {
            return false;
        }
        self.positions.insert(index, self.items.len());
        self.items.push(index);
        true
    }

    /// Returns false if `index` was not tracked.
    pub fn erase(&mut self, index: usize) -> bool {
        let Some(slot) = self.positions.remove(&index) else {
            return false;
        };
        self.items.swap_remove(slot);
        if let Some(&moved) = self.items.get(slot) {
            self.positions.insert(moved, slot);
        }
        true
    }

    /// Draws `n` distinct tracked indices uniformly at random.
    ///
    /// Exactly `n` random numbers are consumed whether or not the population suffices, so the
    /// caller's stream advances identically in both cases. Returns `None` if fewer than `n`
    /// indices are tracked.
    pub fn sample(&self, n: usize, rng: &mut RandomSource) -> Option<Vec<usize>> {
        let len = self.items.len();
        if len < n {
            for _ in 0..n {
                rng.uniform();
            }
            return None;
        }
        // Partial Fisher-Yates over a sparse view of `items`.
        let mut swapped: HashMap<usize, usize> = HashMap::with_capacity(n);
        let mut picked = Vec::with_capacity(n);
        for k in 0..n {
            let j = k + rng.below(len - k);
            let at_j = swapped.get(&j).copied().unwrap_or(j);
            let at_k = swapped.get(&k).copied().unwrap_or(k);
            swapped.insert(j, at_k);
            picked.push(self.items[at_j]);
        }
        Some(picked)
    }

    /// Renumbers every tracked index through `map`, dropping indices mapped to `None`.
    ///
    /// Used by the owning space after particles were inserted or erased, which shifts the
    /// absolute indices of everything stored behind the edit point.
    pub fn relabel(&mut self, map: impl Fn(usize) -> Option<usize>) {
        let items: Vec<usize> = self.items.iter().filter_map(|&i| map(i)).collect();
        self.positions = items.iter().enumerate().map(|(slot, &i)| (i, slot)).collect();
        self.items = items;
    }
}

impl FromIterator<usize> for IndexTracker {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut tracker = IndexTracker::new();
        for index in iter {
            tracker.insert(index);
        }
        tracker
    }
}
