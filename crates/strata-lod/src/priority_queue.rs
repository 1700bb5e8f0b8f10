//! Max-heap ordering traversal candidates by screen-space error.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An entry in the priority queue.
#[derive(Clone, Debug)]
struct ScoredEntry<T> {
    score: f64,
    item: T,
}

impl<T> PartialEq for ScoredEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for ScoredEntry<T> {}

impl<T> PartialOrd for ScoredEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScoredEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// Binary max-heap of `(score, item)` pairs.
///
/// Items with equal scores come out in unspecified order. NaN scores are
/// stored as negative infinity so they sort below every real score.
#[derive(Clone, Debug)]
pub struct PriorityQueue<T> {
    heap: BinaryHeap<ScoredEntry<T>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    /// Create a new empty priority queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Drop every entry and make room for at least `capacity_hint` more.
    pub fn reset(&mut self, capacity_hint: usize) {
        self.heap.clear();
        self.heap.reserve(capacity_hint);
    }

    /// Insert `item` with `score`.
    pub fn insert(&mut self, score: f64, item: T) {
        let score = if score.is_nan() { f64::NEG_INFINITY } else { score };
        self.heap.push(ScoredEntry { score, item });
    }

    /// Remove and return the highest-scoring entry.
    pub fn extract_max(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|entry| (entry.score, entry.item))
    }

    /// Score of the entry [`Self::extract_max`] would return next.
    #[must_use]
    pub fn peek_score(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.score)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
