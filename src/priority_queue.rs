//! Min-priority queue over continuous `f64` keys
//!
//! Used by both shortest-path search and front propagation, where keys are
//! accumulated costs or arrival times.
//!
//! Equal keys pop in insertion order. Stale entries are not removed; callers
//! skip them on pop (lazy deletion).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

struct Entry<T> {
    key: OrderedFloat<f64>,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap: reverse both fields so the smallest key, then the
// earliest insertion, is on top.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key).then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct MinQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for MinQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MinQueue<T> {
    pub fn new() -> Self {
        MinQueue { heap: BinaryHeap::new(), next_seq: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MinQueue { heap: BinaryHeap::with_capacity(capacity), next_seq: 0 }
    }

    #[inline]
    pub fn push(&mut self, key: f64, item: T) {
        self.heap.push(Entry { key: OrderedFloat(key), seq: self.next_seq, item });
        self.next_seq += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|e| (e.key.into_inner(), e.item))
    }

    #[inline]
    pub fn peek_key(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.key.into_inner())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_min_queue() {
        let mut queue: MinQueue<(usize, usize, usize)> = MinQueue::new();
        assert!(queue.is_empty());

        queue.push(1.5, (1, 2, 3));
        queue.push(0.25, (4, 5, 6));
        queue.push(7.0, (7, 8, 9));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek_key(), Some(0.25));

        // Smallest key first
        assert_eq!(queue.pop(), Some((0.25, (4, 5, 6))));
        assert_eq!(queue.pop(), Some((1.5, (1, 2, 3))));
        assert_eq!(queue.pop(), Some((7.0, (7, 8, 9))));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_ties_pop_in_insertion_order() {
        let mut queue = MinQueue::new();
        for item in 0..10 {
            queue.push(2.0, item);
        }
        queue.push(1.0, 99);
        assert_eq!(queue.pop(), Some((1.0, 99)));
        let order: Vec<i32> = std::iter::from_fn(|| queue.pop().map(|(_, x)| x)).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn pops_are_sorted(keys in prop::collection::vec(0.0f64..1e6, 0..200)) {
            let mut queue = MinQueue::new();
            for (i, &k) in keys.iter().enumerate() {
                queue.push(k, i);
            }
            let mut last = f64::NEG_INFINITY;
            let mut n = 0;
            while let Some((k, _)) = queue.pop() {
                prop_assert!(k >= last);
                last = k;
                n += 1;
            }
            prop_assert_eq!(n, keys.len());
        }
    }
}
