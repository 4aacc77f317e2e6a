use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered so that the lowest score sits at the top of a
/// `BinaryHeap`.
struct MinScored<T> {
    score: f64,
    item: T,
}

impl<T> PartialEq for MinScored<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for MinScored<T> {}

impl<T> PartialOrd for MinScored<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for MinScored<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score)
    }
}

/// Bounded min-heap retaining the `capacity` highest-scored items of a stream.
pub struct TopN<T> {
    capacity: usize,
    heap: BinaryHeap<MinScored<T>>,
}

impl<T> TopN<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn min_score(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.score)
    }

    /// Offer a candidate. Returns whether it was kept.
    ///
    /// Below capacity every candidate is kept. At capacity a candidate must
    /// strictly beat the current minimum, which it then evicts.
    pub fn push(&mut self, score: f64, item: T) -> bool {
        if self.heap.len() < self.capacity {
            self.heap.push(MinScored { score, item });
            return true;
        }

        match self.heap.peek_mut() {
            Some(mut min) if score > min.score => {
                *min = MinScored { score, item };
                true
            }
            _ => false,
        }
    }

    /// Items in descending score order, highest first.
    pub fn into_sorted_desc(mut self) -> Vec<(f64, T)> {
        let mut ascending = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            ascending.push((entry.score, entry.item));
        }
        ascending.reverse();
        ascending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_highest_scores_across_batches() {
        let mut top = TopN::new(3);

        // first batch
        assert!(top.push(5.0, "A"));
        assert!(top.push(1.0, "C"));
        // second batch: B fills the heap, D evicts C
        assert!(top.push(9.0, "B"));
        assert_eq!(top.min_score(), Some(1.0));
        assert!(top.push(7.0, "D"));

        let ranked: Vec<_> = top.into_sorted_desc();
        assert_eq!(ranked, vec![(9.0, "B"), (7.0, "D"), (5.0, "A")]);
        assert!(!ranked.iter().any(|(_, name)| *name == "C"));
    }

    #[test]
    fn test_candidate_must_strictly_beat_minimum() {
        let mut top = TopN::new(2);
        top.push(3.0, 1);
        top.push(4.0, 2);

        assert!(!top.push(3.0, 3));
        assert!(!top.push(-1.0, 4));
        assert_eq!(top.len(), 2);
        assert_eq!(top.min_score(), Some(3.0));
    }

    #[test]
    fn test_below_capacity_keeps_everything() {
        let mut top = TopN::new(10);
        for (i, score) in [-2.0, 0.0, 0.5].into_iter().enumerate() {
            assert!(top.push(score, i));
        }

        let scores: Vec<f64> = top.into_sorted_desc().into_iter().map(|(s, _)| s).collect();
        assert_eq!(scores, vec![0.5, 0.0, -2.0]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut top = TopN::new(0);
        assert!(!top.push(100.0, "x"));
        assert!(top.is_empty());
        assert!(top.into_sorted_desc().is_empty());
    }

    #[test]
    fn test_stream_larger_than_capacity() {
        let mut top = TopN::new(5);
        for i in 0..1_000 {
            // scrambled arrival order
            let score = ((i * 7_919) % 1_000) as f64;
            top.push(score, i);
        }

        let scores: Vec<f64> = top.into_sorted_desc().into_iter().map(|(s, _)| s).collect();
        assert_eq!(scores, vec![999.0, 998.0, 997.0, 996.0, 995.0]);
    }
}
