//! Query accumulators.
//!
//! A query owns the result it is building: the index feeds it candidate
//! objects through [`Query::check_and_add`] and the query decides whether
//! they belong in the result (top-K heap for [`KnnQuery`], radius filter for
//! [`RangeQuery`]). This is the "check and add" contract of the classic
//! permutation-index methods: the index proposes, the query disposes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::space::Space;

/// A search accumulator the index can feed candidates to.
pub trait Query<S: Space> {
    /// The object being searched for.
    fn object(&self) -> &S::Object;

    /// Evaluate the true distance to `obj` and fold it into the result.
    fn check_and_add(&mut self, space: &S, id: u32, obj: &S::Object);

    /// Number of true-distance evaluations performed so far.
    fn distance_computations(&self) -> u64;
}

/// An (id, distance) result entry.
pub type Neighbor = (u32, f32);

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist: f32,
    id: u32,
}

// Max-heap on distance; ties broken by id so results are deterministic.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// K-nearest-neighbor query.
///
/// Maintains the K closest objects seen so far in a max-heap keyed on
/// distance, so the current worst result is evicted in O(log K).
pub struct KnnQuery<'q, S: Space> {
    object: &'q S::Object,
    k: usize,
    heap: BinaryHeap<HeapEntry>,
    dist_computations: u64,
}

impl<'q, S: Space> KnnQuery<'q, S> {
    pub fn new(object: &'q S::Object, k: usize) -> Self {
        Self {
            object,
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            dist_computations: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Distance of the current K-th neighbor, or +inf while underfull.
    pub fn radius(&self) -> f32 {
        if self.heap.len() < self.k {
            f32::INFINITY
        } else {
            self.heap.peek().map_or(f32::INFINITY, |e| e.dist)
        }
    }

    /// Results in ascending distance order, ties broken by id.
    pub fn into_results(self) -> Vec<Neighbor> {
        let mut out: Vec<Neighbor> = self.heap.into_iter().map(|e| (e.id, e.dist)).collect();
        out.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl<S: Space> Query<S> for KnnQuery<'_, S> {
    fn object(&self) -> &S::Object {
        self.object
    }

    fn check_and_add(&mut self, space: &S, id: u32, obj: &S::Object) {
        if self.k == 0 {
            return;
        }
        let dist = space.distance(self.object, obj);
        self.dist_computations += 1;
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { dist, id });
        } else if dist < self.radius() {
            self.heap.push(HeapEntry { dist, id });
            self.heap.pop();
        }
    }

    fn distance_computations(&self) -> u64 {
        self.dist_computations
    }
}

/// Range (radius) query: keeps every object within `radius` of the target.
pub struct RangeQuery<'q, S: Space> {
    object: &'q S::Object,
    radius: f32,
    results: Vec<Neighbor>,
    dist_computations: u64,
}

impl<'q, S: Space> RangeQuery<'q, S> {
    pub fn new(object: &'q S::Object, radius: f32) -> Self {
        Self {
            object,
            radius,
            results: Vec::new(),
            dist_computations: 0,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Results in ascending distance order, ties broken by id.
    pub fn into_results(self) -> Vec<Neighbor> {
        let mut out = self.results;
        out.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl<S: Space> Query<S> for RangeQuery<'_, S> {
    fn object(&self) -> &S::Object {
        self.object
    }

    fn check_and_add(&mut self, space: &S, id: u32, obj: &S::Object) {
        let dist = space.distance(self.object, obj);
        self.dist_computations += 1;
        if dist <= self.radius {
            self.results.push((id, dist));
        }
    }

    fn distance_computations(&self) -> u64 {
        self.dist_computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::DenseL2Space;

    #[test]
    fn knn_keeps_k_closest() {
        let space = DenseL2Space::new();
        let target = vec![0.0f32];
        let mut q = KnnQuery::new(&target, 2);

        let objs: Vec<Vec<f32>> = vec![vec![5.0], vec![1.0], vec![3.0], vec![0.5]];
        for (id, obj) in objs.iter().enumerate() {
            q.check_and_add(&space, id as u32, obj);
        }

        assert_eq!(q.distance_computations(), 4);
        let res = q.into_results();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].0, 3); // 0.5 away
        assert_eq!(res[1].0, 1); // 1.0 away
    }

    #[test]
    fn knn_radius_shrinks_as_heap_fills() {
        let space = DenseL2Space::new();
        let target = vec![0.0f32];
        let mut q = KnnQuery::new(&target, 1);
        assert_eq!(q.radius(), f32::INFINITY);
        q.check_and_add(&space, 0, &vec![2.0]);
        assert_eq!(q.radius(), 4.0);
        q.check_and_add(&space, 1, &vec![1.0]);
        assert_eq!(q.radius(), 1.0);
    }

    #[test]
    fn knn_zero_k_accepts_nothing() {
        let space = DenseL2Space::new();
        let target = vec![0.0f32];
        let mut q = KnnQuery::new(&target, 0);
        q.check_and_add(&space, 0, &vec![1.0]);
        assert!(q.into_results().is_empty());
    }

    #[test]
    fn range_filters_by_radius() {
        let space = DenseL2Space::new();
        let target = vec![0.0f32];
        // Squared L2: radius 4.0 covers coordinates within 2.0.
        let mut q = RangeQuery::new(&target, 4.0);
        q.check_and_add(&space, 0, &vec![1.0]);
        q.check_and_add(&space, 1, &vec![3.0]);
        q.check_and_add(&space, 2, &vec![2.0]);

        let res = q.into_results();
        assert_eq!(res.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 2]);
    }
}
