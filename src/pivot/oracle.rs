//! Pivot-distance oracle.
//!
//! The index asks the oracle for a vector of distances from a target to
//! every pivot. The trait splits the build path from the query path because
//! an accelerated implementation may precompute different structures for
//! each; the shipped [`BruteForceOracle`] answers both with one dense pass.

use crate::space::Space;
use crate::Result;

/// Source of target-to-pivot distance vectors.
///
/// Implementations must be thread-safe: the build pipeline calls
/// [`index_time_distances`](PivotDistanceOracle::index_time_distances) from
/// every worker. An implementation that cannot evaluate a distance reports
/// an error, which aborts the surrounding build or search.
pub trait PivotDistanceOracle<S: Space>: Send + Sync {
    /// Distances from a dataset object to every pivot (build path).
    fn index_time_distances(&self, space: &S, obj: &S::Object, out: &mut Vec<f32>) -> Result<()>;

    /// Distances from a query object to every pivot (search path).
    fn query_time_distances(&self, space: &S, query: &S::Object, out: &mut Vec<f32>) -> Result<()>;

    fn num_pivots(&self) -> usize;
}

/// Oracle that evaluates every pivot distance directly through the space.
#[derive(Debug)]
pub struct BruteForceOracle<O> {
    pivots: Vec<O>,
}

impl<O> BruteForceOracle<O> {
    pub fn new(pivots: Vec<O>) -> Self {
        Self { pivots }
    }

    pub fn pivots(&self) -> &[O] {
        &self.pivots
    }

    pub fn pivot_qty(&self) -> usize {
        self.pivots.len()
    }

    fn distances<S>(&self, space: &S, target: &S::Object, out: &mut Vec<f32>)
    where
        S: Space<Object = O>,
    {
        out.clear();
        out.extend(self.pivots.iter().map(|p| space.distance(target, p)));
    }
}

impl<S> PivotDistanceOracle<S> for BruteForceOracle<S::Object>
where
    S: Space,
{
    fn index_time_distances(&self, space: &S, obj: &S::Object, out: &mut Vec<f32>) -> Result<()> {
        self.distances(space, obj, out);
        Ok(())
    }

    fn query_time_distances(&self, space: &S, query: &S::Object, out: &mut Vec<f32>) -> Result<()> {
        self.distances(space, query, out);
        Ok(())
    }

    fn num_pivots(&self) -> usize {
        self.pivots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::DenseL2Space;

    #[test]
    fn brute_force_distances_to_all_pivots() {
        let space = DenseL2Space::new();
        let oracle = BruteForceOracle::new(vec![vec![0.0f32], vec![10.0f32]]);
        let mut dists = Vec::new();

        oracle
            .index_time_distances(&space, &vec![1.0f32], &mut dists)
            .unwrap();
        assert_eq!(dists, vec![1.0, 81.0]);

        // Both paths answer identically for the brute-force oracle.
        let mut qdists = Vec::new();
        oracle
            .query_time_distances(&space, &vec![1.0f32], &mut qdists)
            .unwrap();
        assert_eq!(dists, qdists);
        assert_eq!(PivotDistanceOracle::<DenseL2Space>::num_pivots(&oracle), 2);
    }
}
