//! Pivot machinery: selection, distance oracle, permutations, and the
//! permutation-to-combination-key encoding.
//!
//! The pipeline is the same at build and query time: distances to all
//! pivots ([`PivotDistanceOracle`]) become a permutation
//! ([`permutation_from_distances`]), whose prefix the
//! [`CombinationEncoder`] turns into bucket ids.

mod combinations;
mod oracle;
mod permutation;
mod select;

pub use combinations::{max_posting_qty, pair_index, triple_index, CombinationEncoder};
pub use oracle::{BruteForceOracle, PivotDistanceOracle};
pub use permutation::{permutation_from_distances, PivotId};
pub use select::sample_pivots;
