//! vicinage: approximate nearest-neighbor search over generic distance
//! spaces via higher-order pivot-neighborhood inverted indexes.
//!
//! The crate implements the NAPP family of permutation methods extended
//! with pivot **combinations**: instead of indexing each object under its
//! individual closest pivots, it indexes unordered pairs or triples of
//! them. Combination keys are far more selective, so candidate sets shrink
//! at comparable recall.
//!
//! # How a search works
//!
//! 1. Distances from the query to every pivot ([`pivot::PivotDistanceOracle`])
//! 2. Pivots sorted by that distance ([`pivot::permutation_from_distances`])
//! 3. All k-combinations of the closest `num_prefix_search` pivots mapped
//!    to bucket ids ([`pivot::CombinationEncoder`])
//! 4. Objects co-occurring in enough of those buckets become candidates
//!    (one of four interchangeable algorithms, [`index::InvProcAlg`])
//! 5. Candidates re-ranked by the true distance through the query
//!    accumulator ([`query::KnnQuery`] / [`query::RangeQuery`])
//!
//! The distance does not have to be a metric; anything the [`space::Space`]
//! trait can evaluate works.
//!
//! # Which knobs matter?
//!
//! | Goal | Knob |
//! |------|------|
//! | Recall up, speed down | raise `num_prefix_search`, lower `min_times` |
//! | Memory down, recall down | raise `skip_val` |
//! | More selective candidates | `pivot_comb_qty` 2 or 3 |
//! | Query CPU profile | `inv_proc_alg` (store-sort is the default) |

pub mod error;
pub mod index;
pub mod pivot;
pub mod pool;
pub mod query;
pub mod space;

pub use error::{IndexError, Result};
pub use index::{
    InvProcAlg, PivotCombIndex, PivotCombParams, PivotCombQueryParams, SearchStats,
};
pub use query::{KnnQuery, Neighbor, RangeQuery};
pub use space::{DenseL2Space, Space};
