//! Higher-order pivot-neighborhood inverted index.
//!
//! A permutation-based ANN method in the NAPP family, generalized from
//! single pivots to unordered pivot **combinations** (pairs, triples).
//! Each object is summarized by the `num_prefix` pivots closest to it; all
//! k-combinations of that prefix map to integer bucket ids, and the object
//! id is appended to each bucket's posting list. A query computes its own
//! buckets and keeps the objects that co-occur in enough of them, then
//! re-ranks those candidates by the true distance.
//!
//! Compared to classic NAPP, pivot pairs and triples are much more
//! selective: two objects must agree on *combinations* of close pivots,
//! not individual ones, which shrinks candidate sets at equal recall. The
//! price is a larger bucket space, which `skip_val` sparsification trades
//! back against recall.
//!
//! # Usage
//!
//! ```ignore
//! use vicinage::{DenseL2Space, KnnQuery, PivotCombIndex, PivotCombParams};
//!
//! let params = PivotCombParams { num_pivot: 64, num_prefix: 8, ..Default::default() };
//! let index = PivotCombIndex::build(DenseL2Space::new(), vectors, params)?;
//!
//! let target = vec![0.25; 16];
//! let mut query = KnnQuery::new(&target, 10);
//! index.search_knn(&mut query)?;
//! let neighbors = query.into_results();
//! ```
//!
//! # References
//!
//! - Chávez, Figueroa & Navarro (2008): "Effective Proximity Retrieval by
//!   Ordering Permutations"
//! - Naidan, Boytsov & Nyberg (2015): "Permutation Search Methods are
//!   Efficient, Yet Faster Search is Possible"

mod build;
mod params;
mod persist;
mod postings;
mod search;
mod stats;

pub use params::{InvProcAlg, PivotCombParams, PivotCombQueryParams};
pub use stats::SearchStats;

use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::pivot::{
    permutation_from_distances, sample_pivots, BruteForceOracle, CombinationEncoder,
    PivotDistanceOracle, PivotId,
};
use crate::pool::{PoolLoan, VectorPool};
use crate::query::{KnnQuery, Query, RangeQuery};
use crate::space::Space;
use crate::{IndexError, Result};

use postings::PostingStore;
use stats::QueryCounters;

/// Stable method identifier, also the persisted format tag.
pub const METHOD_NAME: &str = "pivot-comb-invindex";

/// Query-time parameters resolved against the build-time configuration.
#[derive(Debug, Clone)]
struct ResolvedQueryParams {
    num_prefix_search: usize,
    min_times: u32,
    inv_proc_alg: InvProcAlg,
    skip_checking: bool,
    /// `min_times` scaled to combination terms; see [`search::scaled_threshold`].
    thresh: u32,
}

/// Per-index scratch-buffer pools, shared by all searching threads.
#[derive(Debug)]
struct SearchPools {
    keys: VectorPool<u32>,
    candidates: VectorPool<u32>,
    counters: VectorPool<u32>,
    sort_buf: VectorPool<u32>,
}

/// Read-only ANN index over a generic distance space.
///
/// Built once by [`build`](Self::build); afterwards any number of threads
/// may search concurrently.
#[derive(Debug)]
pub struct PivotCombIndex<S: Space> {
    space: S,
    data: Vec<S::Object>,
    params: PivotCombParams,
    oracle: BruteForceOracle<S::Object>,
    /// Dataset positions of sampled pivots; None for file or explicit pivots.
    pivot_positions: Option<Vec<u32>>,
    encoder: CombinationEncoder,
    store: PostingStore,
    query_params: ResolvedQueryParams,
    pools: SearchPools,
    stats: Mutex<SearchStats>,
}

impl<S: Space> PivotCombIndex<S>
where
    S::Object: Clone,
{
    /// Build an index over `data`, sampling pivots from the dataset or
    /// reading them from `params.pivot_file`.
    pub fn build(space: S, data: Vec<S::Object>, params: PivotCombParams) -> Result<Self> {
        params.validate()?;
        if data.is_empty() {
            return Err(IndexError::Data("dataset is empty".into()));
        }
        let (pivots, positions) = match &params.pivot_file {
            Some(path) => {
                let pivots = space.read_dataset(path, params.num_pivot)?;
                if pivots.len() < params.num_pivot {
                    return Err(IndexError::Data(format!(
                        "pivot file '{}' holds {} objects, need {}",
                        path.display(),
                        pivots.len(),
                        params.num_pivot
                    )));
                }
                (pivots, None)
            }
            None => {
                let (pivots, positions) =
                    sample_pivots(&data, params.num_pivot, params.pivot_seed)?;
                (pivots, Some(positions))
            }
        };
        Self::assemble(space, data, pivots, positions, params, None)
    }

    /// Build with an explicit pivot set. The pivots never have to belong to
    /// the dataset; `pivots.len()` must equal `params.num_pivot`. An index
    /// built this way cannot be saved (its pivots have no stable identity
    /// to record).
    pub fn build_with_pivots(
        space: S,
        data: Vec<S::Object>,
        pivots: Vec<S::Object>,
        params: PivotCombParams,
    ) -> Result<Self> {
        params.validate()?;
        if data.is_empty() {
            return Err(IndexError::Data("dataset is empty".into()));
        }
        if pivots.len() != params.num_pivot {
            return Err(IndexError::Config(format!(
                "got {} pivots but num_pivot = {}",
                pivots.len(),
                params.num_pivot
            )));
        }
        Self::assemble(space, data, pivots, None, params, None)
    }
}

impl<S: Space> PivotCombIndex<S> {
    /// Shared tail of every construction path. When `preloaded` posting
    /// lists are given (load path) the build pipeline is skipped.
    fn assemble(
        space: S,
        data: Vec<S::Object>,
        pivots: Vec<S::Object>,
        pivot_positions: Option<Vec<u32>>,
        params: PivotCombParams,
        preloaded: Option<Vec<Vec<u32>>>,
    ) -> Result<Self> {
        let encoder = CombinationEncoder::new(params.pivot_comb_qty, params.skip_val)?;
        let bucket_qty = encoder.bucket_qty(params.num_pivot) as usize;
        let data_qty = data.len();

        // Analytical occupancy estimates drive buffer reservations: each
        // object contributes C(num_prefix, k) combinations, 1/skip_val of
        // which survive, spread over bucket_qty lists.
        let combs_indexed = encoder.combs_per_object(params.num_prefix) as f64;
        let exp_avg_post_size =
            data_qty as f64 * combs_indexed / (params.skip_val as f64 * bucket_qty.max(1) as f64);
        let exp_post_per_query =
            exp_avg_post_size * combs_indexed / params.skip_val as f64;

        info!(
            method = METHOD_NAME,
            num_pivot = params.num_pivot,
            num_prefix = params.num_prefix,
            pivot_comb_qty = params.pivot_comb_qty,
            skip_val = params.skip_val,
            index_thread_qty = params.index_thread_qty,
            hash_trick_dim = params.hash_trick_dim,
            bucket_qty,
            data_qty,
            "building index"
        );
        if params.disable_pivot_index {
            debug!("accelerated pivot index disabled; using brute-force pivot distances");
        }

        let oracle = BruteForceOracle::new(pivots);
        let store = match preloaded {
            Some(lists) => PostingStore::from_lists(lists),
            None => build::build_postings(
                &space,
                &data,
                &oracle,
                &encoder,
                params.num_prefix,
                bucket_qty,
                exp_avg_post_size.ceil() as usize,
                params.index_thread_qty,
            )?,
        };

        if params.print_pivot_stat {
            let (mean, std) = store.size_stats();
            info!(
                posting_size_mean = mean,
                posting_size_std = std,
                expected_posting_size = exp_avg_post_size,
                postings_per_doc = store.total_postings() as f64 / data_qty as f64,
                "posting occupancy"
            );
        }

        let query_params =
            Self::resolve_query_params(&params, &PivotCombQueryParams::default())?;
        let pools = SearchPools {
            keys: VectorPool::new(
                params.index_thread_qty,
                (combs_indexed / params.skip_val as f64).ceil() as usize + 16,
            ),
            candidates: VectorPool::new(
                params.index_thread_qty,
                (2.0 * exp_post_per_query).ceil() as usize + 16,
            ),
            counters: VectorPool::new(params.index_thread_qty, data_qty),
            sort_buf: VectorPool::new(
                params.index_thread_qty,
                (2.0 * exp_post_per_query).ceil() as usize + 16,
            ),
        };

        Ok(Self {
            space,
            data,
            params,
            oracle,
            pivot_positions,
            encoder,
            store,
            query_params,
            pools,
            stats: Mutex::new(SearchStats::default()),
        })
    }

    fn resolve_query_params(
        params: &PivotCombParams,
        qp: &PivotCombQueryParams,
    ) -> Result<ResolvedQueryParams> {
        qp.validate(params.num_pivot)?;
        let min_times = qp.min_times_or_default();
        Ok(ResolvedQueryParams {
            num_prefix_search: qp.num_prefix_search.unwrap_or(params.num_prefix),
            min_times,
            inv_proc_alg: qp.inv_proc_alg,
            skip_checking: qp.skip_checking,
            thresh: search::scaled_threshold(min_times, params.num_prefix, params.pivot_comb_qty),
        })
    }

    /// Install query-time parameters for subsequent searches.
    pub fn set_query_params(&mut self, qp: &PivotCombQueryParams) -> Result<()> {
        self.query_params = Self::resolve_query_params(&self.params, qp)?;
        info!(
            min_times = self.query_params.min_times,
            num_prefix_search = self.query_params.num_prefix_search,
            inv_proc_alg = %self.query_params.inv_proc_alg,
            skip_checking = self.query_params.skip_checking,
            thresh = self.query_params.thresh,
            "set query-time parameters"
        );
        Ok(())
    }

    /// Run a K-nearest-neighbor query to completion.
    pub fn search_knn(&self, query: &mut KnnQuery<'_, S>) -> Result<()> {
        self.search(query)
    }

    /// Run a range query to completion.
    pub fn search_range(&self, query: &mut RangeQuery<'_, S>) -> Result<()> {
        self.search(query)
    }

    /// Generic search: generate candidates, then feed each one to the
    /// query accumulator unless `skip_checking` is set.
    pub fn search<Q: Query<S>>(&self, query: &mut Q) -> Result<()> {
        let search_start = Instant::now();
        let (cands, mut counters) = self.gen_candidates(query.object())?;

        let t = Instant::now();
        if !self.query_params.skip_checking {
            for &id in cands.iter() {
                query.check_and_add(&self.space, id, &self.data[id as usize]);
            }
        }
        counters.dist_comp_us = t.elapsed().as_micros() as u64;
        counters.search_us = search_start.elapsed().as_micros() as u64;

        self.stats.lock().record(&counters);
        Ok(())
    }

    /// The candidate ids the configured algorithm produces for `object`,
    /// without true-distance re-ranking.
    pub fn candidates(&self, object: &S::Object) -> Result<Vec<u32>> {
        let search_start = Instant::now();
        let (cands, mut counters) = self.gen_candidates(object)?;
        let out = cands.to_vec();
        counters.search_us = search_start.elapsed().as_micros() as u64;
        self.stats.lock().record(&counters);
        Ok(out)
    }

    fn gen_candidates(&self, object: &S::Object) -> Result<(PoolLoan<'_, u32>, QueryCounters)> {
        let mut counters = QueryCounters::default();

        let t = Instant::now();
        let mut dists: Vec<f32> = Vec::new();
        let mut perm: Vec<PivotId> = Vec::new();
        self.oracle
            .query_time_distances(&self.space, object, &mut dists)?;
        permutation_from_distances(&dists, &mut perm);
        counters.dist_pivot_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        let mut keys = self.pools.keys.loan();
        self.encoder
            .encode(&perm[..self.query_params.num_prefix_search], &mut keys);
        counters.ids_gen_us = t.elapsed().as_micros() as u64;

        let mut cands = self.pools.candidates.loan();
        let cand_counters = search::collect_candidates(
            &self.store,
            &keys,
            self.query_params.inv_proc_alg,
            self.query_params.thresh,
            self.params.skip_val,
            self.data.len(),
            &self.pools.counters,
            &self.pools.sort_buf,
            &mut cands,
        )?;
        counters.post_qty = cand_counters.post_qty;
        counters.copy_post_us = cand_counters.copy_post_us;
        counters.sort_comp_us = cand_counters.sort_comp_us;
        counters.scan_sorted_us = cand_counters.scan_sorted_us;

        Ok((cands, counters))
    }

    /// Stable method identifier.
    pub fn describe(&self) -> &'static str {
        METHOD_NAME
    }

    pub fn data_qty(&self) -> usize {
        self.data.len()
    }

    pub fn num_pivots(&self) -> usize {
        self.oracle.pivot_qty()
    }

    pub fn pivots(&self) -> &[S::Object] {
        self.oracle.pivots()
    }

    pub fn build_params(&self) -> &PivotCombParams {
        &self.params
    }

    /// Number of posting-list buckets (`max_posting_qty`).
    pub fn bucket_qty(&self) -> usize {
        self.store.bucket_qty()
    }

    /// The posting list of one bucket, ascending.
    pub fn posting_list(&self, bucket: u32) -> Option<&[u32]> {
        self.store.lists().get(bucket as usize).map(Vec::as_slice)
    }

    /// Snapshot of the cumulative search statistics.
    pub fn search_stats(&self) -> SearchStats {
        self.stats.lock().clone()
    }
}

impl<S: Space> Drop for PivotCombIndex<S> {
    fn drop(&mut self) {
        let stats = self.stats.lock();
        if stats.proc_query_qty > 0 {
            debug!(
                queries = stats.proc_query_qty,
                avg_postings_per_query = stats.avg_postings_per_query(),
                avg_search_us = stats.search_time_us as f64 / stats.proc_query_qty as f64,
                "index retired"
            );
        }
    }
}
