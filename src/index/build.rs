//! Parallel bulk indexing pipeline.
//!
//! The object-id space is split into one contiguous range per worker. Each
//! worker stages postings in private per-bucket buffers and only takes the
//! shared per-bucket locks when it drains them, every [`FLUSH_THRESHOLD`]
//! objects. Lock acquisition is therefore amortized over large batches
//! instead of serializing on hot pivot combinations. A final parallel pass
//! sorts every shared list ascending, which the merging query algorithms
//! rely on.

use std::ops::Range;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::debug;

use crate::pivot::{
    permutation_from_distances, BruteForceOracle, CombinationEncoder, PivotDistanceOracle, PivotId,
};
use crate::space::Space;
use crate::{IndexError, Result};

use super::postings::PostingStore;

/// Staged objects per worker before a drain into the shared lists.
pub(crate) const FLUSH_THRESHOLD: usize = 4096 * 32;

/// Build the posting lists for `data` and sort each one ascending.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_postings<S: Space>(
    space: &S,
    data: &[S::Object],
    oracle: &BruteForceOracle<S::Object>,
    encoder: &CombinationEncoder,
    num_prefix: usize,
    bucket_qty: usize,
    expected_list_len: usize,
    thread_qty: usize,
) -> Result<PostingStore> {
    let shared: Vec<Mutex<Vec<u32>>> = (0..bucket_qty)
        .map(|_| Mutex::new(Vec::with_capacity(expected_list_len + expected_list_len / 5)))
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_qty)
        .build()
        .map_err(|e| IndexError::Internal(format!("cannot start build workers: {e}")))?;

    let ranges = partition_ranges(data.len(), thread_qty);

    pool.install(|| {
        ranges
            .into_par_iter()
            .map(|range| index_range(space, data, oracle, encoder, num_prefix, &shared, range))
            .collect::<Result<Vec<()>>>()
    })?;

    let mut lists: Vec<Vec<u32>> = shared.into_iter().map(Mutex::into_inner).collect();

    pool.install(|| {
        lists.par_iter_mut().for_each(|list| list.sort_unstable());
    });

    Ok(PostingStore::from_lists(lists))
}

/// Split `[0, len)` into at most `parts` non-empty contiguous ranges whose
/// sizes differ by at most one.
fn partition_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.min(len).max(1);
    let base = len / parts;
    let extra = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        if size == 0 {
            break;
        }
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

fn index_range<S: Space>(
    space: &S,
    data: &[S::Object],
    oracle: &BruteForceOracle<S::Object>,
    encoder: &CombinationEncoder,
    num_prefix: usize,
    shared: &[Mutex<Vec<u32>>],
    range: Range<usize>,
) -> Result<()> {
    let mut staging: Vec<Vec<u32>> = vec![Vec::new(); shared.len()];
    let mut staged_docs = 0usize;
    let mut dists: Vec<f32> = Vec::new();
    let mut perm: Vec<PivotId> = Vec::new();
    let mut keys: Vec<u32> = Vec::new();

    for id in range {
        oracle.index_time_distances(space, &data[id], &mut dists)?;
        permutation_from_distances(&dists, &mut perm);
        encoder.encode(&perm[..num_prefix], &mut keys);

        for &key in &keys {
            let bucket = key as usize;
            if bucket >= staging.len() {
                return Err(IndexError::Internal(format!(
                    "bucket id {bucket} >= bucket count {}",
                    staging.len()
                )));
            }
            staging[bucket].push(id as u32);
        }

        staged_docs += 1;
        if staged_docs >= FLUSH_THRESHOLD {
            flush_staging(&mut staging, shared);
            staged_docs = 0;
        }
    }
    flush_staging(&mut staging, shared);
    Ok(())
}

/// Drain every non-empty staged bucket into the shared lists. Critical
/// sections are per bucket and only as long as one vector append.
fn flush_staging(staging: &mut [Vec<u32>], shared: &[Mutex<Vec<u32>>]) {
    let mut moved = 0usize;
    for (bucket, local) in staging.iter_mut().enumerate() {
        if local.is_empty() {
            continue;
        }
        moved += local.len();
        shared[bucket].lock().append(local);
    }
    if moved > 0 {
        debug!(postings = moved, "drained staged postings");
    }
}
