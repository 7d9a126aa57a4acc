//! Candidate generation over the query's posting lists.
//!
//! Four interchangeable algorithms compute the same candidate set: every
//! object whose accumulated count over the selected posting lists reaches
//! the scaled threshold. Counts accumulate `skip_val` per bucket hit, so
//! sparsification cancels against the threshold instead of shifting it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use smallvec::SmallVec;

use crate::pool::VectorPool;
use crate::{IndexError, Result};

use super::params::InvProcAlg;
use super::postings::PostingStore;

/// Scale the user threshold from single-pivot terms to combination terms.
///
/// An object sharing `min_times` close pivots with the query participates
/// in about C(min_times-ish, k) of its combinations; scaling by the number
/// of combinations per retained pivot keeps recall comparable across
/// combination orders. Clamped to >= 1 so an all-zero count never
/// qualifies and all four algorithms agree on never-seen objects.
pub(crate) fn scaled_threshold(min_times: u32, num_prefix: usize, comb_qty: u32) -> u32 {
    let m = min_times as u64;
    let p = num_prefix as u64;
    let t = match comb_qty {
        1 => m,
        2 => m * p.saturating_sub(1) / 2,
        3 => m * p.saturating_sub(1) * p.saturating_sub(2) / 6,
        _ => unreachable!("combination order is validated to 1..=3"),
    };
    t.clamp(1, u64::from(u32::MAX)) as u32
}

/// Per-query candidate-generation counters, folded into the index stats.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CandidateCounters {
    /// Posting entries touched.
    pub post_qty: u64,
    pub copy_post_us: u64,
    pub sort_comp_us: u64,
    pub scan_sorted_us: u64,
}

/// Fill `out` with the ids whose accumulated count reaches `thresh`.
///
/// All four algorithms emit candidates in ascending id order.
#[allow(clippy::too_many_arguments)]
pub(crate) fn collect_candidates(
    store: &PostingStore,
    keys: &[u32],
    alg: InvProcAlg,
    thresh: u32,
    skip_val: u32,
    data_qty: usize,
    counter_pool: &VectorPool<u32>,
    sort_pool: &VectorPool<u32>,
    out: &mut Vec<u32>,
) -> Result<CandidateCounters> {
    out.clear();
    for &key in keys {
        if key as usize >= store.bucket_qty() {
            return Err(IndexError::Internal(format!(
                "bucket id {key} >= bucket count {}",
                store.bucket_qty()
            )));
        }
    }

    let mut counters = CandidateCounters::default();
    match alg {
        InvProcAlg::Scan => {
            scan_counters(store, keys, thresh, skip_val, data_qty, counter_pool, out, &mut counters)
        }
        InvProcAlg::StoreSort => store_sort(store, keys, thresh, skip_val, sort_pool, out, &mut counters),
        InvProcAlg::PriorityQueue => priority_queue(store, keys, thresh, skip_val, out, &mut counters),
        InvProcAlg::Merge => merge(store, keys, thresh, skip_val, out, &mut counters),
    }
    Ok(counters)
}

/// One pass over the selected lists into a per-object counter array, then
/// one pass over the counters. O(data_qty + total postings).
#[allow(clippy::too_many_arguments)]
fn scan_counters(
    store: &PostingStore,
    keys: &[u32],
    thresh: u32,
    skip_val: u32,
    data_qty: usize,
    counter_pool: &VectorPool<u32>,
    out: &mut Vec<u32>,
    counters: &mut CandidateCounters,
) {
    let mut counter = counter_pool.loan();
    counter.resize(data_qty, 0);

    for &key in keys {
        let post = store.list(key as usize);
        counters.post_qty += post.len() as u64;
        for &id in post {
            counter[id as usize] += skip_val;
        }
    }
    for (id, &count) in counter.iter().enumerate() {
        if count >= thresh {
            out.push(id as u32);
        }
    }
}

/// Concatenate the selected lists, sort, then count runs of equal ids.
fn store_sort(
    store: &PostingStore,
    keys: &[u32],
    thresh: u32,
    skip_val: u32,
    sort_pool: &VectorPool<u32>,
    out: &mut Vec<u32>,
    counters: &mut CandidateCounters,
) {
    let mut buf = sort_pool.loan();

    let t = Instant::now();
    for &key in keys {
        let post = store.list(key as usize);
        counters.post_qty += post.len() as u64;
        buf.extend_from_slice(post);
    }
    counters.copy_post_us = t.elapsed().as_micros() as u64;

    let t = Instant::now();
    buf.sort_unstable();
    counters.sort_comp_us = t.elapsed().as_micros() as u64;

    let t = Instant::now();
    let mut start = 0;
    while start < buf.len() {
        let id = buf[start];
        let mut next = start + 1;
        while next < buf.len() && buf[next] == id {
            next += 1;
        }
        if u64::from(skip_val) * (next - start) as u64 >= u64::from(thresh) {
            out.push(id);
        }
        start = next;
    }
    counters.scan_sorted_us = t.elapsed().as_micros() as u64;
}

/// Document-at-a-time merge: a min-heap of (current id, cursor) pairs, one
/// cursor per non-empty list. All cursors sharing the minimum id are popped
/// together and their contributions accumulated before the verdict.
fn priority_queue(
    store: &PostingStore,
    keys: &[u32],
    thresh: u32,
    skip_val: u32,
    out: &mut Vec<u32>,
    counters: &mut CandidateCounters,
) {
    let mut lists: Vec<&[u32]> = Vec::with_capacity(keys.len());
    let mut positions: Vec<usize> = Vec::with_capacity(keys.len());
    let mut heap: BinaryHeap<Reverse<(u32, u32)>> = BinaryHeap::with_capacity(keys.len());

    for &key in keys {
        let post = store.list(key as usize);
        if post.is_empty() {
            continue;
        }
        let cursor = lists.len() as u32;
        lists.push(post);
        positions.push(0);
        heap.push(Reverse((post[0], cursor)));
    }

    while let Some(&Reverse((doc, _))) = heap.peek() {
        let mut accum: u64 = 0;
        let mut popped: SmallVec<[u32; 16]> = SmallVec::new();
        while let Some(&Reverse((id, cursor))) = heap.peek() {
            if id != doc {
                break;
            }
            heap.pop();
            accum += u64::from(skip_val);
            counters.post_qty += 1;
            popped.push(cursor);
        }
        if accum >= u64::from(thresh) {
            out.push(doc);
        }
        for cursor in popped {
            let pos = &mut positions[cursor as usize];
            *pos += 1;
            let post = lists[cursor as usize];
            if *pos < post.len() {
                heap.push(Reverse((post[*pos], cursor)));
            }
        }
    }
}

/// Pairwise union: fold each selected list into a running ascending
/// (id, count) list, then keep the ids that reached the threshold.
fn merge(
    store: &PostingStore,
    keys: &[u32],
    thresh: u32,
    skip_val: u32,
    out: &mut Vec<u32>,
    counters: &mut CandidateCounters,
) {
    let mut current: Vec<(u32, u32)> = Vec::new();
    let mut next: Vec<(u32, u32)> = Vec::new();

    for &key in keys {
        let post = store.list(key as usize);
        counters.post_qty += post.len() as u64;
        post_list_union(&current, post, &mut next, skip_val);
        std::mem::swap(&mut current, &mut next);
    }
    for &(id, count) in &current {
        if count >= thresh {
            out.push(id);
        }
    }
}

/// Merge an (id, count) list with a posting list: matching ids gain
/// `skip_val`, new ids enter with `skip_val`. Both inputs are ascending and
/// duplicate free, so is the output.
fn post_list_union(current: &[(u32, u32)], post: &[u32], out: &mut Vec<(u32, u32)>, skip_val: u32) {
    out.clear();
    out.reserve(current.len() + post.len());
    let (mut i, mut j) = (0, 0);
    while i < current.len() && j < post.len() {
        match current[i].0.cmp(&post[j]) {
            std::cmp::Ordering::Less => {
                out.push(current[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push((post[j], skip_val));
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push((current[i].0, current[i].1 + skip_val));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&current[i..]);
    out.extend(post[j..].iter().map(|&id| (id, skip_val)));
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALGS: [InvProcAlg; 4] = [
        InvProcAlg::Scan,
        InvProcAlg::StoreSort,
        InvProcAlg::PriorityQueue,
        InvProcAlg::Merge,
    ];

    fn run(
        store: &PostingStore,
        keys: &[u32],
        alg: InvProcAlg,
        thresh: u32,
        skip_val: u32,
        data_qty: usize,
    ) -> Vec<u32> {
        let counter_pool = VectorPool::new(1, data_qty);
        let sort_pool = VectorPool::new(1, 64);
        let mut out = Vec::new();
        collect_candidates(
            store, keys, alg, thresh, skip_val, data_qty, &counter_pool, &sort_pool, &mut out,
        )
        .unwrap();
        out
    }

    fn demo_store() -> PostingStore {
        PostingStore::from_lists(vec![
            vec![0, 2, 5, 9],
            vec![2, 5],
            vec![],
            vec![1, 2, 9],
            vec![5],
        ])
    }

    #[test]
    fn algorithms_agree_on_candidates() {
        let store = demo_store();
        let keys = [0, 1, 2, 3, 4];
        for thresh in 1..=4 {
            let expected = run(&store, &keys, InvProcAlg::Scan, thresh, 1, 10);
            for alg in ALGS {
                assert_eq!(
                    run(&store, &keys, alg, thresh, 1, 10),
                    expected,
                    "{alg} disagrees at thresh={thresh}"
                );
            }
        }
    }

    #[test]
    fn threshold_filters_by_accumulated_count() {
        let store = demo_store();
        // id 2 appears in lists 0, 1, 3; id 5 in 0, 1, 4; id 9 in 0, 3.
        let cands = run(&store, &[0, 1, 2, 3, 4], InvProcAlg::StoreSort, 3, 1, 10);
        assert_eq!(cands, vec![2, 5]);
        let cands = run(&store, &[0, 1, 2, 3, 4], InvProcAlg::PriorityQueue, 2, 1, 10);
        assert_eq!(cands, vec![2, 5, 9]);
    }

    #[test]
    fn skip_val_scales_accumulation() {
        let store = demo_store();
        for alg in ALGS {
            // Each hit counts 3, so thresh 6 needs two shared lists.
            let cands = run(&store, &[0, 1, 3], alg, 6, 3, 10);
            assert_eq!(cands, vec![2, 5, 9], "{alg}");
        }
    }

    #[test]
    fn empty_key_set_yields_no_candidates() {
        let store = demo_store();
        for alg in ALGS {
            assert!(run(&store, &[], alg, 1, 1, 10).is_empty(), "{alg}");
        }
    }

    #[test]
    fn repeated_keys_double_count() {
        // A query may legitimately hit one bucket through one combination
        // only, but the algorithms must honor whatever key multiset the
        // encoder hands them.
        let store = demo_store();
        for alg in ALGS {
            let cands = run(&store, &[1, 1], alg, 2, 1, 10);
            assert_eq!(cands, vec![2, 5], "{alg}");
        }
    }

    #[test]
    fn out_of_range_bucket_is_an_internal_error() {
        let store = demo_store();
        let counter_pool = VectorPool::new(1, 10);
        let sort_pool = VectorPool::new(1, 8);
        let mut out = Vec::new();
        let err = collect_candidates(
            &store,
            &[99],
            InvProcAlg::Scan,
            1,
            1,
            10,
            &counter_pool,
            &sort_pool,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::Internal(_)));
    }

    #[test]
    fn union_merges_counts() {
        let mut out = Vec::new();
        post_list_union(&[(1, 2), (4, 1)], &[1, 2, 9], &mut out, 1);
        assert_eq!(out, vec![(1, 3), (2, 1), (4, 1), (9, 1)]);
    }

    #[test]
    fn threshold_scaling_by_combination_order() {
        assert_eq!(scaled_threshold(2, 32, 1), 2);
        assert_eq!(scaled_threshold(2, 3, 2), 2);
        assert_eq!(scaled_threshold(2, 32, 2), 31);
        assert_eq!(scaled_threshold(2, 32, 3), 310);
        // Integer truncation happens after the multiply.
        assert_eq!(scaled_threshold(3, 4, 2), 4);
        // Degenerate prefixes clamp to 1 instead of 0.
        assert_eq!(scaled_threshold(1, 2, 2), 1);
        assert_eq!(scaled_threshold(1, 0, 3), 1);
    }
}
