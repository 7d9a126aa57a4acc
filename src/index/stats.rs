//! Aggregated search-time statistics.
//!
//! Counters are accumulated per query into a [`QueryCounters`] on the
//! stack, then folded into the shared [`SearchStats`] under one short-lived
//! lock after the hot section. Failed searches contribute nothing.

/// Cumulative statistics over all completed searches.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Searches completed.
    pub proc_query_qty: u64,
    /// Posting entries touched while generating candidates.
    pub post_qty: u64,
    pub search_time_us: u64,
    pub dist_pivot_comp_time_us: u64,
    pub ids_gen_time_us: u64,
    /// Posting copy time (store-sort only).
    pub copy_post_time_us: u64,
    /// Sort time (store-sort only).
    pub sort_comp_time_us: u64,
    /// Sorted-scan time (store-sort only).
    pub scan_sorted_time_us: u64,
    /// True-distance re-ranking time.
    pub dist_comp_time_us: u64,
}

impl SearchStats {
    pub(crate) fn record(&mut self, q: &QueryCounters) {
        self.proc_query_qty += 1;
        self.post_qty += q.post_qty;
        self.search_time_us += q.search_us;
        self.dist_pivot_comp_time_us += q.dist_pivot_us;
        self.ids_gen_time_us += q.ids_gen_us;
        self.copy_post_time_us += q.copy_post_us;
        self.sort_comp_time_us += q.sort_comp_us;
        self.scan_sorted_time_us += q.scan_sorted_us;
        self.dist_comp_time_us += q.dist_comp_us;
    }

    /// Mean posting entries touched per search.
    pub fn avg_postings_per_query(&self) -> f64 {
        if self.proc_query_qty == 0 {
            0.0
        } else {
            self.post_qty as f64 / self.proc_query_qty as f64
        }
    }
}

/// One search's worth of counters.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct QueryCounters {
    pub post_qty: u64,
    pub search_us: u64,
    pub dist_pivot_us: u64,
    pub ids_gen_us: u64,
    pub copy_post_us: u64,
    pub sort_comp_us: u64,
    pub scan_sorted_us: u64,
    pub dist_comp_us: u64,
}
