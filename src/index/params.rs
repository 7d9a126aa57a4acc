//! Build-time and query-time configuration.
//!
//! Parameters come in two layers: typed structs with defaults for in-process
//! callers, and a string-pair constructor (`from_pairs`) for callers driving
//! the index from config files or command lines. The string layer is strict:
//! unknown keys, unparsable values, and contradictory aliases are all
//! configuration errors.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{IndexError, Result};

/// Candidate-generation algorithm over the query's posting lists.
///
/// All four produce the same candidate set; the choice is a performance
/// knob. Dispatch happens once per query, outside the hot loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvProcAlg {
    /// Per-object counter array, one pass over the selected lists.
    Scan,
    /// Concatenate the selected lists, sort, count runs. Preferred default.
    StoreSort,
    /// Document-at-a-time merge over a min-heap of list cursors.
    PriorityQueue,
    /// Pairwise union of (id, count) lists.
    Merge,
}

impl Default for InvProcAlg {
    fn default() -> Self {
        Self::StoreSort
    }
}

impl FromStr for InvProcAlg {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan" => Ok(Self::Scan),
            "store-sort" => Ok(Self::StoreSort),
            "priority-queue" => Ok(Self::PriorityQueue),
            "merge" => Ok(Self::Merge),
            other => Err(IndexError::Config(format!(
                "unknown inverted-processing algorithm '{other}' \
                 (expected scan | store-sort | merge | priority-queue)"
            ))),
        }
    }
}

impl fmt::Display for InvProcAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scan => "scan",
            Self::StoreSort => "store-sort",
            Self::PriorityQueue => "priority-queue",
            Self::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Build-time parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotCombParams {
    /// Pivot set size N.
    pub num_pivot: usize,
    /// Permutation prefix length used at build time; <= num_pivot.
    pub num_prefix: usize,
    /// Combination order k: 1, 2, or 3.
    pub pivot_comb_qty: u32,
    /// Sparsification divisor on bucket ids; 1 keeps everything.
    pub skip_val: u32,
    /// Worker threads for the build pipeline.
    pub index_thread_qty: usize,
    /// External pivot source. None samples pivots from the dataset.
    pub pivot_file: Option<PathBuf>,
    /// Seed for pivot sampling. None draws one from thread-local entropy.
    pub pivot_seed: Option<u64>,
    /// Accepted for parameter-surface compatibility; has no effect.
    pub hash_trick_dim: usize,
    /// Force brute-force pivot distances even when an accelerated
    /// pivot index would be available.
    pub disable_pivot_index: bool,
    /// Log posting-occupancy statistics after the build.
    pub print_pivot_stat: bool,
}

impl Default for PivotCombParams {
    fn default() -> Self {
        Self {
            num_pivot: 512,
            num_prefix: 32,
            pivot_comb_qty: 2,
            skip_val: 1,
            index_thread_qty: default_thread_qty(),
            pivot_file: None,
            pivot_seed: None,
            hash_trick_dim: 0,
            disable_pivot_index: false,
            print_pivot_stat: false,
        }
    }
}

fn default_thread_qty() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl PivotCombParams {
    /// Build parameters from string key/value pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut params = Self::default();
        for &(key, value) in pairs {
            match key {
                "num_pivot" => params.num_pivot = parse_value(key, value)?,
                "num_prefix" => params.num_prefix = parse_value(key, value)?,
                "pivot_comb_qty" => params.pivot_comb_qty = parse_value(key, value)?,
                "skip_val" => params.skip_val = parse_value(key, value)?,
                "index_thread_qty" => params.index_thread_qty = parse_value(key, value)?,
                "pivot_file" => {
                    params.pivot_file = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                "pivot_seed" => params.pivot_seed = Some(parse_value(key, value)?),
                "hash_trick_dim" => params.hash_trick_dim = parse_value(key, value)?,
                "disable_pivot_index" => params.disable_pivot_index = parse_bool(key, value)?,
                "print_pivot_stat" => params.print_pivot_stat = parse_bool(key, value)?,
                other => {
                    return Err(IndexError::Config(format!(
                        "unknown build parameter '{other}'"
                    )))
                }
            }
        }
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_pivot == 0 {
            return Err(IndexError::Config("num_pivot must be >= 1".into()));
        }
        if !(1..=3).contains(&self.pivot_comb_qty) {
            return Err(IndexError::Config(format!(
                "pivot_comb_qty must be 1, 2, or 3, got {}",
                self.pivot_comb_qty
            )));
        }
        if self.skip_val == 0 {
            return Err(IndexError::Config("skip_val must be >= 1".into()));
        }
        if self.index_thread_qty == 0 {
            return Err(IndexError::Config("index_thread_qty must be >= 1".into()));
        }
        if self.num_prefix > self.num_pivot {
            return Err(IndexError::Config(format!(
                "num_prefix ({}) must be <= num_pivot ({})",
                self.num_prefix, self.num_pivot
            )));
        }
        let buckets =
            crate::pivot::max_posting_qty(self.num_pivot, self.pivot_comb_qty, self.skip_val);
        if buckets > u32::MAX as u64 {
            return Err(IndexError::Config(format!(
                "num_pivot={} with pivot_comb_qty={} and skip_val={} needs {buckets} buckets, \
                 which exceeds the 32-bit key range",
                self.num_pivot, self.pivot_comb_qty, self.skip_val
            )));
        }
        Ok(())
    }
}

/// Query-time parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PivotCombQueryParams {
    /// Permutation prefix length used at query time; <= num_pivot.
    /// None means "same as the build-time num_prefix".
    pub num_prefix_search: Option<usize>,
    /// Threshold base: minimum shared close pivots, in single-pivot terms.
    /// None means the default of 2.
    pub min_times: Option<u32>,
    /// Posting-list intersection algorithm.
    pub inv_proc_alg: InvProcAlg,
    /// Return candidates without true-distance re-ranking.
    pub skip_checking: bool,
}

impl PivotCombQueryParams {
    pub const DEFAULT_MIN_TIMES: u32 = 2;

    /// Build query parameters from string key/value pairs.
    ///
    /// `min_times` and `num_pivot_search` are synonyms; specifying both with
    /// different values is a configuration error.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut params = Self::default();
        let mut alias_min_times: Option<u32> = None;
        for &(key, value) in pairs {
            match key {
                "num_prefix_search" => params.num_prefix_search = Some(parse_value(key, value)?),
                "min_times" => params.min_times = Some(parse_value(key, value)?),
                "num_pivot_search" => alias_min_times = Some(parse_value(key, value)?),
                "inv_proc_alg" => params.inv_proc_alg = value.parse()?,
                "skip_checking" => params.skip_checking = parse_bool(key, value)?,
                other => {
                    return Err(IndexError::Config(format!(
                        "unknown query parameter '{other}'"
                    )))
                }
            }
        }
        match (params.min_times, alias_min_times) {
            (Some(a), Some(b)) if a != b => {
                return Err(IndexError::Config(format!(
                    "min_times ({a}) and its alias num_pivot_search ({b}) disagree"
                )));
            }
            (None, Some(b)) => params.min_times = Some(b),
            _ => {}
        }
        Ok(params)
    }

    pub fn min_times_or_default(&self) -> u32 {
        self.min_times.unwrap_or(Self::DEFAULT_MIN_TIMES)
    }

    pub fn validate(&self, num_pivot: usize) -> Result<()> {
        if let Some(p) = self.num_prefix_search {
            if p > num_pivot {
                return Err(IndexError::Config(format!(
                    "num_prefix_search ({p}) must be <= num_pivot ({num_pivot})"
                )));
            }
        }
        if self.min_times_or_default() == 0 {
            return Err(IndexError::Config("min_times must be >= 1".into()));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IndexError::Config(format!("cannot parse '{value}' for parameter '{key}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(IndexError::Config(format!(
            "cannot parse '{other}' as a boolean for parameter '{key}'"
        ))),
    }
}
