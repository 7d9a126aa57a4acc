//! Combination-key encoding.
//!
//! Every unordered k-tuple of distinct pivot ids maps to a unique integer
//! via the combinatorial number system: for a < b < c,
//!
//! ```text
//! k=1:  a
//! k=2:  b(b-1)/2 + a
//! k=3:  c(c-1)(c-2)/6 + b(b-1)/2 + a
//! ```
//!
//! Each map is a bijection onto a contiguous range (`[0, C(N,k))` for N
//! pivots), so posting lists can live in a flat array indexed by key — no
//! hash map, no collision handling. Sparsification keeps only keys
//! divisible by `skip_val` and divides them down, which shrinks the bucket
//! range by the same factor.

use crate::{IndexError, Result};

use super::permutation::PivotId;

/// Canonical index of the unordered pair {x, y}, x != y.
#[inline]
pub fn pair_index(x: PivotId, y: PivotId) -> u64 {
    let (lo, hi) = if x < y { (x, y) } else { (y, x) };
    let hi = hi as u64;
    hi * (hi - 1) / 2 + lo as u64
}

/// Canonical index of the unordered triple {x, y, z}, all distinct.
#[inline]
pub fn triple_index(x: PivotId, y: PivotId, z: PivotId) -> u64 {
    let mut v = [x, y, z];
    v.sort_unstable();
    let (a, b, c) = (v[0] as u64, v[1] as u64, v[2] as u64);
    c * (c - 1) * (c - 2) / 6 + b * (b - 1) / 2 + a
}

/// Number of distinct combination keys for `num_pivot` pivots, combination
/// order `comb_qty`, before sparsification.
fn comb_count(num_pivot: usize, comb_qty: u32) -> u64 {
    let n = num_pivot as u64;
    match comb_qty {
        1 => n,
        2 => n * n.saturating_sub(1) / 2,
        3 => n * n.saturating_sub(1) * n.saturating_sub(2) / 6,
        _ => unreachable!("combination order is validated to 1..=3"),
    }
}

/// Size of the posting-list array: the number of bucket ids that survive
/// sparsification, `ceil(C(N, k) / skip_val)`.
pub fn max_posting_qty(num_pivot: usize, comb_qty: u32, skip_val: u32) -> u64 {
    let total = comb_count(num_pivot, comb_qty);
    total.div_ceil(skip_val as u64)
}

/// Encoder from permutation prefixes to sparsified bucket ids.
#[derive(Debug, Clone, Copy)]
pub struct CombinationEncoder {
    comb_qty: u32,
    skip_val: u32,
}

impl CombinationEncoder {
    pub fn new(comb_qty: u32, skip_val: u32) -> Result<Self> {
        if !(1..=3).contains(&comb_qty) {
            return Err(IndexError::Config(format!(
                "pivot_comb_qty must be 1, 2, or 3, got {comb_qty}"
            )));
        }
        if skip_val == 0 {
            return Err(IndexError::Config("skip_val must be >= 1".into()));
        }
        Ok(Self { comb_qty, skip_val })
    }

    pub fn comb_qty(&self) -> u32 {
        self.comb_qty
    }

    pub fn skip_val(&self) -> u32 {
        self.skip_val
    }

    /// Bucket ids this encoder can emit for a pivot set of size `num_pivot`.
    pub fn bucket_qty(&self, num_pivot: usize) -> u64 {
        max_posting_qty(num_pivot, self.comb_qty, self.skip_val)
    }

    /// Combinations per object for a prefix of length `prefix_len`, before
    /// sparsification. Drives posting-size estimates.
    pub fn combs_per_object(&self, prefix_len: usize) -> u64 {
        comb_count(prefix_len, self.comb_qty)
    }

    /// Emit the surviving bucket ids of every k-combination of `prefix`
    /// into `out` (cleared first). The enumeration is naturally duplicate
    /// free; emission order is unspecified.
    pub fn encode(&self, prefix: &[PivotId], out: &mut Vec<u32>) {
        out.clear();
        let skip = self.skip_val as u64;
        match self.comb_qty {
            1 => {
                for &p in prefix {
                    self.push_if_kept(p as u64, skip, out);
                }
            }
            2 => {
                for j in 1..prefix.len() {
                    for k in 0..j {
                        self.push_if_kept(pair_index(prefix[j], prefix[k]), skip, out);
                    }
                }
            }
            3 => {
                for j in 2..prefix.len() {
                    for k in 1..j {
                        for l in 0..k {
                            self.push_if_kept(
                                triple_index(prefix[j], prefix[k], prefix[l]),
                                skip,
                                out,
                            );
                        }
                    }
                }
            }
            _ => unreachable!("combination order is validated to 1..=3"),
        }
    }

    #[inline]
    fn push_if_kept(&self, index: u64, skip: u64, out: &mut Vec<u32>) {
        if index % skip == 0 {
            out.push((index / skip) as u32);
        }
    }
}
