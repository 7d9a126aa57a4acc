//! Permutation construction.
//!
//! A permutation of an object is the list of pivot ids ordered by ascending
//! distance from that object. Only a prefix of it is consumed downstream,
//! but the pivot count is small enough that sorting all of it is cheaper
//! than a partial selection.

/// Pivot identifier: an index into the pivot set.
pub type PivotId = u32;

/// Fill `out` with pivot ids sorted ascending by `dists[id]`.
///
/// Ties are broken by ascending pivot id, so equal-distance pivots always
/// land in the same order and rebuilt indexes come out identical.
pub fn permutation_from_distances(dists: &[f32], out: &mut Vec<PivotId>) {
    out.clear();
    out.extend(0..dists.len() as PivotId);
    out.sort_unstable_by(|&a, &b| {
        dists[a as usize]
            .total_cmp(&dists[b as usize])
            .then_with(|| a.cmp(&b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_distance() {
        let mut perm = Vec::new();
        permutation_from_distances(&[3.0, 1.0, 2.0], &mut perm);
        assert_eq!(perm, vec![1, 2, 0]);
    }

    #[test]
    fn ties_break_by_pivot_id() {
        let mut perm = Vec::new();
        permutation_from_distances(&[2.0, 1.0, 2.0, 1.0], &mut perm);
        assert_eq!(perm, vec![1, 3, 0, 2]);
    }

    #[test]
    fn reuses_buffer() {
        let mut perm = vec![9, 9, 9, 9, 9];
        permutation_from_distances(&[0.5, 0.25], &mut perm);
        assert_eq!(perm, vec![1, 0]);
    }

    #[test]
    fn empty_distances() {
        let mut perm = Vec::new();
        permutation_from_distances(&[], &mut perm);
        assert!(perm.is_empty());
    }
}
