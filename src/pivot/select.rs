//! Pivot selection.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use crate::{IndexError, Result};

/// Sample `n` distinct pivots from the dataset.
///
/// Returns the cloned pivot objects together with their dataset positions
/// (the positions are what persistence records). A fixed `seed` makes the
/// selection, and with it the whole build, reproducible.
pub fn sample_pivots<O: Clone>(data: &[O], n: usize, seed: Option<u64>) -> Result<(Vec<O>, Vec<u32>)> {
    if data.len() < n {
        return Err(IndexError::Data(format!(
            "cannot sample {n} pivots from {} objects",
            data.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(|| rand::rng().random()));
    let mut positions: Vec<u32> = sample(&mut rng, data.len(), n)
        .into_iter()
        .map(|p| p as u32)
        .collect();
    positions.sort_unstable();
    let pivots = positions.iter().map(|&p| data[p as usize].clone()).collect();
    Ok((pivots, positions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_distinct_positions() {
        let data: Vec<u32> = (0..100).collect();
        let (pivots, positions) = sample_pivots(&data, 10, Some(42)).unwrap();
        assert_eq!(pivots.len(), 10);
        assert_eq!(positions.len(), 10);
        let mut dedup = positions.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), 10);
        for (pivot, &pos) in pivots.iter().zip(&positions) {
            assert_eq!(*pivot, data[pos as usize]);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let data: Vec<u32> = (0..50).collect();
        let (_, a) = sample_pivots(&data, 8, Some(7)).unwrap();
        let (_, b) = sample_pivots(&data, 8, Some(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_short_dataset() {
        let data: Vec<u32> = (0..3).collect();
        assert!(matches!(
            sample_pivots(&data, 4, Some(0)),
            Err(IndexError::Data(_))
        ));
    }
}
