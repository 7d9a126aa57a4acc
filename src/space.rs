//! Distance-space abstraction.
//!
//! The index core never looks inside an object; it only asks a [`Space`] for
//! distances and for dataset loading. The distance does not have to be a
//! metric — permutation-based indexing works for quasi-metric and other
//! non-metric dissimilarities as long as "smaller means closer" holds.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{IndexError, Result};

/// A dissimilarity space over opaque objects.
///
/// Implementations must be thread-safe: the build pipeline computes
/// pivot distances from several worker threads at once.
pub trait Space: Send + Sync {
    /// The object type this space measures.
    type Object: Send + Sync;

    /// Dissimilarity between two objects. Smaller means closer.
    fn distance(&self, a: &Self::Object, b: &Self::Object) -> f32;

    /// Read up to `n` objects from an external file (e.g. a pivot file).
    fn read_dataset(&self, path: &Path, n: usize) -> Result<Vec<Self::Object>>;
}

/// Dense vectors under squared Euclidean distance.
///
/// Squared L2 preserves neighbor ordering and skips the square root, which
/// is all an ANN index needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseL2Space;

impl DenseL2Space {
    pub fn new() -> Self {
        Self
    }
}

fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

impl Space for DenseL2Space {
    type Object = Vec<f32>;

    fn distance(&self, a: &Self::Object, b: &Self::Object) -> f32 {
        l2_distance_squared(a, b)
    }

    /// Reads whitespace-separated float vectors, one per line. Blank lines
    /// are skipped. All vectors must share one dimension.
    fn read_dataset(&self, path: &Path, n: usize) -> Result<Vec<Self::Object>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut out: Vec<Vec<f32>> = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            if out.len() >= n {
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let vector: Vec<f32> = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f32>().map_err(|_| {
                        IndexError::Data(format!(
                            "{}:{}: not a float: '{tok}'",
                            path.display(),
                            line_no + 1
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            if let Some(first) = out.first() {
                if first.len() != vector.len() {
                    return Err(IndexError::Data(format!(
                        "{}:{}: dimension mismatch: {} vs {}",
                        path.display(),
                        line_no + 1,
                        vector.len(),
                        first.len()
                    )));
                }
            }
            out.push(vector);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn l2_squared_basic() {
        let space = DenseL2Space::new();
        assert_eq!(space.distance(&vec![0.0, 0.0], &vec![3.0, 4.0]), 25.0);
        assert_eq!(space.distance(&vec![1.0], &vec![1.0]), 0.0);
    }

    #[test]
    fn read_dataset_parses_vectors() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "0.5 1.0 1.5").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "2.0 2.5 3.0").unwrap();
        f.flush().unwrap();

        let space = DenseL2Space::new();
        let data = space.read_dataset(f.path(), 10).unwrap();
        assert_eq!(data, vec![vec![0.5, 1.0, 1.5], vec![2.0, 2.5, 3.0]]);

        // Truncated read honors n.
        let one = space.read_dataset(f.path(), 1).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn read_dataset_rejects_ragged_rows() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "1.0 2.0").unwrap();
        writeln!(f, "3.0").unwrap();
        f.flush().unwrap();

        let err = DenseL2Space::new().read_dataset(f.path(), 10).unwrap_err();
        assert!(matches!(err, IndexError::Data(_)));
    }
}
