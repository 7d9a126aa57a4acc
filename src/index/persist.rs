//! Index persistence.
//!
//! A line-oriented text format: a fixed header of `name: value` fields, the
//! pivot identity (dataset positions, or the pivot file to re-read), one
//! line per posting list, and a trailing line count. The trailer makes
//! truncated files detectable before any list is trusted.
//!
//! The dataset itself is not persisted; `load` pairs the file with the same
//! dataset the index was built on and cross-checks `data_qty` to catch
//! mismatches.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::pivot::max_posting_qty;
use crate::space::Space;
use crate::{IndexError, Result};

use super::{PivotCombIndex, PivotCombParams, METHOD_NAME};

const FORMAT_VERSION: u32 = 1;

impl<S: Space> PivotCombIndex<S> {
    /// Save the index. Fails for indexes built from explicit pivots: they
    /// have no stable external identity to record.
    pub fn save(&self, path: &Path) -> Result<()> {
        enum PivotSource<'a> {
            Positions(&'a [u32]),
            File(&'a Path),
        }
        let source = match (&self.pivot_positions, &self.params.pivot_file) {
            (Some(positions), _) => PivotSource::Positions(positions),
            (None, Some(file)) => PivotSource::File(file),
            (None, None) => {
                return Err(IndexError::Persist(
                    "index built from explicit pivots cannot be saved".into(),
                ))
            }
        };

        let mut w = BufWriter::new(File::create(path)?);
        let mut line_qty: u64 = 0;

        let seed = match self.params.pivot_seed {
            Some(seed) => seed.to_string(),
            None => "none".into(),
        };

        write_field(&mut w, &mut line_qty, "method", METHOD_NAME)?;
        write_field(&mut w, &mut line_qty, "format_version", FORMAT_VERSION)?;
        write_field(&mut w, &mut line_qty, "num_pivot", self.params.num_pivot)?;
        write_field(&mut w, &mut line_qty, "num_prefix", self.params.num_prefix)?;
        write_field(&mut w, &mut line_qty, "pivot_comb_qty", self.params.pivot_comb_qty)?;
        write_field(&mut w, &mut line_qty, "skip_val", self.params.skip_val)?;
        write_field(&mut w, &mut line_qty, "index_thread_qty", self.params.index_thread_qty)?;
        write_field(&mut w, &mut line_qty, "pivot_seed", seed)?;
        write_field(&mut w, &mut line_qty, "hash_trick_dim", self.params.hash_trick_dim)?;
        write_field(
            &mut w,
            &mut line_qty,
            "disable_pivot_index",
            self.params.disable_pivot_index,
        )?;
        write_field(
            &mut w,
            &mut line_qty,
            "print_pivot_stat",
            self.params.print_pivot_stat,
        )?;
        write_field(&mut w, &mut line_qty, "data_qty", self.data.len())?;

        match source {
            PivotSource::Positions(positions) => {
                write_field(&mut w, &mut line_qty, "pivot_source", "positions")?;
                let joined = positions
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(w, "{joined}")?;
                line_qty += 1;
            }
            PivotSource::File(file) => {
                write_field(&mut w, &mut line_qty, "pivot_source", "file")?;
                write_field(&mut w, &mut line_qty, "pivot_file", file.display())?;
            }
        }

        write_field(&mut w, &mut line_qty, "post_qty", self.store.bucket_qty())?;
        for list in self.store.lists() {
            let joined = list.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
            writeln!(w, "{joined}")?;
            line_qty += 1;
        }

        writeln!(w, "line_qty: {}", line_qty + 1)?;
        w.flush()?;
        Ok(())
    }
}

impl<S: Space> PivotCombIndex<S>
where
    S::Object: Clone,
{
    /// Load an index previously written by [`save`](Self::save), pairing it
    /// with the dataset it was built on.
    pub fn load(space: S, data: Vec<S::Object>, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = contents.lines().collect();

        let trailer = lines
            .last()
            .copied()
            .ok_or_else(|| IndexError::Persist("index file is empty".into()))?;
        let line_qty: usize = parse_named(trailer, "line_qty")?;
        if line_qty != lines.len() {
            return Err(IndexError::Persist(format!(
                "truncated index file: trailer says {line_qty} lines, found {}",
                lines.len()
            )));
        }

        let mut cursor = FieldCursor { lines: &lines, pos: 0 };

        let method: String = cursor.field("method")?;
        if method != METHOD_NAME {
            return Err(IndexError::Persist(format!(
                "index was created by a different method: '{method}'"
            )));
        }
        let version: u32 = cursor.field("format_version")?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Persist(format!(
                "unsupported format version {version}"
            )));
        }

        let num_pivot: usize = cursor.field("num_pivot")?;
        let num_prefix: usize = cursor.field("num_prefix")?;
        let pivot_comb_qty: u32 = cursor.field("pivot_comb_qty")?;
        let skip_val: u32 = cursor.field("skip_val")?;
        let index_thread_qty: usize = cursor.field("index_thread_qty")?;
        let seed: String = cursor.field("pivot_seed")?;
        let pivot_seed = match seed.as_str() {
            "none" => None,
            value => Some(value.parse::<u64>().map_err(|_| {
                IndexError::Persist(format!("cannot parse '{value}' for field 'pivot_seed'"))
            })?),
        };
        let hash_trick_dim: usize = cursor.field("hash_trick_dim")?;
        let disable_pivot_index: bool = cursor.field("disable_pivot_index")?;
        let print_pivot_stat: bool = cursor.field("print_pivot_stat")?;
        let data_qty: usize = cursor.field("data_qty")?;
        if data_qty != data.len() {
            return Err(IndexError::Data(format!(
                "index was built on {data_qty} objects but the dataset has {}",
                data.len()
            )));
        }

        let source: String = cursor.field("pivot_source")?;
        let (pivots, pivot_positions, pivot_file) = match source.as_str() {
            "positions" => {
                let line = cursor.raw_line()?;
                let positions: Vec<u32> = split_ids(line)?;
                if positions.len() != num_pivot {
                    return Err(IndexError::Persist(format!(
                        "expected {num_pivot} pivot positions, found {}",
                        positions.len()
                    )));
                }
                let mut pivots = Vec::with_capacity(num_pivot);
                for &pos in &positions {
                    let obj = data.get(pos as usize).ok_or_else(|| {
                        IndexError::Persist(format!(
                            "pivot position {pos} >= dataset size {}",
                            data.len()
                        ))
                    })?;
                    pivots.push(obj.clone());
                }
                (pivots, Some(positions), None)
            }
            "file" => {
                let file = PathBuf::from(cursor.field::<String>("pivot_file")?);
                let pivots = space.read_dataset(&file, num_pivot)?;
                if pivots.len() < num_pivot {
                    return Err(IndexError::Data(format!(
                        "pivot file '{}' holds {} objects, need {num_pivot}",
                        file.display(),
                        pivots.len()
                    )));
                }
                (pivots, None, Some(file))
            }
            other => {
                return Err(IndexError::Persist(format!(
                    "unknown pivot_source '{other}'"
                )))
            }
        };

        let post_qty: usize = cursor.field("post_qty")?;
        let expected = max_posting_qty(num_pivot, pivot_comb_qty, skip_val);
        if post_qty as u64 != expected {
            return Err(IndexError::Persist(format!(
                "post_qty {post_qty} does not match the expected bucket count {expected}"
            )));
        }

        let mut posting_lists: Vec<Vec<u32>> = Vec::with_capacity(post_qty);
        for _ in 0..post_qty {
            let list = split_ids(cursor.raw_line()?)?;
            for pair in list.windows(2) {
                if pair[0] >= pair[1] {
                    return Err(IndexError::Persist(format!(
                        "posting list {} is not strictly ascending",
                        posting_lists.len()
                    )));
                }
            }
            if let Some(&last) = list.last() {
                if last as usize >= data_qty {
                    return Err(IndexError::Persist(format!(
                        "object id {last} >= dataset size {data_qty}"
                    )));
                }
            }
            posting_lists.push(list);
        }

        // Everything after the lists must be exactly the trailer.
        if cursor.pos != lines.len() - 1 {
            return Err(IndexError::Persist(format!(
                "{} unexpected lines before the trailer",
                lines.len() - 1 - cursor.pos
            )));
        }

        let params = PivotCombParams {
            num_pivot,
            num_prefix,
            pivot_comb_qty,
            skip_val,
            index_thread_qty,
            pivot_file,
            pivot_seed,
            hash_trick_dim,
            disable_pivot_index,
            print_pivot_stat,
        };
        params.validate()?;

        Self::assemble(space, data, pivots, pivot_positions, params, Some(posting_lists))
    }
}

fn write_field<W: Write>(
    w: &mut W,
    line_qty: &mut u64,
    name: &str,
    value: impl Display,
) -> Result<()> {
    writeln!(w, "{name}: {value}")?;
    *line_qty += 1;
    Ok(())
}

struct FieldCursor<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn raw_line(&mut self) -> Result<&'a str> {
        let line = self
            .lines
            .get(self.pos)
            .copied()
            .ok_or_else(|| IndexError::Persist("unexpected end of index file".into()))?;
        self.pos += 1;
        Ok(line)
    }

    fn field<T: std::str::FromStr>(&mut self, name: &str) -> Result<T> {
        let line = self.raw_line()?;
        parse_named(line, name)
    }
}

fn parse_named<T: std::str::FromStr>(line: &str, name: &str) -> Result<T> {
    let value = line
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(": "))
        .ok_or_else(|| {
            IndexError::Persist(format!("expected field '{name}', found '{line}'"))
        })?;
    value
        .parse()
        .map_err(|_| IndexError::Persist(format!("cannot parse '{value}' for field '{name}'")))
}

fn split_ids(line: &str) -> Result<Vec<u32>> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| IndexError::Persist(format!("not an object id: '{tok}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PivotCombQueryParams;
    use crate::space::DenseL2Space;

    fn line_dataset() -> Vec<Vec<f32>> {
        (0..20).map(|i| vec![i as f32]).collect()
    }

    fn small_params() -> PivotCombParams {
        PivotCombParams {
            num_pivot: 5,
            num_prefix: 3,
            pivot_comb_qty: 2,
            index_thread_qty: 2,
            pivot_seed: Some(11),
            disable_pivot_index: true,
            ..Default::default()
        }
    }

    fn build_small() -> PivotCombIndex<DenseL2Space> {
        PivotCombIndex::build(DenseL2Space::new(), line_dataset(), small_params()).unwrap()
    }

    #[test]
    fn save_load_round_trip() {
        let index = build_small();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        index.save(&path).unwrap();

        let loaded = PivotCombIndex::load(DenseL2Space::new(), line_dataset(), &path).unwrap();

        assert_eq!(loaded.bucket_qty(), index.bucket_qty());
        for b in 0..index.bucket_qty() as u32 {
            assert_eq!(loaded.posting_list(b), index.posting_list(b));
        }

        // Every build-time parameter survives the round trip.
        let (before, after) = (index.build_params(), loaded.build_params());
        assert_eq!(after.num_pivot, before.num_pivot);
        assert_eq!(after.num_prefix, before.num_prefix);
        assert_eq!(after.pivot_comb_qty, before.pivot_comb_qty);
        assert_eq!(after.skip_val, before.skip_val);
        assert_eq!(after.index_thread_qty, before.index_thread_qty);
        assert_eq!(after.pivot_file, before.pivot_file);
        assert_eq!(after.pivot_seed, before.pivot_seed);
        assert_eq!(after.hash_trick_dim, before.hash_trick_dim);
        assert_eq!(after.disable_pivot_index, before.disable_pivot_index);
        assert_eq!(after.print_pivot_stat, before.print_pivot_stat);

        // Same query, same answers.
        let qp = PivotCombQueryParams {
            min_times: Some(1),
            ..Default::default()
        };
        let mut a = index;
        let mut b = loaded;
        a.set_query_params(&qp).unwrap();
        b.set_query_params(&qp).unwrap();
        let target = vec![7.4f32];
        assert_eq!(a.candidates(&target).unwrap(), b.candidates(&target).unwrap());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let index = build_small();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        index.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let keep: Vec<&str> = contents.lines().collect();
        let cut = keep[..keep.len() - 2].join("\n");
        std::fs::write(&path, cut).unwrap();

        let err = PivotCombIndex::load(DenseL2Space::new(), line_dataset(), &path).unwrap_err();
        assert!(matches!(err, IndexError::Persist(_)), "{err}");
    }

    #[test]
    fn foreign_method_tag_is_rejected() {
        let index = build_small();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        index.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let swapped = contents.replacen(METHOD_NAME, "some-other-method", 1);
        std::fs::write(&path, swapped).unwrap();

        let err = PivotCombIndex::load(DenseL2Space::new(), line_dataset(), &path).unwrap_err();
        assert!(matches!(err, IndexError::Persist(_)));
    }

    #[test]
    fn mismatched_dataset_is_rejected() {
        let index = build_small();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        index.save(&path).unwrap();

        let short: Vec<Vec<f32>> = line_dataset().into_iter().take(10).collect();
        let err = PivotCombIndex::load(DenseL2Space::new(), short, &path).unwrap_err();
        assert!(matches!(err, IndexError::Data(_)));
    }

    #[test]
    fn explicit_pivot_index_refuses_to_save() {
        let data = line_dataset();
        let pivots: Vec<Vec<f32>> = vec![
            vec![0.0],
            vec![5.0],
            vec![10.0],
            vec![15.0],
            vec![19.0],
        ];
        let index =
            PivotCombIndex::build_with_pivots(DenseL2Space::new(), data, pivots, small_params())
                .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = index.save(&dir.path().join("index.txt")).unwrap_err();
        assert!(matches!(err, IndexError::Persist(_)));
    }
}
