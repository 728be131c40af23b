//! Named-array containers.
//!
//! A container is a directory holding one `.npy` array per key, e.g. the
//! `train`, `test` and `neighbors` arrays of an ANN benchmark release. One
//! array is selected by key and repacked into a canonical file, optionally
//! L2-normalizing each row.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::npy::{NpyArray, NpyCast};
use crate::adapters::vecs::ConversionSummary;
use crate::codec::{DatasetHeader, ElementKind, VectorWriter};
use crate::error::{ErrorContext, PipelineError, PipelineResult};

/// Standard array roles of a benchmark container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayRole {
    /// Base vectors
    Train,
    /// Query vectors
    Test,
    /// Ground-truth neighbor identifiers
    Neighbors,
}

impl ArrayRole {
    /// Container key of this role.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Neighbors => "neighbors",
        }
    }

    #[must_use]
    pub fn element_kind(self) -> ElementKind {
        match self {
            Self::Train | Self::Test => ElementKind::Float32,
            Self::Neighbors => ElementKind::UInt32,
        }
    }

    /// Canonical file suffix used for this role inside a dataset directory.
    #[must_use]
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Train => "base",
            Self::Test => "query",
            Self::Neighbors => "gt",
        }
    }
}

impl FromStr for ArrayRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" | "base" => Ok(Self::Train),
            "test" | "query" => Ok(Self::Test),
            "neighbors" | "gt" => Ok(Self::Neighbors),
            other => Err(format!("unknown array role '{other}'")),
        }
    }
}

/// Keys of every array present in `container`, sorted.
pub fn list_arrays(container: &Path) -> PipelineResult<Vec<String>> {
    if !container.is_dir() {
        return Err(PipelineError::DatasetNotFound {
            path: container.to_path_buf(),
        });
    }

    let mut keys = Vec::new();
    for entry in std::fs::read_dir(container).read_context(container)? {
        let path = entry.read_context(container)?.path();
        if path.extension().is_some_and(|ext| ext == "npy")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            keys.push(stem.to_string());
        }
    }
    keys.sort();
    Ok(keys)
}

/// Path of the array stored under `key`.
pub fn array_path(container: &Path, key: &str) -> PathBuf {
    container.join(format!("{key}.npy"))
}

/// Scales `values` (row-major, `dimension` wide) to unit L2 norm per row.
///
/// Rows with zero norm are left unchanged (divided by 1.0).
pub fn l2_normalize_rows(values: &mut [f32], dimension: usize) {
    for row in values.chunks_exact_mut(dimension) {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        for v in row.iter_mut() {
            *v /= norm;
        }
    }
}

/// Repacks the array under `key` into a canonical file.
///
/// # Arguments
/// * `container` - Directory of `.npy` arrays
/// * `key` - Array name
/// * `dst` - Canonical output path
/// * `kind` - Element kind of the output
/// * `normalize` - L2-normalize rows (Float32 only)
/// * `block_rows` - Rows read per block
pub fn convert_array(
    container: &Path,
    key: &str,
    dst: &Path,
    kind: ElementKind,
    normalize: bool,
    block_rows: usize,
) -> PipelineResult<ConversionSummary> {
    let src = array_path(container, key);
    if !src.is_file() {
        let available = list_arrays(container).unwrap_or_default();
        warn!(
            "Array '{key}' not found in {}; available: {available:?}",
            container.display()
        );
        return Err(PipelineError::DatasetNotFound { path: src });
    }

    let mut array = NpyArray::open(&src)?;
    let header = DatasetHeader::new(array.rows(), array.cols())?;
    let block_rows = block_rows.max(1);

    let batches = match kind {
        ElementKind::Float32 => repack::<f32>(&mut array, dst, header, block_rows, |block| {
            if normalize {
                l2_normalize_rows(block, header.dimension);
            }
        })?,
        ElementKind::UInt32 => {
            if normalize {
                return Err(PipelineError::ConfigError {
                    reason: "normalization only applies to float arrays".to_string(),
                });
            }
            repack::<u32>(&mut array, dst, header, block_rows, |_| {})?
        }
    };

    info!(
        "Converted {}[{key}] -> {}: {} x {} {kind}{}",
        container.display(),
        dst.display(),
        header.num_points,
        header.dimension,
        if normalize { " (normalized)" } else { "" }
    );

    Ok(ConversionSummary {
        source: src,
        output: dst.to_path_buf(),
        header,
        kind,
        batches,
        streamed: batches > 1,
    })
}

/// Repacks the array playing `role`, using the role's element kind.
pub fn convert_role(
    container: &Path,
    role: ArrayRole,
    dst: &Path,
    normalize: bool,
    block_rows: usize,
) -> PipelineResult<ConversionSummary> {
    let normalize = normalize && role.element_kind() == ElementKind::Float32;
    convert_array(
        container,
        role.key(),
        dst,
        role.element_kind(),
        normalize,
        block_rows,
    )
}

fn repack<T: NpyCast>(
    array: &mut NpyArray,
    dst: &Path,
    header: DatasetHeader,
    block_rows: usize,
    mut transform: impl FnMut(&mut [T]),
) -> PipelineResult<usize> {
    let mut writer = VectorWriter::<T>::create(dst, header)?;
    let mut done = 0;
    let mut batches = 0;

    while done < header.num_points {
        let count = block_rows.min(header.num_points - done);
        let mut block = array.read_rows::<T>(done, count)?;
        transform(&mut block);
        writer.write_block(&block)?;
        done += count;
        batches += 1;
    }

    writer.finish()?;
    Ok(batches)
}
