//! Full-dataset LID profile generation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{DatasetHeader, MappedDataset, VectorWriter, read_header};
use crate::config::LidConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::lid::knn::{exact_lid, exact_lid_mapped};
use crate::lid::mle::{LID_MIN, SAMPLE_LID_MAX, clip};
use crate::lid::stats::ProfileStats;

/// How the per-point profile is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LidMode {
    /// k-NN over the full dataset for every point. Brute force, O(N^2 x D):
    /// practical up to a few hundred thousand points.
    Exact,
    /// Exact LID on a prefix sample, then values drawn from its fitted
    /// Gaussian. Value i is not an estimate for point i.
    Sample,
    /// Exact up to `exact_max_points`, sample beyond
    #[default]
    Auto,
}

impl FromStr for LidMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "sample" => Ok(Self::Sample),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown LID mode '{other}'")),
        }
    }
}

impl std::fmt::Display for LidMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Sample => write!(f, "sample"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Result of one profile run.
#[derive(Debug, Clone, Serialize)]
pub struct LidSummary {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Mode actually used (never `Auto`)
    pub mode: LidMode,
    pub k: usize,
    pub num_points: usize,
    /// Points the estimate was computed on
    pub estimated_points: usize,
    /// Statistics of the exactly estimated values
    pub estimated: ProfileStats,
}

/// Produces LID profiles aligned to their source dataset.
#[derive(Debug, Clone)]
pub struct LidEstimator {
    config: LidConfig,
    block_rows: usize,
}

impl LidEstimator {
    /// Validates `config` and builds an estimator.
    pub fn new(config: LidConfig, block_rows: usize) -> PipelineResult<Self> {
        if config.k < 2 {
            return Err(PipelineError::ConfigError {
                reason: format!("lid.k must be at least 2, got {}", config.k),
            });
        }
        if config.sample_size == 0 || config.generation_chunk == 0 {
            return Err(PipelineError::ConfigError {
                reason: "lid.sample_size and lid.generation_chunk must be positive".to_string(),
            });
        }
        Ok(Self {
            config,
            block_rows: block_rows.max(1),
        })
    }

    #[must_use]
    pub fn config(&self) -> &LidConfig {
        &self.config
    }

    /// Mode that `estimate` will use for a dataset of `num_points`.
    #[must_use]
    pub fn resolve_mode(&self, num_points: usize) -> LidMode {
        match self.config.mode {
            LidMode::Auto if num_points <= self.config.exact_max_points => LidMode::Exact,
            LidMode::Auto => LidMode::Sample,
            mode => mode,
        }
    }

    /// Writes the LID profile of the Float32 dataset `src` to `dst`.
    ///
    /// The profile has shape (N, 1) and row i describes row i of `src`.
    pub fn estimate(&self, src: &Path, dst: &Path) -> PipelineResult<LidSummary> {
        let header = read_header(src)?;
        let k = self.config.k;

        let mode = self.resolve_mode(header.num_points);
        let summary = match mode {
            LidMode::Sample => self.run_sample(src, dst, header)?,
            _ => self.run_exact(src, dst, header)?,
        };

        info!(
            "LID profile ({mode}, k={k}) for {} -> {}: N={}, mean={:.4}, std={:.4}",
            src.display(),
            dst.display(),
            summary.num_points,
            summary.estimated.mean,
            summary.estimated.std
        );
        Ok(summary)
    }

    fn check_enough(&self, src: &Path, available: usize) -> PipelineResult<()> {
        let required = self.config.k + 1;
        if available < required {
            return Err(PipelineError::InsufficientData {
                path: src.to_path_buf(),
                required,
                available,
            });
        }
        Ok(())
    }

    fn run_exact(
        &self,
        src: &Path,
        dst: &Path,
        header: DatasetHeader,
    ) -> PipelineResult<LidSummary> {
        self.check_enough(src, header.num_points)?;

        let mapped = MappedDataset::<f32>::open(src)?;
        let k = self.config.k;
        let lids = self.in_pool(|| exact_lid_mapped(&mapped, k))?;

        write_profile(dst, &lids, self.block_rows)?;
        Ok(LidSummary {
            source: src.to_path_buf(),
            output: dst.to_path_buf(),
            mode: LidMode::Exact,
            k,
            num_points: header.num_points,
            estimated_points: header.num_points,
            estimated: ProfileStats::from_values(&lids),
        })
    }

    /// Sample-extrapolation mode.
    ///
    /// This is a statistical approximation, not a per-point estimate: the
    /// synthesized values share the sample's mean and spread, but value i
    /// carries no information about point i. Index builders that read the
    /// profile positionally see noise with the right distribution.
    fn run_sample(
        &self,
        src: &Path,
        dst: &Path,
        header: DatasetHeader,
    ) -> PipelineResult<LidSummary> {
        let sample_points = self.config.sample_size.min(header.num_points);
        self.check_enough(src, sample_points)?;

        let mapped = MappedDataset::<f32>::open(src)?;
        let sample = mapped.rows(0, sample_points)?;
        let k = self.config.k;
        let sample_lids = self.in_pool(|| exact_lid(&sample, header.dimension, k))?;
        let stats = ProfileStats::from_values(&sample_lids);

        let normal = Normal::new(stats.mean, stats.std).map_err(|e| {
            PipelineError::ConfigError {
                reason: format!("cannot fit Normal({}, {}): {e}", stats.mean, stats.std),
            }
        })?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let out_header = DatasetHeader::new(header.num_points, 1)?;
        let mut writer = VectorWriter::<f32>::create(dst, out_header)?;
        let chunk = self.config.generation_chunk;
        let mut buffer = Vec::with_capacity(chunk.min(header.num_points));
        let mut written = 0;
        while written < header.num_points {
            let count = chunk.min(header.num_points - written);
            buffer.clear();
            buffer.extend(
                (0..count).map(|_| clip(normal.sample(&mut rng), LID_MIN, SAMPLE_LID_MAX)),
            );
            writer.write_block(&buffer)?;
            written += count;
            debug!("generated {written}/{} LID values", header.num_points);
        }
        writer.finish()?;

        Ok(LidSummary {
            source: src.to_path_buf(),
            output: dst.to_path_buf(),
            mode: LidMode::Sample,
            k,
            num_points: header.num_points,
            estimated_points: sample_points,
            estimated: stats,
        })
    }

    fn in_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> PipelineResult<R> {
        if self.config.threads == 0 {
            return Ok(op());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| PipelineError::ConfigError {
                reason: format!("cannot start {} LID workers: {e}", self.config.threads),
            })?;
        Ok(pool.install(op))
    }
}

/// Default profile path for a base file: `x_base.bin` -> `x_lid.bin`.
pub fn default_profile_path(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match name.strip_suffix("_base.bin") {
        Some(stem) => base.with_file_name(format!("{stem}_lid.bin")),
        None => {
            warn!("{} does not end in _base.bin", base.display());
            base.with_extension("lid.bin")
        }
    }
}

fn write_profile(dst: &Path, lids: &[f32], block_rows: usize) -> PipelineResult<()> {
    let header = DatasetHeader::new(lids.len(), 1)?;
    let mut writer = VectorWriter::<f32>::create(dst, header)?;
    for block in lids.chunks(block_rows) {
        writer.write_block(block)?;
    }
    writer.finish()?;
    Ok(())
}
