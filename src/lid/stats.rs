//! Summary statistics of LID profiles.

use std::path::Path;

use serde::Serialize;

use crate::codec::VectorReader;
use crate::error::{PipelineError, PipelineResult};

/// Distribution summary of a set of LID values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ProfileStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ProfileStats {
    /// Computes statistics over `values`; all fields are 0 when empty.
    #[must_use]
    pub fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let count = values.len();
        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            let v = v as f64;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / count as f64;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count as f64;

        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f32::total_cmp);
        let median = if count % 2 == 1 {
            sorted[count / 2] as f64
        } else {
            (sorted[count / 2 - 1] as f64 + sorted[count / 2] as f64) / 2.0
        };

        Self {
            count,
            mean,
            std: variance.sqrt(),
            min,
            max,
            median,
        }
    }
}

/// Loads a D=1 profile and summarizes it.
pub fn profile_stats(path: &Path, block_rows: usize) -> PipelineResult<ProfileStats> {
    let mut reader = VectorReader::<f32>::open(path, block_rows)?;
    let header = reader.header();
    if header.dimension != 1 {
        return Err(PipelineError::CorruptDataset {
            path: path.to_path_buf(),
            reason: "LID profiles have exactly one value per row".to_string(),
            expected: 1,
            actual: header.dimension as u64,
        });
    }

    let mut values = Vec::with_capacity(header.num_points);
    for block in reader.blocks()? {
        values.extend(block?.data);
    }
    Ok(ProfileStats::from_values(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_dataset;
    use tempfile::TempDir;

    #[test]
    fn test_stats_of_small_set() {
        let stats = ProfileStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std - 2.0).abs() < 1e-12);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.median, 4.5);
    }

    #[test]
    fn test_empty_is_zeroed() {
        assert_eq!(ProfileStats::from_values(&[]), ProfileStats::default());
    }

    #[test]
    fn test_profile_stats_reads_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x_lid.bin");
        write_dataset(&path, 1, &[1.0f32, 3.0, 2.0]).unwrap();

        let stats = profile_stats(&path, 2).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.median, 2.0);

        let wide = dir.path().join("wide.bin");
        write_dataset(&wide, 2, &[1.0f32, 2.0]).unwrap();
        assert!(profile_stats(&wide, 2).is_err());
    }
}
