//! Parameter grid: configurations and their expansion from sweep tasks.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Index construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    /// Fixed pruning parameter
    Baseline,
    /// LID-driven pruning between alpha_min and alpha_max
    Adaptive,
}

impl Algorithm {
    /// Label written to the ledger's Algorithm column.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Baseline => "Baseline",
            Self::Adaptive => "MCGI",
        }
    }

    /// Parses a ledger label or section marker name.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "baseline" => Some(Self::Baseline),
            "mcgi" | "adaptive" => Some(Self::Adaptive),
            _ => None,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Bounds of the adaptive pruning parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaBounds {
    pub min: f64,
    pub max: f64,
}

impl AlphaBounds {
    /// Sentinel carried by Baseline configurations.
    pub const BASELINE: Self = Self { min: 1.0, max: 1.0 };

    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether these bounds describe a usable adaptive range.
    #[must_use]
    pub fn is_adaptive_range(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// Formats an alpha value the way ledgers and file names spell it:
/// integral values keep one decimal (`1.0`), others print as-is (`1.25`).
#[must_use]
pub fn format_alpha(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// One cell of the build grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterConfiguration {
    pub dataset: String,
    /// Maximum graph degree
    pub r: u32,
    pub alpha: AlphaBounds,
    pub algorithm: Algorithm,
}

impl ParameterConfiguration {
    #[must_use]
    pub fn baseline(dataset: &str, r: u32) -> Self {
        Self {
            dataset: dataset.to_string(),
            r,
            alpha: AlphaBounds::BASELINE,
            algorithm: Algorithm::Baseline,
        }
    }

    /// Adaptive configuration, or `None` when `alpha.min >= alpha.max`.
    #[must_use]
    pub fn adaptive(dataset: &str, r: u32, alpha: AlphaBounds) -> Option<Self> {
        alpha.is_adaptive_range().then(|| Self {
            dataset: dataset.to_string(),
            r,
            alpha,
            algorithm: Algorithm::Adaptive,
        })
    }

    /// File-name prefix of this configuration's index artifacts.
    #[must_use]
    pub fn artifact_prefix(&self) -> String {
        match self.algorithm {
            Algorithm::Baseline => format!("idx_{}_R{}_base", self.dataset, self.r),
            Algorithm::Adaptive => format!(
                "idx_{}_R{}_min{}_max{}",
                self.dataset,
                self.r,
                format_alpha(self.alpha.min),
                format_alpha(self.alpha.max)
            ),
        }
    }
}

impl std::fmt::Display for ParameterConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} R={} {}", self.dataset, self.r, self.algorithm)?;
        if self.algorithm == Algorithm::Adaptive {
            write!(
                f,
                " alpha=[{}, {}]",
                format_alpha(self.alpha.min),
                format_alpha(self.alpha.max)
            )?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Grid definition for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepTask {
    pub dataset: String,
    pub r_values: Vec<u32>,
    /// Search list sizes tried against every built index
    pub l_values: Vec<u32>,
    #[serde(default)]
    pub alpha_configs: Vec<AlphaBounds>,
    #[serde(default = "default_true")]
    pub run_baseline: bool,
}

/// A configuration together with the search L values it must cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridEntry {
    pub config: ParameterConfiguration,
    pub l_values: Vec<u32>,
}

/// Expands tasks into an ordered list of configurations.
///
/// For every (dataset, R) the Baseline entry comes first, followed by the
/// adaptive entries in task order. Alpha pairs with `min >= max` are dropped.
pub fn expand_grid(tasks: &[SweepTask]) -> Vec<GridEntry> {
    let mut entries = Vec::new();

    for task in tasks {
        for &r in &task.r_values {
            if task.run_baseline {
                entries.push(GridEntry {
                    config: ParameterConfiguration::baseline(&task.dataset, r),
                    l_values: task.l_values.clone(),
                });
            }

            for &alpha in &task.alpha_configs {
                match ParameterConfiguration::adaptive(&task.dataset, r, alpha) {
                    Some(config) => entries.push(GridEntry {
                        config,
                        l_values: task.l_values.clone(),
                    }),
                    None => warn!(
                        "Dropping alpha range [{}, {}] for {} R={}: min must be below max",
                        format_alpha(alpha.min),
                        format_alpha(alpha.max),
                        task.dataset,
                        r
                    ),
                }
            }
        }
    }

    entries
}
