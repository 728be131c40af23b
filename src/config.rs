//! Configuration module for the benchmarking pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! Each pipeline component receives its own section at construction time;
//! nothing reads configuration from global state.
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `AS_` and use double underscores
//! to separate nested levels:
//! - `AS_LID__K=100` sets `lid.k`
//! - `AS_SWEEP__THREADS=16` sets `sweep.threads`
//! - `AS_CODEC__BLOCK_ROWS=4096` sets `codec.block_rows`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::lid::LidMode;
use crate::sweep::{AlphaBounds, SweepTask};

/// Directory holding the workspace settings file.
pub const SETTINGS_DIR: &str = ".adasweep";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .adasweep is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Canonical file I/O settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Foreign format conversion settings
    #[serde(default)]
    pub convert: ConvertConfig,

    /// LID estimation settings
    #[serde(default)]
    pub lid: LidConfig,

    /// Build/search sweep settings
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Batch result aggregation settings
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CodecConfig {
    /// Rows per block when streaming canonical files
    #[serde(default = "default_block_rows")]
    pub block_rows: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConvertConfig {
    /// Records converted per batch for large foreign files
    #[serde(default = "default_batch_records")]
    pub batch_records: usize,

    /// Foreign files up to this size are converted in a single pass
    #[serde(default = "default_in_memory_threshold")]
    pub in_memory_threshold_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LidConfig {
    /// Number of nearest neighbors in the MLE estimate
    #[serde(default = "default_lid_k")]
    pub k: usize,

    /// Exact, sample-extrapolated, or chosen by dataset size
    #[serde(default)]
    pub mode: LidMode,

    /// Largest dataset `auto` mode still estimates exactly.
    /// Exact mode is O(N^2 x D), so this stays far below billion scale.
    #[serde(default = "default_exact_max_points")]
    pub exact_max_points: usize,

    /// Prefix sample size for sample-extrapolation mode
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Values generated per write in sample-extrapolation mode
    #[serde(default = "default_generation_chunk")]
    pub generation_chunk: usize,

    /// Seed for the extrapolation RNG (unset = entropy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Worker threads for exact k-NN (0 = all cores)
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SweepConfig {
    /// Index builder executable
    #[serde(default = "default_builder_bin")]
    pub builder_bin: PathBuf,

    /// Index searcher executable
    #[serde(default = "default_searcher_bin")]
    pub searcher_bin: PathBuf,

    /// Root holding one directory per dataset
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Scratch directory for transient index artifacts
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Append-only results ledger
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Element type passed to the engine binaries
    #[serde(default = "default_data_type")]
    pub data_type: String,

    /// Distance function passed to the engine binaries
    #[serde(default = "default_dist_fn")]
    pub dist_fn: String,

    /// Candidate list size during build
    #[serde(default = "default_build_l")]
    pub build_l: u32,

    /// Search-time DRAM budget in GB (-B)
    #[serde(default = "default_search_dram_budget")]
    pub search_dram_budget_gb: f32,

    /// Build-time DRAM budget in GB (-M)
    #[serde(default = "default_build_dram_budget")]
    pub build_dram_budget_gb: f32,

    /// Threads handed to the engine binaries
    #[serde(default = "default_engine_threads")]
    pub threads: usize,

    /// Neighbors requested per query
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Suffix of the file whose existence signals a finished build
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,

    /// Grid definition, one entry per dataset
    #[serde(default = "default_tasks")]
    pub tasks: Vec<SweepTask>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AggregateConfig {
    /// Directories scanned for `*.txt` result files
    #[serde(default = "default_input_dirs")]
    pub input_dirs: Vec<PathBuf>,

    /// Summary CSV written by `aggregate`
    #[serde(default = "default_aggregate_output")]
    pub output: PathBuf,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_block_rows() -> usize {
    65_536
}
fn default_batch_records() -> usize {
    1_000_000
}
fn default_in_memory_threshold() -> u64 {
    1 << 30
}
fn default_lid_k() -> usize {
    20
}
fn default_exact_max_points() -> usize {
    200_000
}
fn default_sample_size() -> usize {
    50_000
}
fn default_generation_chunk() -> usize {
    10_000_000
}
fn default_builder_bin() -> PathBuf {
    PathBuf::from("build/apps/build_disk_index")
}
fn default_searcher_bin() -> PathBuf {
    PathBuf::from("build/apps/search_disk_index")
}
fn default_data_root() -> PathBuf {
    PathBuf::from("experiments/data")
}
fn default_temp_dir() -> PathBuf {
    PathBuf::from("experiments/temp_indices")
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("experiments/sweep_ledger.csv")
}
fn default_data_type() -> String {
    "float".to_string()
}
fn default_dist_fn() -> String {
    "l2".to_string()
}
fn default_build_l() -> u32 {
    100
}
fn default_search_dram_budget() -> f32 {
    0.1
}
fn default_build_dram_budget() -> f32 {
    1.0
}
fn default_engine_threads() -> usize {
    num_cpus::get()
}
fn default_top_k() -> u32 {
    10
}
fn default_artifact_suffix() -> String {
    "_disk.index".to_string()
}
fn default_input_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("experiments/fullscan")]
}
fn default_aggregate_output() -> PathBuf {
    PathBuf::from("experiments/grid_search_summary.csv")
}

/// Alpha grid shared by the default tasks.
fn default_alpha_configs() -> Vec<AlphaBounds> {
    let mut configs: Vec<AlphaBounds> = [1.1, 1.2, 1.3, 1.4, 1.5, 1.6, 1.7, 2.0]
        .into_iter()
        .map(|max| AlphaBounds::new(1.0, max))
        .collect();
    configs.extend(
        [1.2, 1.3, 1.4, 1.5, 1.6, 1.7, 2.0]
            .into_iter()
            .map(|max| AlphaBounds::new(1.1, max)),
    );
    configs
}

fn default_tasks() -> Vec<SweepTask> {
    vec![
        SweepTask {
            dataset: "sift".to_string(),
            r_values: vec![32, 48],
            l_values: vec![10, 20, 30, 40],
            alpha_configs: default_alpha_configs(),
            run_baseline: true,
        },
        SweepTask {
            dataset: "glove".to_string(),
            r_values: vec![80],
            l_values: vec![50, 100, 150, 200],
            alpha_configs: default_alpha_configs(),
            run_baseline: true,
        },
        SweepTask {
            dataset: "gist".to_string(),
            r_values: vec![48, 64],
            l_values: vec![75],
            alpha_configs: default_alpha_configs(),
            run_baseline: true,
        },
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            log_level: default_log_level(),
            codec: CodecConfig::default(),
            convert: ConvertConfig::default(),
            lid: LidConfig::default(),
            sweep: SweepConfig::default(),
            aggregate: AggregateConfig::default(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            block_rows: default_block_rows(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            batch_records: default_batch_records(),
            in_memory_threshold_bytes: default_in_memory_threshold(),
        }
    }
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            k: default_lid_k(),
            mode: LidMode::default(),
            exact_max_points: default_exact_max_points(),
            sample_size: default_sample_size(),
            generation_chunk: default_generation_chunk(),
            seed: None,
            threads: 0,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            builder_bin: default_builder_bin(),
            searcher_bin: default_searcher_bin(),
            data_root: default_data_root(),
            temp_dir: default_temp_dir(),
            ledger_path: default_ledger_path(),
            data_type: default_data_type(),
            dist_fn: default_dist_fn(),
            build_l: default_build_l(),
            search_dram_budget_gb: default_search_dram_budget(),
            build_dram_budget_gb: default_build_dram_budget(),
            threads: default_engine_threads(),
            top_k: default_top_k(),
            artifact_suffix: default_artifact_suffix(),
            tasks: default_tasks(),
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            input_dirs: default_input_dirs(),
            output: default_aggregate_output(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .adasweep directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels,
            // single underscore (_) remains as is within field names
            .merge(Env::prefixed("AS_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace settings file by looking for .adasweep
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(SETTINGS_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .adasweep is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(SETTINGS_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'adasweep init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(SETTINGS_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# adasweep configuration file

# Version of the configuration schema
version = 1

# Global debug mode
debug = false

# Default log filter (RUST_LOG takes precedence)
log_level = "info"

[codec]
# Rows per block when streaming canonical files
block_rows = 65536

[convert]
# Records per batch when converting large fvecs/ivecs/bvecs files
batch_records = 1000000

# Foreign files up to this many bytes are converted in one pass
in_memory_threshold_bytes = 1073741824

[lid]
# Neighbors used by the MLE estimate (100 for high-variance data)
k = 20

# "exact", "sample", or "auto" (exact up to exact_max_points)
mode = "auto"
exact_max_points = 200000

# Prefix sample size for sample-extrapolation mode
sample_size = 50000

# Fix the extrapolation RNG for reproducible profiles
# seed = 42

# Worker threads for exact k-NN (0 = all cores)
threads = 0

[sweep]
builder_bin = "build/apps/build_disk_index"
searcher_bin = "build/apps/search_disk_index"

# Datasets live in <data_root>/<name>/<name>_{{base,query,gt,lid}}.bin
data_root = "experiments/data"
temp_dir = "experiments/temp_indices"
ledger_path = "experiments/sweep_ledger.csv"

dist_fn = "l2"
build_l = 100
search_dram_budget_gb = 0.1
build_dram_budget_gb = 1.0
# threads = {}
top_k = 10

# Grid definition. Baseline always runs before the adaptive configurations.
[[sweep.tasks]]
dataset = "sift"
r_values = [32, 48]
l_values = [10, 20, 30, 40]
run_baseline = true
alpha_configs = [
    {{ min = 1.0, max = 1.1 }}, {{ min = 1.0, max = 1.2 }}, {{ min = 1.0, max = 1.5 }},
    {{ min = 1.1, max = 1.3 }}, {{ min = 1.1, max = 2.0 }},
]

[aggregate]
input_dirs = ["experiments/fullscan"]
output = "experiments/grid_search_summary.csv"
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.lid.k, 20);
        assert_eq!(settings.lid.mode, LidMode::Auto);
        assert!(settings.sweep.threads > 0);
        assert_eq!(settings.sweep.tasks.len(), 3);
        assert!(settings.sweep.tasks.iter().all(|t| t.run_baseline));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[lid]
k = 100
mode = "sample"
sample_size = 10000
seed = 7

[sweep]
top_k = 100

[[sweep.tasks]]
dataset = "deep"
r_values = [64]
l_values = [50, 100]
alpha_configs = [{ min = 1.0, max = 1.3 }]
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.lid.k, 100);
        assert_eq!(settings.lid.mode, LidMode::Sample);
        assert_eq!(settings.lid.seed, Some(7));
        assert_eq!(settings.sweep.top_k, 100);
        assert_eq!(settings.sweep.tasks.len(), 1);
        assert_eq!(settings.sweep.tasks[0].alpha_configs[0].max, 1.3);
        // run_baseline defaults to true when omitted
        assert!(settings.sweep.tasks[0].run_baseline);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.codec.block_rows = 128;
        settings.lid.threads = 2;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.codec.block_rows, 128);
        assert_eq!(loaded.lid.threads, 2);
        assert_eq!(loaded.sweep.tasks, settings.sweep.tasks);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[convert]
batch_records = 500
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified values
        assert_eq!(settings.convert.batch_records, 500);

        // Default values should still be present
        assert_eq!(settings.convert.in_memory_threshold_bytes, 1 << 30);
        assert_eq!(settings.codec.block_rows, 65_536);
        assert_eq!(settings.sweep.artifact_suffix, "_disk.index");
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[lid]\nk = 30\nsample_size = 1000\n").unwrap();

        unsafe {
            std::env::set_var("AS_LID__K", "64");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        unsafe {
            std::env::remove_var("AS_LID__K");
        }

        // Environment variable should override config file
        assert_eq!(settings.lid.k, 64);
        // Config file value should be used when no env var
        assert_eq!(settings.lid.sample_size, 1000);
    }
}
