//! Sequential driver of the build/search grid.
//!
//! Each configuration walks `Pending -> Building -> {BuildFailed | Built}`;
//! a built index is then searched once per missing L, each search ending in
//! `Recorded` or `SearchFailed`. Configuration-local failures are logged with
//! the command that reproduces them and the sweep moves on. Ledger failures
//! abort the run.

use std::fmt;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::results::{Ledger, TrialKey, TrialResult, parse_search_output};
use crate::sweep::engine::{ArtifactHandle, BuildRequest, DatasetFiles, IndexEngine, SearchRequest};
use crate::sweep::grid::{GridEntry, ParameterConfiguration};

/// Lifecycle of one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Pending,
    Building,
    BuildFailed,
    Built,
    Searching(u32),
    SearchFailed(u32),
    Recorded(u32),
}

impl fmt::Display for ConfigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Building => f.write_str("BUILDING"),
            Self::BuildFailed => f.write_str("BUILD_FAILED"),
            Self::Built => f.write_str("BUILT"),
            Self::Searching(l) => write!(f, "SEARCHING(L={l})"),
            Self::SearchFailed(l) => write!(f, "SEARCH_FAILED(L={l})"),
            Self::Recorded(l) => write!(f, "RECORDED(L={l})"),
        }
    }
}

/// Counters for one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub configurations: usize,
    /// Every L already in the ledger
    pub skipped: usize,
    /// Inputs missing or still downloading
    pub unavailable: usize,
    pub built: usize,
    /// Artifact already on disk, build skipped
    pub reused: usize,
    pub build_failed: usize,
    pub searches: usize,
    pub search_failed: usize,
    pub recorded: usize,
}

impl SweepReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.build_failed + self.search_failed + self.unavailable
    }
}

/// Drives an `IndexEngine` over a grid, recording into a ledger.
pub struct Orchestrator<E: IndexEngine> {
    engine: E,
    config: SweepConfig,
    ledger: Ledger,
    progress: Option<ProgressBar>,
}

impl<E: IndexEngine> Orchestrator<E> {
    pub fn new(engine: E, config: SweepConfig, ledger: Ledger) -> Self {
        Self {
            engine,
            config,
            ledger,
            progress: None,
        }
    }

    /// Advances `progress` by one per configuration.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs every entry of `grid` in order.
    pub fn run(&mut self, grid: &[GridEntry]) -> PipelineResult<SweepReport> {
        let mut report = SweepReport {
            configurations: grid.len(),
            ..SweepReport::default()
        };

        for entry in grid {
            if let Some(pb) = &self.progress {
                pb.set_message(entry.config.to_string());
            }
            self.run_entry(entry, &mut report)?;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message(format!("{} rows recorded", report.recorded));
        }
        info!(
            "Sweep finished: {} recorded, {} skipped, {} build failures, {} search failures",
            report.recorded, report.skipped, report.build_failed, report.search_failed
        );
        Ok(report)
    }

    fn run_entry(&mut self, entry: &GridEntry, report: &mut SweepReport) -> PipelineResult<()> {
        let config = &entry.config;
        let missing: Vec<u32> = entry
            .l_values
            .iter()
            .copied()
            .filter(|&l| !self.ledger.contains(&TrialKey::new(config, l)))
            .collect();

        if missing.is_empty() {
            debug!("Skipping {config}: all L values recorded");
            report.skipped += 1;
            return Ok(());
        }
        transition(config, ConfigState::Pending);

        let files = DatasetFiles::locate(&self.config.data_root, &config.dataset);
        if let Err(e) = files.check_available(config.algorithm) {
            warn!("Skipping {config}: {e}");
            report.unavailable += 1;
            return Ok(());
        }

        let Some(artifact) = self.obtain_artifact(config, files.clone(), report)? else {
            return Ok(());
        };

        for l in missing {
            self.search_one(config, &files, &artifact, l, report)?;
        }

        match self.engine.cleanup(&artifact) {
            Ok(removed) => debug!("Removed {removed} artifact files for {config}"),
            Err(e) => warn!("Cleanup failed for {config}: {e}"),
        }
        Ok(())
    }

    /// Existing artifact, fresh build, or `None` when the build failed.
    fn obtain_artifact(
        &self,
        config: &ParameterConfiguration,
        files: DatasetFiles,
        report: &mut SweepReport,
    ) -> PipelineResult<Option<ArtifactHandle>> {
        let index_prefix = self.config.temp_dir.join(config.artifact_prefix());
        let mut existing = ArtifactHandle::expected(&index_prefix, &self.config.artifact_suffix);
        if existing.exists() {
            info!("Reusing index {}", existing.artifact.display());
            existing.reused = true;
            report.reused += 1;
            transition(config, ConfigState::Built);
            return Ok(Some(existing));
        }

        transition(config, ConfigState::Building);
        let request = BuildRequest {
            config: config.clone(),
            files,
            index_prefix,
        };
        match self.engine.build(&request) {
            Ok(handle) => {
                report.built += 1;
                transition(config, ConfigState::Built);
                Ok(Some(handle))
            }
            Err(e) if e.is_configuration_local() => {
                error!("{e}");
                report.build_failed += 1;
                transition(config, ConfigState::BuildFailed);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn search_one(
        &mut self,
        config: &ParameterConfiguration,
        files: &DatasetFiles,
        artifact: &ArtifactHandle,
        search_l: u32,
        report: &mut SweepReport,
    ) -> PipelineResult<()> {
        transition(config, ConfigState::Searching(search_l));
        report.searches += 1;

        let request = SearchRequest {
            config: config.clone(),
            query: files.query.clone(),
            ground_truth: files.ground_truth.clone(),
            search_l,
            top_k: self.config.top_k,
        };

        let measured = self.engine.search(artifact, &request).and_then(|raw| {
            let origin = format!("search {config} L={search_l}");
            parse_search_output(&raw.text, &origin)
                .select(search_l)
                .ok_or_else(|| PipelineError::SearchFailed {
                    config: config.to_string(),
                    search_l,
                    reason: "output contains no result rows".to_string(),
                    command: raw.command,
                })
        });

        match measured {
            Ok(m) => {
                if m.search_l != search_l {
                    warn!(
                        "{config}: no row for L={search_l}, recording last row (L={})",
                        m.search_l
                    );
                }
                let row = TrialResult {
                    config: config.clone(),
                    search_l,
                    qps: m.qps,
                    latency: m.latency,
                    recall: m.recall,
                };
                if self.ledger.record(&row)? {
                    report.recorded += 1;
                }
                transition(config, ConfigState::Recorded(search_l));
                Ok(())
            }
            Err(e) if e.is_configuration_local() => {
                error!("{e}");
                report.search_failed += 1;
                transition(config, ConfigState::SearchFailed(search_l));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn transition(config: &ParameterConfiguration, state: ConfigState) {
    debug!("{config}: {state}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_dataset;
    use crate::sweep::engine::{RawOutput, remove_artifact_files};
    use crate::sweep::grid::{AlphaBounds, SweepTask, expand_grid};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::Path;
    use tempfile::TempDir;

    /// Engine that writes the artifact file and echoes a one-row table.
    #[derive(Default)]
    struct FakeEngine {
        fail_builds: HashSet<String>,
        fail_search_l: HashSet<u32>,
        fail_cleanup: bool,
        builds: RefCell<Vec<String>>,
        searches: RefCell<Vec<(String, u32)>>,
    }

    impl IndexEngine for FakeEngine {
        fn build(&self, request: &BuildRequest) -> PipelineResult<ArtifactHandle> {
            let prefix = request.config.artifact_prefix();
            self.builds.borrow_mut().push(prefix.clone());
            if self.fail_builds.contains(&prefix) {
                return Err(PipelineError::BuildFailed {
                    config: request.config.to_string(),
                    reason: "exit status 1".to_string(),
                    command: format!("fake_build {prefix}"),
                });
            }
            let handle = ArtifactHandle::expected(&request.index_prefix, "_disk.index");
            std::fs::write(&handle.artifact, b"index").unwrap();
            Ok(handle)
        }

        fn search(
            &self,
            artifact: &ArtifactHandle,
            request: &SearchRequest,
        ) -> PipelineResult<RawOutput> {
            self.searches
                .borrow_mut()
                .push((request.config.artifact_prefix(), request.search_l));
            assert!(artifact.artifact.exists());
            if self.fail_search_l.contains(&request.search_l) {
                return Err(PipelineError::SearchFailed {
                    config: request.config.to_string(),
                    search_l: request.search_l,
                    reason: "exit status 2".to_string(),
                    command: "fake_search".to_string(),
                });
            }
            let l = request.search_l;
            let text = format!(
                "L QPS Latency Recall\n{l} {}.0 150.5 {}.5\n",
                1000 - l,
                80 + l / 10
            );
            Ok(RawOutput {
                command: "fake_search".to_string(),
                text,
            })
        }

        fn cleanup(&self, artifact: &ArtifactHandle) -> PipelineResult<usize> {
            if self.fail_cleanup {
                return Err(PipelineError::FileWrite {
                    path: artifact.artifact.clone(),
                    source: std::io::Error::other("read-only file system"),
                });
            }
            remove_artifact_files(&artifact.prefix)
        }
    }

    struct Fixture {
        dir: TempDir,
        config: SweepConfig,
    }

    impl Fixture {
        fn new(datasets: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let config = SweepConfig {
                data_root: dir.path().join("data"),
                temp_dir: dir.path().join("tmp"),
                ledger_path: dir.path().join("ledger.csv"),
                ..SweepConfig::default()
            };
            std::fs::create_dir_all(&config.temp_dir).unwrap();
            for ds in datasets {
                let files = DatasetFiles::locate(&config.data_root, ds);
                std::fs::create_dir_all(files.base.parent().unwrap()).unwrap();
                for path in [&files.base, &files.query, &files.lid] {
                    write_dataset::<f32>(path, 2, &[0.5, 1.5]).unwrap();
                }
                write_dataset::<u32>(&files.ground_truth, 1, &[0]).unwrap();
            }
            Self { dir, config }
        }

        fn run(&self, engine: FakeEngine, grid: &[GridEntry]) -> (SweepReport, FakeEngine) {
            let ledger = Ledger::open(&self.config.ledger_path).unwrap();
            let mut orch = Orchestrator::new(engine, self.config.clone(), ledger);
            let report = orch.run(grid).unwrap();
            (report, orch.engine)
        }

        fn ledger_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.config.ledger_path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }
    }

    fn grid(dataset: &str) -> Vec<GridEntry> {
        expand_grid(&[SweepTask {
            dataset: dataset.to_string(),
            r_values: vec![32],
            l_values: vec![10, 20],
            alpha_configs: vec![AlphaBounds::new(1.0, 1.2)],
            run_baseline: true,
        }])
    }

    #[test]
    fn test_full_run_records_every_cell() {
        let fx = Fixture::new(&["sift"]);
        let (report, engine) = fx.run(FakeEngine::default(), &grid("sift"));

        assert_eq!(report.built, 2);
        assert_eq!(report.recorded, 4);
        assert_eq!(report.failures(), 0);
        // Baseline is built before any adaptive index for the same R
        assert_eq!(
            *engine.builds.borrow(),
            vec!["idx_sift_R32_base", "idx_sift_R32_min1.0_max1.2"]
        );

        let lines = fx.ledger_lines();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "sift,32,1.0,1.0,Baseline,10,990,150.5,81.5");
        assert!(lines[3].contains(",MCGI,10,"));
    }

    #[test]
    fn test_resume_never_duplicates_rows() {
        let fx = Fixture::new(&["sift"]);
        fx.run(FakeEngine::default(), &grid("sift"));
        let first = fx.ledger_lines();

        let (report, engine) = fx.run(FakeEngine::default(), &grid("sift"));
        assert_eq!(report.skipped, 2);
        assert_eq!(report.recorded, 0);
        assert!(engine.builds.borrow().is_empty());
        assert!(engine.searches.borrow().is_empty());
        assert_eq!(fx.ledger_lines(), first);
    }

    #[test]
    fn test_resume_searches_only_missing_l() {
        let fx = Fixture::new(&["sift"]);
        let engine = FakeEngine {
            fail_search_l: HashSet::from([20]),
            ..FakeEngine::default()
        };
        let (report, _) = fx.run(engine, &grid("sift"));
        assert_eq!(report.recorded, 2);
        assert_eq!(report.search_failed, 2);

        let (report, engine) = fx.run(FakeEngine::default(), &grid("sift"));
        assert_eq!(report.recorded, 2);
        assert!(engine.searches.borrow().iter().all(|(_, l)| *l == 20));
        assert_eq!(fx.ledger_lines().len(), 5);
    }

    #[test]
    fn test_build_failure_is_isolated() {
        let fx = Fixture::new(&["sift"]);
        let engine = FakeEngine {
            fail_builds: HashSet::from(["idx_sift_R32_base".to_string()]),
            ..FakeEngine::default()
        };
        let (report, engine) = fx.run(engine, &grid("sift"));

        assert_eq!(report.build_failed, 1);
        assert_eq!(report.built, 1);
        assert_eq!(report.recorded, 2);
        assert!(
            engine
                .searches
                .borrow()
                .iter()
                .all(|(prefix, _)| prefix == "idx_sift_R32_min1.0_max1.2")
        );
    }

    #[test]
    fn test_existing_artifact_is_reused_then_cleaned() {
        let fx = Fixture::new(&["sift"]);
        let artifact = fx.config.temp_dir.join("idx_sift_R32_base_disk.index");
        std::fs::write(&artifact, b"prebuilt").unwrap();

        let (report, engine) = fx.run(FakeEngine::default(), &grid("sift"));
        assert_eq!(report.reused, 1);
        assert_eq!(report.built, 1);
        assert_eq!(*engine.builds.borrow(), vec!["idx_sift_R32_min1.0_max1.2"]);
        assert!(!artifact.exists());
        assert_eq!(std::fs::read_dir(&fx.config.temp_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_cleanup_failure_does_not_stop_sweep() {
        let fx = Fixture::new(&["sift"]);
        let engine = FakeEngine {
            fail_cleanup: true,
            ..FakeEngine::default()
        };
        let (report, engine) = fx.run(engine, &grid("sift"));

        // The adaptive configuration after the baseline still runs
        assert_eq!(report.built, 2);
        assert_eq!(report.recorded, 4);
        assert_eq!(report.failures(), 0);
        assert_eq!(engine.builds.borrow().len(), 2);
        assert_eq!(fx.ledger_lines().len(), 5);
        // Artifacts stay behind when cleanup fails
        assert!(fx.config.temp_dir.join("idx_sift_R32_base_disk.index").exists());
    }

    #[test]
    fn test_missing_dataset_is_skipped() {
        let fx = Fixture::new(&["sift"]);
        let mut entries = grid("deep");
        entries.extend(grid("sift"));

        let (report, engine) = fx.run(FakeEngine::default(), &entries);
        assert_eq!(report.unavailable, 2);
        assert_eq!(report.recorded, 4);
        assert!(engine.builds.borrow().iter().all(|p| p.contains("sift")));
        assert!(fx.path().join("ledger.csv").exists());
    }
}
