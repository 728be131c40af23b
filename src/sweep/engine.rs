//! Collaborator interface to the external index engine.
//!
//! The engine is a pair of executables: a builder that writes a disk index
//! under an artifact prefix, and a searcher that prints a results table.
//! `ProcessEngine` drives the real binaries; tests substitute their own
//! `IndexEngine`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::codec::ensure_available;
use crate::config::SweepConfig;
use crate::error::{ErrorContext, PipelineError, PipelineResult};
use crate::sweep::grid::{Algorithm, ParameterConfiguration, format_alpha};

/// Canonical input files of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFiles {
    pub base: PathBuf,
    pub query: PathBuf,
    pub ground_truth: PathBuf,
    pub lid: PathBuf,
}

impl DatasetFiles {
    /// `<data_root>/<dataset>/<dataset>_{base,query,gt,lid}.bin`
    pub fn locate(data_root: &Path, dataset: &str) -> Self {
        let dir = data_root.join(dataset);
        Self {
            base: dir.join(format!("{dataset}_base.bin")),
            query: dir.join(format!("{dataset}_query.bin")),
            ground_truth: dir.join(format!("{dataset}_gt.bin")),
            lid: dir.join(format!("{dataset}_lid.bin")),
        }
    }

    /// Fails with `DatasetNotFound` for the first input `algorithm` needs
    /// that is missing or still being downloaded.
    pub fn check_available(&self, algorithm: Algorithm) -> PipelineResult<()> {
        ensure_available(&self.base)?;
        ensure_available(&self.query)?;
        ensure_available(&self.ground_truth)?;
        if algorithm == Algorithm::Adaptive {
            ensure_available(&self.lid)?;
        }
        Ok(())
    }
}

/// Everything the builder needs for one configuration.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub config: ParameterConfiguration,
    pub files: DatasetFiles,
    /// Full path prefix of the index artifacts
    pub index_prefix: PathBuf,
}

/// One search against a built index.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub config: ParameterConfiguration,
    pub query: PathBuf,
    pub ground_truth: PathBuf,
    pub search_l: u32,
    pub top_k: u32,
}

/// A built index on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHandle {
    pub prefix: PathBuf,
    /// File whose existence marks the build as complete
    pub artifact: PathBuf,
    /// Whether the artifact predated this run
    pub reused: bool,
}

impl ArtifactHandle {
    /// Handle for `prefix` with the completion file `<prefix><suffix>`.
    pub fn expected(prefix: &Path, suffix: &str) -> Self {
        let mut artifact = prefix.as_os_str().to_os_string();
        artifact.push(suffix);
        Self {
            prefix: prefix.to_path_buf(),
            artifact: PathBuf::from(artifact),
            reused: false,
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.artifact.is_file()
    }
}

/// Captured output of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    /// Command line, for reproduction
    pub command: String,
    pub text: String,
}

/// External index engine.
pub trait IndexEngine {
    /// Builds the index described by `request`.
    ///
    /// Must fail with `BuildFailed` when the builder exits non-zero or
    /// exits zero without producing the artifact.
    fn build(&self, request: &BuildRequest) -> PipelineResult<ArtifactHandle>;

    /// Searches `artifact` and returns the searcher's full output.
    fn search(&self, artifact: &ArtifactHandle, request: &SearchRequest)
    -> PipelineResult<RawOutput>;

    /// Removes the transient files of `artifact`.
    fn cleanup(&self, artifact: &ArtifactHandle) -> PipelineResult<usize> {
        remove_artifact_files(&artifact.prefix)
    }
}

/// Deletes the files named `<prefix>_*` or `<prefix>.*` next to `prefix`,
/// keeping build logs. Returns how many files were removed.
pub fn remove_artifact_files(prefix: &Path) -> PipelineResult<usize> {
    let Some(name) = prefix.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let dir = prefix
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut removed = 0;
    for entry in std::fs::read_dir(dir).read_context(dir)? {
        let path = entry.read_context(dir)?.path();
        let Some(file) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // The prefix must end at a separator, so `..._max1.1` never
        // matches the files of `..._max1.15`.
        let owned = file
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with(['_', '.']));
        if owned && !file.ends_with(BUILD_LOG_SUFFIX) && path.is_file() {
            std::fs::remove_file(&path).write_context(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

const BUILD_LOG_SUFFIX: &str = ".build.log";

/// Renders a command as a copy-pasteable shell line.
pub fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| {
            let part = part.to_string_lossy();
            if part.is_empty() || part.contains(char::is_whitespace) {
                format!("'{part}'")
            } else {
                part.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Engine backed by the builder and searcher executables.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: SweepConfig,
}

impl ProcessEngine {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    /// Builder invocation for `request`.
    pub fn build_command(&self, request: &BuildRequest) -> Command {
        let c = &self.config;
        let mut cmd = Command::new(&c.builder_bin);
        cmd.arg("--data_type")
            .arg(&c.data_type)
            .arg("--dist_fn")
            .arg(&c.dist_fn)
            .arg("--data_path")
            .arg(&request.files.base)
            .arg("--index_path_prefix")
            .arg(&request.index_prefix)
            .arg("-R")
            .arg(request.config.r.to_string())
            .arg("-L")
            .arg(c.build_l.to_string())
            .arg("-B")
            .arg(c.search_dram_budget_gb.to_string())
            .arg("-M")
            .arg(c.build_dram_budget_gb.to_string())
            .arg("-T")
            .arg(c.threads.to_string());

        if request.config.algorithm == Algorithm::Adaptive {
            cmd.arg("--use_mcgi")
                .arg("--lid_path")
                .arg(&request.files.lid)
                .arg("--alpha_min")
                .arg(format_alpha(request.config.alpha.min))
                .arg("--alpha_max")
                .arg(format_alpha(request.config.alpha.max));
        }
        cmd
    }

    /// Searcher invocation for `request` against `artifact`.
    pub fn search_command(&self, artifact: &ArtifactHandle, request: &SearchRequest) -> Command {
        let c = &self.config;
        let mut cmd = Command::new(&c.searcher_bin);
        cmd.arg("--data_type")
            .arg(&c.data_type)
            .arg("--dist_fn")
            .arg(&c.dist_fn)
            .arg("--index_path_prefix")
            .arg(&artifact.prefix)
            .arg("--query_file")
            .arg(&request.query)
            .arg("--gt_file")
            .arg(&request.ground_truth)
            .arg("-K")
            .arg(request.top_k.to_string())
            .arg("-L")
            .arg(request.search_l.to_string())
            .arg("--result_path")
            .arg(c.temp_dir.join("res"))
            .arg("--num_threads")
            .arg(c.threads.to_string());
        cmd
    }
}

impl IndexEngine for ProcessEngine {
    fn build(&self, request: &BuildRequest) -> PipelineResult<ArtifactHandle> {
        let mut cmd = self.build_command(request);
        let command = render_command(&cmd);
        let handle = ArtifactHandle::expected(&request.index_prefix, &self.config.artifact_suffix);

        let mut log_path = request.index_prefix.as_os_str().to_os_string();
        log_path.push(BUILD_LOG_SUFFIX);
        let log_path = PathBuf::from(log_path);
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).write_context(parent)?;
        }
        let log = File::create(&log_path).write_context(&log_path)?;
        let log_err = log.try_clone().write_context(&log_path)?;

        info!("Building {}", request.config);
        debug!("{command}");
        let status = cmd
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()
            .map_err(|e| PipelineError::BuildFailed {
                config: request.config.to_string(),
                reason: format!("cannot start builder: {e}"),
                command: command.clone(),
            })?;

        if !status.success() {
            return Err(PipelineError::BuildFailed {
                config: request.config.to_string(),
                reason: format!("builder exited with {status}; log at {}", log_path.display()),
                command,
            });
        }
        if !handle.exists() {
            return Err(PipelineError::BuildFailed {
                config: request.config.to_string(),
                reason: format!(
                    "builder exited successfully but {} was not produced",
                    handle.artifact.display()
                ),
                command,
            });
        }
        Ok(handle)
    }

    fn search(
        &self,
        artifact: &ArtifactHandle,
        request: &SearchRequest,
    ) -> PipelineResult<RawOutput> {
        let mut cmd = self.search_command(artifact, request);
        let command = render_command(&cmd);
        debug!("{command}");

        let output = cmd.output().map_err(|e| PipelineError::SearchFailed {
            config: request.config.to_string(),
            search_l: request.search_l,
            reason: format!("cannot start searcher: {e}"),
            command: command.clone(),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            warn!("Searcher output for {}:\n{text}", request.config);
            return Err(PipelineError::SearchFailed {
                config: request.config.to_string(),
                search_l: request.search_l,
                reason: format!("searcher exited with {}", output.status),
                command,
            });
        }
        Ok(RawOutput { command, text })
    }
}
