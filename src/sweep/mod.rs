//! Parameter sweep over the external index engine.
//!
//! - `grid`: configurations and grid expansion
//! - `engine`: the `IndexEngine` collaborator and its process-backed implementation
//! - `orchestrator`: resumable, failure-isolating driver that fills the ledger

pub mod engine;
pub mod grid;
pub mod orchestrator;

pub use engine::{
    ArtifactHandle, BuildRequest, DatasetFiles, IndexEngine, ProcessEngine, RawOutput,
    SearchRequest, remove_artifact_files, render_command,
};
pub use grid::{
    Algorithm, AlphaBounds, GridEntry, ParameterConfiguration, SweepTask, expand_grid,
    format_alpha,
};
pub use orchestrator::{ConfigState, Orchestrator, SweepReport};
