//! LID-adaptive graph index benchmarking pipeline.
//!
//! Converts vector datasets into one canonical binary layout, estimates a
//! per-point Local Intrinsic Dimensionality profile, drives an external
//! disk index engine across a parameter grid and aggregates the measured
//! recall/QPS into a CSV ledger.

pub mod adapters;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod lid;
pub mod results;
pub mod sweep;

// Explicit exports for better API clarity
pub use codec::{DatasetHeader, Element, ElementKind, MappedDataset, VectorReader, VectorWriter};
pub use config::Settings;
pub use error::{PipelineError, PipelineResult};
pub use lid::{LidEstimator, LidMode, LidSummary, ProfileStats};
pub use results::{Ledger, TrialResult};
pub use sweep::{
    Algorithm, AlphaBounds, IndexEngine, Orchestrator, ParameterConfiguration, ProcessEngine,
    SweepReport,
};
