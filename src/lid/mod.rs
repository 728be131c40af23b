//! Local Intrinsic Dimensionality estimation.
//!
//! Produces one Float32 value per dataset point using the Levina-Bickel
//! maximum-likelihood estimator over Euclidean k-NN distances.

mod estimator;
mod knn;
mod mle;
mod stats;

pub use estimator::{LidEstimator, LidMode, LidSummary, default_profile_path};
pub use knn::{exact_lid, exact_lid_mapped, knn_distances};
pub use mle::{DISTANCE_FLOOR, EXACT_LID_MAX, LID_MIN, SAMPLE_LID_MAX, clip, mle_lid, mle_raw};
pub use stats::{ProfileStats, profile_stats};
