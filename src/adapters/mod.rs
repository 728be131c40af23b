//! Format adapters into the canonical layout.
//!
//! - `vecs`: per-record-header files (`fvecs`, `ivecs`, `bvecs`)
//! - `container`: named-array containers (`train`/`test`/`neighbors`)
//! - `generate`: query extraction and exact ground truth
//!
//! Every adapter writes through `codec::VectorWriter`, so its output always
//! satisfies the canonical header/payload invariant.

pub mod container;
pub mod generate;
pub mod npy;
pub mod vecs;

pub use container::{
    ArrayRole, array_path, convert_array, convert_role, l2_normalize_rows, list_arrays,
};
pub use generate::{compute_ground_truth, extract_queries, squared_l2};
pub use npy::{NpyArray, NpyDtype};
pub use vecs::{ConversionSummary, RecordFormat, convert_records};
