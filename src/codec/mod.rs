//! Canonical vector file codec.
//!
//! All datasets, queries, ground-truth tables and LID profiles use the flat
//! `[int32 N][int32 D][payload]` layout. This module provides:
//! - `VectorReader`: restartable block streaming and direct range reads
//! - `VectorWriter`: header-first block writing with atomic completion
//! - `MappedDataset`: memory-mapped random row access
//! - `read_header`: (N, D) without touching the payload
//! - `inspect`: header against the real file size

mod mapped;
mod reader;
mod types;
mod writer;

pub use mapped::MappedDataset;
pub use reader::{
    Blocks, FileReport, PARTIAL_SUFFIX, VectorReader, ensure_available, inspect, partial_path,
    read_header,
};
pub use types::{
    DatasetHeader, ELEMENT_SIZE, Element, ElementKind, HEADER_SIZE, RowBlock, decode_into,
    encode_into,
};
pub use writer::{VectorWriter, write_dataset};
