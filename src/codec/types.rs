//! Core types for the canonical vector file layout.
//!
//! Every dataset, query set, ground-truth table and LID profile in the
//! pipeline shares one layout:
//!
//! ```text
//! [int32 N][int32 D][N x D elements, 4 bytes each, little-endian, row-major]
//! ```
//!
//! The file carries no element tag, so the element kind is chosen by the
//! caller through the `Element` type parameter.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Size of the canonical header in bytes (two int32 fields).
pub const HEADER_SIZE: u64 = 8;

/// Number of bytes per stored element (f32 or u32).
pub const ELEMENT_SIZE: usize = 4;

/// Kind of value stored in a canonical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Real-valued embedding coordinates or LID values.
    Float32,
    /// Integer identifiers, e.g. ground-truth neighbor ids.
    UInt32,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float32 => write!(f, "float32"),
            Self::UInt32 => write!(f, "uint32"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for u32 {}
}

/// Element type that can be stored in a canonical file.
///
/// Sealed: only `f32` and `u32` are valid payload types.
pub trait Element:
    Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + sealed::Sealed + 'static
{
    const KIND: ElementKind;

    fn from_le_bytes(bytes: [u8; 4]) -> Self;

    fn to_le_bytes(self) -> [u8; 4];
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::Float32;

    fn from_le_bytes(bytes: [u8; 4]) -> Self {
        f32::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> [u8; 4] {
        f32::to_le_bytes(self)
    }
}

impl Element for u32 {
    const KIND: ElementKind = ElementKind::UInt32;

    fn from_le_bytes(bytes: [u8; 4]) -> Self {
        u32::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> [u8; 4] {
        u32::to_le_bytes(self)
    }
}

/// The (N, D) pair at the front of every canonical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub num_points: usize,
    pub dimension: usize,
}

impl DatasetHeader {
    /// Creates a header, rejecting values that do not fit the int32 fields.
    pub fn new(num_points: usize, dimension: usize) -> PipelineResult<Self> {
        let limit = i32::MAX as usize;
        if num_points > limit || dimension > limit || dimension == 0 {
            return Err(PipelineError::ConfigError {
                reason: format!(
                    "header ({num_points}, {dimension}) does not fit the canonical int32 fields"
                ),
            });
        }
        Ok(Self {
            num_points,
            dimension,
        })
    }

    /// Bytes occupied by one row.
    #[must_use]
    pub fn row_bytes(&self) -> u64 {
        (self.dimension * ELEMENT_SIZE) as u64
    }

    /// Bytes the payload must occupy after the header.
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        self.num_points as u64 * self.row_bytes()
    }

    /// Total file size implied by the header.
    #[must_use]
    pub fn file_bytes(&self) -> u64 {
        HEADER_SIZE + self.payload_bytes()
    }

    /// Byte offset of `row` from the start of the file.
    #[must_use]
    pub fn row_offset(&self, row: usize) -> u64 {
        HEADER_SIZE + row as u64 * self.row_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&(self.num_points as i32).to_le_bytes());
        bytes[4..8].copy_from_slice(&(self.dimension as i32).to_le_bytes());
        bytes
    }

    /// Parses the 8 header bytes of the file at `path`.
    pub fn from_bytes(bytes: [u8; 8], path: &Path) -> PipelineResult<Self> {
        let n = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let d = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if n < 0 || d <= 0 {
            return Err(PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: format!("invalid header fields N={n}, D={d}"),
                expected: HEADER_SIZE,
                actual: HEADER_SIZE,
            });
        }
        Ok(Self {
            num_points: n as usize,
            dimension: d as usize,
        })
    }
}

/// Decodes little-endian payload bytes into `out`.
///
/// `bytes.len()` must be a multiple of `ELEMENT_SIZE`.
pub fn decode_into<T: Element>(bytes: &[u8], out: &mut Vec<T>) {
    out.reserve(bytes.len() / ELEMENT_SIZE);
    for chunk in bytes.chunks_exact(ELEMENT_SIZE) {
        out.push(T::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

/// Encodes values as little-endian payload bytes, appending to `out`.
pub fn encode_into<T: Element>(values: &[T], out: &mut Vec<u8>) {
    out.reserve(values.len() * ELEMENT_SIZE);
    for &value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// A block of consecutive rows read from a canonical file.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock<T> {
    /// Index of the first row of this block within the file.
    pub start_row: usize,
    pub dimension: usize,
    /// Row-major values, `rows() * dimension` long.
    pub data: Vec<T>,
}

impl<T: Element> RowBlock<T> {
    #[must_use]
    pub fn rows(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[must_use]
    pub fn row(&self, index: usize) -> &[T] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        let header = DatasetHeader::new(1000, 8).unwrap();
        assert_eq!(header.row_bytes(), 32);
        assert_eq!(header.payload_bytes(), 1000 * 8 * 4);
        assert_eq!(header.file_bytes(), 8 + 1000 * 8 * 4);
        assert_eq!(header.row_offset(2), 8 + 64);
    }

    #[test]
    fn test_header_rejects_negative_fields() {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&(-5i32).to_le_bytes());
        bytes[4..8].copy_from_slice(&4i32.to_le_bytes());
        let err = DatasetHeader::from_bytes(bytes, Path::new("bad.bin")).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptDataset { .. }));
    }

    #[test]
    fn test_header_rejects_zero_dimension() {
        assert!(DatasetHeader::new(10, 0).is_err());
    }

    #[test]
    fn test_row_block_rows() {
        let block = RowBlock {
            start_row: 4,
            dimension: 2,
            data: vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        assert_eq!(block.rows(), 3);
        assert_eq!(block.row(1), &[3.0, 4.0]);
        assert_eq!(block.iter_rows().count(), 3);
    }
}
