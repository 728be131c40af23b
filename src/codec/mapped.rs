//! Memory-mapped random access to canonical files.
//!
//! Row access goes through the OS page cache, so sampling an arbitrary
//! offset range of a multi-hundred-gigabyte file only touches the pages
//! that back that range. The map is read-only and `Sync`, which lets worker
//! threads share one dataset without locking.

use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::codec::reader::ensure_available;
use crate::codec::types::{DatasetHeader, ELEMENT_SIZE, Element, HEADER_SIZE, decode_into};
use crate::error::{ErrorContext, PipelineError, PipelineResult};

/// Read-only mapped view of a canonical file.
#[derive(Debug)]
pub struct MappedDataset<T: Element> {
    path: PathBuf,
    mmap: Mmap,
    header: DatasetHeader,
    _element: PhantomData<T>,
}

impl<T: Element> MappedDataset<T> {
    /// Maps `path` and validates its header against the mapped length.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        ensure_available(path)?;

        let file = File::open(path).read_context(path)?;
        // SAFETY: the map is read-only; canonical files are never modified
        // in place once renamed from their `.partial` sibling.
        let mmap = unsafe { MmapOptions::new().map(&file).read_context(path)? };

        if (mmap.len() as u64) < HEADER_SIZE {
            return Err(PipelineError::IncompleteRead {
                path: path.to_path_buf(),
                expected: HEADER_SIZE,
                actual: mmap.len() as u64,
            });
        }

        let header = DatasetHeader::from_bytes(
            [
                mmap[0], mmap[1], mmap[2], mmap[3], mmap[4], mmap[5], mmap[6], mmap[7],
            ],
            path,
        )?;

        if (mmap.len() as u64) < header.file_bytes() {
            return Err(PipelineError::IncompleteRead {
                path: path.to_path_buf(),
                expected: header.file_bytes(),
                actual: mmap.len() as u64,
            });
        }
        if mmap.len() as u64 > header.file_bytes() {
            return Err(PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: "mapped length exceeds header".to_string(),
                expected: header.file_bytes(),
                actual: mmap.len() as u64,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            _element: PhantomData,
        })
    }

    #[must_use]
    pub fn header(&self) -> DatasetHeader {
        self.header
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.header.num_points
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.num_points == 0
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.header.dimension
    }

    /// Decodes `count` rows starting at `start_row`.
    pub fn rows(&self, start_row: usize, count: usize) -> PipelineResult<Vec<T>> {
        let available = self.header.num_points;
        if start_row.checked_add(count).is_none_or(|end| end > available) {
            return Err(PipelineError::InsufficientData {
                path: self.path.clone(),
                required: start_row.saturating_add(count),
                available,
            });
        }

        let start = self.header.row_offset(start_row) as usize;
        let end = start + count * self.header.dimension * ELEMENT_SIZE;
        let mut values = Vec::with_capacity(count * self.header.dimension);
        decode_into(&self.mmap[start..end], &mut values);
        Ok(values)
    }

    /// Decodes one row into `out`, which must be `dimension()` long.
    ///
    /// # Panics
    /// Panics if `row` is out of range or `out` has the wrong length.
    pub fn row_into(&self, row: usize, out: &mut [T]) {
        assert!(row < self.header.num_points, "row {row} out of range");
        assert_eq!(out.len(), self.header.dimension);

        let start = self.header.row_offset(row) as usize;
        let bytes = &self.mmap[start..start + out.len() * ELEMENT_SIZE];
        for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(ELEMENT_SIZE)) {
            *slot = T::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::writer::write_dataset;
    use tempfile::TempDir;

    #[test]
    fn test_mapped_rows_match_written_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.bin");
        let data: Vec<f32> = (0..40).map(|i| i as f32 * 0.5).collect();
        write_dataset(&path, 4, &data).unwrap();

        let mapped = MappedDataset::<f32>::open(&path).unwrap();
        assert_eq!(mapped.len(), 10);
        assert_eq!(mapped.rows(3, 2).unwrap(), data[12..20].to_vec());

        let mut row = vec![0.0f32; 4];
        mapped.row_into(9, &mut row);
        assert_eq!(row, data[36..40].to_vec());
    }

    #[test]
    fn test_mapped_range_past_end_is_insufficient() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.bin");
        write_dataset(&path, 2, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();

        let mapped = MappedDataset::<f32>::open(&path).unwrap();
        assert!(matches!(
            mapped.rows(1, 5).unwrap_err(),
            PipelineError::InsufficientData { .. }
        ));
    }

    #[test]
    fn test_mapped_truncated_payload_is_incomplete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.bin");
        write_dataset(&path, 2, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(
            MappedDataset::<f32>::open(&path).unwrap_err(),
            PipelineError::IncompleteRead {
                expected: 24,
                actual: 20,
                ..
            }
        ));
    }

    #[test]
    fn test_mapped_oversized_payload_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.bin");
        write_dataset(&path, 2, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 4]);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            MappedDataset::<f32>::open(&path).unwrap_err(),
            PipelineError::CorruptDataset { .. }
        ));
    }
}
