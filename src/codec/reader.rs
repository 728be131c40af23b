//! Streaming reader for canonical vector files.
//!
//! Datasets can be far larger than memory, so the reader never loads a whole
//! payload on its own. Callers walk the file in fixed-size row blocks, or
//! seek straight to a contiguous row range.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::codec::types::{DatasetHeader, Element, HEADER_SIZE, RowBlock, decode_into};
use crate::error::{ErrorContext, PipelineError, PipelineResult};

/// Suffix used by downloaders and writers for files still being produced.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Path of the in-progress sibling of `path`.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Fails with `DatasetNotFound` unless `path` exists and is complete.
///
/// A file whose `.partial` sibling still exists is being downloaded or
/// written and must not be consumed, whatever its current size.
pub fn ensure_available(path: &Path) -> PipelineResult<()> {
    if !path.is_file() || partial_path(path).exists() {
        return Err(PipelineError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Reads (N, D) without touching the payload.
pub fn read_header(path: &Path) -> PipelineResult<DatasetHeader> {
    ensure_available(path)?;
    let mut file = File::open(path).read_context(path)?;
    read_header_from(&mut file, path)
}

fn read_header_from<R: Read>(reader: &mut R, path: &Path) -> PipelineResult<DatasetHeader> {
    let mut bytes = [0u8; HEADER_SIZE as usize];
    let got = read_fully(reader, &mut bytes).read_context(path)?;
    if got < bytes.len() {
        return Err(PipelineError::IncompleteRead {
            path: path.to_path_buf(),
            expected: HEADER_SIZE,
            actual: got as u64,
        });
    }
    DatasetHeader::from_bytes(bytes, path)
}

/// Header of a canonical file next to its size on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub header: DatasetHeader,
    pub expected_bytes: u64,
    pub actual_bytes: u64,
}

impl FileReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.expected_bytes == self.actual_bytes
    }
}

/// Reads the header of `path` and compares the declared size to the real one.
///
/// A size mismatch is reported, not raised, so the caller can show both.
pub fn inspect(path: &Path) -> PipelineResult<FileReport> {
    let header = read_header(path)?;
    let actual_bytes = std::fs::metadata(path).read_context(path)?.len();
    Ok(FileReport {
        header,
        expected_bytes: header.file_bytes(),
        actual_bytes,
    })
}

/// Like `read_exact`, but reports how many bytes arrived before EOF.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reader over a canonical file with element type `T`.
#[derive(Debug)]
pub struct VectorReader<T: Element> {
    path: PathBuf,
    file: BufReader<File>,
    header: DatasetHeader,
    block_rows: usize,
    _element: PhantomData<T>,
}

impl<T: Element> VectorReader<T> {
    /// Opens `path` and validates the header against the file length.
    ///
    /// A file shorter than its header declares is an `IncompleteRead`; a
    /// longer one is a `CorruptDataset`.
    ///
    /// # Arguments
    /// * `path` - Canonical file to read
    /// * `block_rows` - Rows per block yielded by `blocks()`
    pub fn open(path: impl AsRef<Path>, block_rows: usize) -> PipelineResult<Self> {
        let path = path.as_ref();
        ensure_available(path)?;

        let mut file = File::open(path).read_context(path)?;
        let header = read_header_from(&mut file, path)?;
        let actual = file.metadata().read_context(path)?.len();

        if actual < header.file_bytes() {
            return Err(PipelineError::IncompleteRead {
                path: path.to_path_buf(),
                expected: header.file_bytes(),
                actual,
            });
        }
        if actual > header.file_bytes() {
            return Err(PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: format!(
                    "header declares {} x {} elements but the file is longer",
                    header.num_points, header.dimension
                ),
                expected: header.file_bytes(),
                actual,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            header,
            block_rows: block_rows.max(1),
            _element: PhantomData,
        })
    }

    #[must_use]
    pub fn header(&self) -> DatasetHeader {
        self.header
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn block_rows(&self) -> usize {
        self.block_rows
    }

    /// Starts a fresh pass over the payload.
    ///
    /// Each call restarts from row 0, so the sequence can be scanned any
    /// number of times.
    pub fn blocks(&mut self) -> PipelineResult<Blocks<'_, T>> {
        self.rewind()?;
        Ok(Blocks {
            reader: self,
            next_row: 0,
            bytes: Vec::new(),
        })
    }

    /// Repositions the underlying stream at row 0.
    pub fn rewind(&mut self) -> PipelineResult<()> {
        self.seek_row(0)
    }

    /// Reads `count` rows starting at `start_row`.
    ///
    /// Seeks directly to the range; rows before it are never read.
    pub fn read_range(&mut self, start_row: usize, count: usize) -> PipelineResult<Vec<T>> {
        let available = self.header.num_points;
        if start_row.checked_add(count).is_none_or(|end| end > available) {
            return Err(PipelineError::InsufficientData {
                path: self.path.clone(),
                required: start_row.saturating_add(count),
                available,
            });
        }

        self.seek_row(start_row)?;
        let mut bytes = Vec::new();
        self.read_rows_into(start_row, count, &mut bytes)?;

        let mut values = Vec::with_capacity(count * self.header.dimension);
        decode_into(&bytes, &mut values);
        Ok(values)
    }

    /// Reads the first `count` rows.
    pub fn read_prefix(&mut self, count: usize) -> PipelineResult<Vec<T>> {
        self.read_range(0, count)
    }

    /// Reads the whole payload. Only for inputs known to fit in memory.
    pub fn read_all(&mut self) -> PipelineResult<Vec<T>> {
        self.read_range(0, self.header.num_points)
    }

    fn seek_row(&mut self, row: usize) -> PipelineResult<()> {
        let offset = self.header.row_offset(row);
        self.file
            .seek(SeekFrom::Start(offset))
            .read_context(&self.path)?;
        Ok(())
    }

    fn read_rows_into(
        &mut self,
        start_row: usize,
        count: usize,
        bytes: &mut Vec<u8>,
    ) -> PipelineResult<()> {
        let wanted = count as u64 * self.header.row_bytes();
        bytes.clear();
        bytes.resize(wanted as usize, 0);

        let got = read_fully(&mut self.file, bytes).read_context(&self.path)?;
        if (got as u64) < wanted {
            return Err(PipelineError::IncompleteRead {
                path: self.path.clone(),
                expected: self.header.file_bytes(),
                actual: self.header.row_offset(start_row) + got as u64,
            });
        }
        Ok(())
    }
}

/// Lazy, finite sequence of row blocks over one pass of a file.
pub struct Blocks<'a, T: Element> {
    reader: &'a mut VectorReader<T>,
    next_row: usize,
    bytes: Vec<u8>,
}

impl<T: Element> Iterator for Blocks<'_, T> {
    type Item = PipelineResult<RowBlock<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.reader.header.num_points;
        if self.next_row >= total {
            return None;
        }

        let start_row = self.next_row;
        let count = self.reader.block_rows.min(total - start_row);
        // Stop after an error; the rest of the pass would be misaligned.
        self.next_row = total;

        if let Err(e) = self
            .reader
            .read_rows_into(start_row, count, &mut self.bytes)
        {
            return Some(Err(e));
        }

        let dimension = self.reader.header.dimension;
        let mut data = Vec::with_capacity(count * dimension);
        decode_into(&self.bytes, &mut data);
        self.next_row = start_row + count;

        Some(Ok(RowBlock {
            start_row,
            dimension,
            data,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.header.num_points.saturating_sub(self.next_row);
        let blocks = remaining.div_ceil(self.reader.block_rows);
        (blocks, Some(blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::writer::write_dataset;
    use tempfile::TempDir;

    fn sample_file(dir: &TempDir, rows: usize, dim: usize) -> PathBuf {
        let path = dir.path().join("data.bin");
        let data: Vec<f32> = (0..rows * dim).map(|i| i as f32).collect();
        write_dataset(&path, dim, &data).unwrap();
        path
    }

    #[test]
    fn test_inspect_reports_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 4, 3);

        let report = inspect(&path).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.expected_bytes, 8 + 4 * 3 * 4);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 4);
        std::fs::write(&path, bytes).unwrap();
        let report = inspect(&path).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.actual_bytes, report.expected_bytes - 4);
    }

    #[test]
    fn test_blocks_cover_every_row_once() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 10, 3);

        let mut reader = VectorReader::<f32>::open(&path, 4).unwrap();
        let blocks: Vec<_> = reader.blocks().unwrap().map(|b| b.unwrap()).collect();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].rows(), 4);
        assert_eq!(blocks[2].rows(), 2);
        assert_eq!(blocks[2].start_row, 8);
        assert_eq!(blocks[1].row(0), &[12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_blocks_are_restartable() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 5, 2);

        let mut reader = VectorReader::<f32>::open(&path, 2).unwrap();
        let first: Vec<_> = reader.blocks().unwrap().map(|b| b.unwrap()).collect();
        let second: Vec<_> = reader.blocks().unwrap().map(|b| b.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_range_seeks_to_offset() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 10, 2);

        let mut reader = VectorReader::<f32>::open(&path, 100).unwrap();
        let rows = reader.read_range(7, 2).unwrap();
        assert_eq!(rows, vec![14.0, 15.0, 16.0, 17.0]);

        let err = reader.read_range(9, 2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                required: 11,
                available: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_length_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 4, 2);

        // Append a stray element
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let err = VectorReader::<f32>::open(&path, 8).unwrap_err();
        match err {
            PipelineError::CorruptDataset {
                expected, actual, ..
            } => {
                assert_eq!(expected, 8 + 4 * 2 * 4);
                assert_eq!(actual, expected + 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_payload_is_incomplete_read() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 4, 2);

        // Drop the last element
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = VectorReader::<f32>::open(&path, 8).unwrap_err();
        match err {
            PipelineError::IncompleteRead {
                expected, actual, ..
            } => {
                assert_eq!(expected, 8 + 4 * 2 * 4);
                assert_eq!(actual, expected - 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_header_is_incomplete_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [1u8, 0, 0]).unwrap();

        let err = read_header(&path).unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteRead { actual: 3, .. }));
    }

    #[test]
    fn test_partial_sibling_means_not_available() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir, 2, 2);
        std::fs::write(partial_path(&path), b"").unwrap();

        let err = read_header(&path).unwrap_err();
        assert!(matches!(err, PipelineError::DatasetNotFound { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = VectorReader::<u32>::open("/nonexistent/gt.bin", 8).unwrap_err();
        assert_eq!(err.status_code(), "DATASET_NOT_FOUND");
    }
}
