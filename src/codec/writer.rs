//! Block writer for canonical vector files.
//!
//! The header is written first, then successive row blocks. Output goes to a
//! `.partial` sibling that is renamed into place only after the declared row
//! count has been reached, so an interrupted writer never leaves behind a
//! file that looks complete.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::codec::reader::partial_path;
use crate::codec::types::{DatasetHeader, Element, encode_into};
use crate::error::{ErrorContext, PipelineError, PipelineResult};

/// Writer for a canonical file with element type `T`.
pub struct VectorWriter<T: Element> {
    path: PathBuf,
    partial: PathBuf,
    file: Option<BufWriter<File>>,
    header: DatasetHeader,
    rows_written: usize,
    scratch: Vec<u8>,
    _element: PhantomData<T>,
}

impl<T: Element> VectorWriter<T> {
    /// Creates the output and writes the header.
    pub fn create(path: impl AsRef<Path>, header: DatasetHeader) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).write_context(parent)?;
        }

        let partial = partial_path(&path);
        let mut file = BufWriter::new(File::create(&partial).write_context(&partial)?);
        file.write_all(&header.to_bytes()).write_context(&partial)?;

        Ok(Self {
            path,
            partial,
            file: Some(file),
            header,
            rows_written: 0,
            scratch: Vec::new(),
            _element: PhantomData,
        })
    }

    #[must_use]
    pub fn header(&self) -> DatasetHeader {
        self.header
    }

    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Appends a block of whole rows (row-major).
    pub fn write_block(&mut self, values: &[T]) -> PipelineResult<()> {
        let dimension = self.header.dimension;
        if values.len() % dimension != 0 {
            return Err(PipelineError::CorruptDataset {
                path: self.path.clone(),
                reason: "block is not a whole number of rows".to_string(),
                expected: dimension as u64,
                actual: (values.len() % dimension) as u64,
            });
        }

        let rows = values.len() / dimension;
        if self.rows_written + rows > self.header.num_points {
            return Err(PipelineError::CorruptDataset {
                path: self.path.clone(),
                reason: "more rows written than the header declares".to_string(),
                expected: self.header.num_points as u64,
                actual: (self.rows_written + rows) as u64,
            });
        }

        self.scratch.clear();
        encode_into(values, &mut self.scratch);
        let Some(file) = self.file.as_mut() else {
            return Err(PipelineError::FileWrite {
                path: self.path.clone(),
                source: std::io::Error::other("writer already finished"),
            });
        };
        file.write_all(&self.scratch).write_context(&self.partial)?;
        self.rows_written += rows;
        Ok(())
    }

    /// Flushes, checks the row count and moves the file into place.
    pub fn finish(mut self) -> PipelineResult<DatasetHeader> {
        if self.rows_written != self.header.num_points {
            return Err(PipelineError::CorruptDataset {
                path: self.path.clone(),
                reason: "writer finished before the declared row count".to_string(),
                expected: self.header.num_points as u64,
                actual: self.rows_written as u64,
            });
        }

        if let Some(file) = self.file.take() {
            let file = file
                .into_inner()
                .map_err(|e| e.into_error())
                .write_context(&self.partial)?;
            file.sync_all().write_context(&self.partial)?;
        }
        fs::rename(&self.partial, &self.path).write_context(&self.path)?;
        Ok(self.header)
    }
}

impl<T: Element> Drop for VectorWriter<T> {
    fn drop(&mut self) {
        // Unfinished output must not survive as a half-written file.
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// Writes an in-memory row-major buffer as a complete canonical file.
pub fn write_dataset<T: Element>(
    path: impl AsRef<Path>,
    dimension: usize,
    values: &[T],
) -> PipelineResult<DatasetHeader> {
    if dimension == 0 || values.len() % dimension != 0 {
        return Err(PipelineError::CorruptDataset {
            path: path.as_ref().to_path_buf(),
            reason: "buffer is not a whole number of rows".to_string(),
            expected: dimension as u64,
            actual: values.len() as u64,
        });
    }
    let header = DatasetHeader::new(values.len() / dimension, dimension)?;
    let mut writer = VectorWriter::create(path, header)?;
    writer.write_block(values)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::reader::{VectorReader, read_header};
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_preserves_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.bin");
        let ids: Vec<u32> = (0..60).map(|i| i * 7 + 1).collect();

        let header = DatasetHeader::new(6, 10).unwrap();
        let mut writer = VectorWriter::<u32>::create(&path, header).unwrap();
        writer.write_block(&ids[..40]).unwrap();
        writer.write_block(&ids[40..]).unwrap();
        writer.finish().unwrap();

        assert_eq!(read_header(&path).unwrap(), header);
        let mut reader = VectorReader::<u32>::open(&path, 4).unwrap();
        assert_eq!(reader.read_all().unwrap(), ids);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, header.file_bytes());
        assert_eq!(&bytes[0..4], &6i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &10i32.to_le_bytes());
    }

    #[test]
    fn test_short_write_is_rejected_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        let header = DatasetHeader::new(3, 2).unwrap();

        let mut writer = VectorWriter::<f32>::create(&path, header).unwrap();
        writer.write_block(&[1.0, 2.0]).unwrap();
        let err = writer.finish().unwrap_err();

        assert!(matches!(
            err,
            PipelineError::CorruptDataset {
                expected: 3,
                actual: 1,
                ..
            }
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_overflowing_write_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("over.bin");
        let header = DatasetHeader::new(1, 2).unwrap();

        let mut writer = VectorWriter::<f32>::create(&path, header).unwrap();
        assert!(writer.write_block(&[1.0, 2.0, 3.0, 4.0]).is_err());
        assert!(writer.write_block(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_partial_file_hidden_until_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lid.bin");
        let header = DatasetHeader::new(2, 1).unwrap();

        let mut writer = VectorWriter::<f32>::create(&path, header).unwrap();
        writer.write_block(&[3.5]).unwrap();
        assert!(!path.exists());
        assert!(partial_path(&path).exists());

        writer.write_block(&[4.5]).unwrap();
        writer.finish().unwrap();
        assert!(path.exists());
        assert!(!partial_path(&path).exists());
    }
}
