//! Per-record-header formats (`.fvecs`, `.ivecs`, `.bvecs`).
//!
//! Each record carries its own int32 dimension followed by `dim` values:
//!
//! ```text
//! [int32 dim][dim x value] [int32 dim][dim x value] ...
//! ```
//!
//! The first record's dimension is taken as the dimension of the whole file;
//! every later record is checked against it while repacking.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{DatasetHeader, Element, ElementKind, VectorWriter, ensure_available};
use crate::config::ConvertConfig;
use crate::error::{ErrorContext, PipelineError, PipelineResult};

/// Size of the per-record dimension prefix.
const RECORD_PREFIX: usize = 4;

/// Foreign per-record-header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// f32 values, kept as Float32
    Fvecs,
    /// i32 values, stored as UInt32 identifiers
    Ivecs,
    /// u8 values, widened to Float32
    Bvecs,
}

impl RecordFormat {
    /// Bytes per value inside a record.
    #[must_use]
    pub fn value_size(self) -> usize {
        match self {
            Self::Fvecs | Self::Ivecs => 4,
            Self::Bvecs => 1,
        }
    }

    /// Element kind of the canonical output.
    #[must_use]
    pub fn element_kind(self) -> ElementKind {
        match self {
            Self::Fvecs | Self::Bvecs => ElementKind::Float32,
            Self::Ivecs => ElementKind::UInt32,
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fvecs" => Ok(Self::Fvecs),
            "ivecs" => Ok(Self::Ivecs),
            "bvecs" => Ok(Self::Bvecs),
            other => Err(format!(
                "unknown record format '{other}' (expected fvecs, ivecs or bvecs)"
            )),
        }
    }
}

impl std::fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fvecs => write!(f, "fvecs"),
            Self::Ivecs => write!(f, "ivecs"),
            Self::Bvecs => write!(f, "bvecs"),
        }
    }
}

/// Outcome of one conversion into the canonical format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub source: PathBuf,
    pub output: PathBuf,
    pub header: DatasetHeader,
    pub kind: ElementKind,
    /// Number of batches the source was read in
    pub batches: usize,
    /// Whether the source exceeded the in-memory threshold
    pub streamed: bool,
}

/// Repacks a per-record-header file into a canonical file.
///
/// # Arguments
/// * `src` - Foreign input file
/// * `dst` - Canonical output path
/// * `format` - Layout of `src`
/// * `config` - Batch size and in-memory threshold
/// * `limit` - Convert only the first `limit` records when set
pub fn convert_records(
    src: &Path,
    dst: &Path,
    format: RecordFormat,
    config: &ConvertConfig,
    limit: Option<usize>,
) -> PipelineResult<ConversionSummary> {
    ensure_available(src)?;

    let file = File::open(src).read_context(src)?;
    let file_len = file.metadata().read_context(src)?.len();
    let mut reader = BufReader::new(file);

    let mut prefix = [0u8; RECORD_PREFIX];
    read_exact_or_incomplete(&mut reader, &mut prefix, src, file_len, 0)?;
    let dim = i32::from_le_bytes(prefix);
    if dim <= 0 {
        return Err(PipelineError::CorruptDataset {
            path: src.to_path_buf(),
            reason: format!("first record declares dimension {dim}"),
            expected: 1,
            actual: 0,
        });
    }
    let dim = dim as usize;

    let record_size = (RECORD_PREFIX + dim * format.value_size()) as u64;
    if file_len % record_size != 0 {
        return Err(PipelineError::CorruptDataset {
            path: src.to_path_buf(),
            reason: format!(
                "file length is not a multiple of the {record_size}-byte record size"
            ),
            expected: (file_len / record_size + 1) * record_size,
            actual: file_len,
        });
    }

    let total = (file_len / record_size) as usize;
    let num_points = limit.map_or(total, |m| m.min(total));
    let header = DatasetHeader::new(num_points, dim)?;

    let streamed = file_len > config.in_memory_threshold_bytes;
    let batch_records = if streamed {
        config.batch_records.max(1)
    } else {
        num_points.max(1)
    };

    let mut job = RepackJob {
        src,
        reader,
        first_prefix: Some(prefix),
        dim,
        record_size: record_size as usize,
        file_len,
        batch_records,
        num_points,
    };

    let batches = match format {
        RecordFormat::Fvecs => job.run::<f32>(dst, header, |chunk, index, path| {
            Ok(f32::from_le_bytes(le4(chunk, index, path)?))
        })?,
        RecordFormat::Bvecs => job.run::<f32>(dst, header, |chunk, _, _| Ok(chunk[0] as f32))?,
        RecordFormat::Ivecs => job.run::<u32>(dst, header, |chunk, index, path| {
            let id = i32::from_le_bytes(le4(chunk, index, path)?);
            u32::try_from(id).map_err(|_| PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: format!("record {index} holds negative identifier {id}"),
                expected: 0,
                actual: 0,
            })
        })?,
    };

    info!(
        "Converted {} ({format}) -> {}: {} x {} in {batches} batch(es)",
        src.display(),
        dst.display(),
        header.num_points,
        header.dimension
    );

    Ok(ConversionSummary {
        source: src.to_path_buf(),
        output: dst.to_path_buf(),
        header,
        kind: format.element_kind(),
        batches,
        streamed,
    })
}

fn le4(chunk: &[u8], index: usize, path: &Path) -> PipelineResult<[u8; 4]> {
    chunk.try_into().map_err(|_| PipelineError::CorruptDataset {
        path: path.to_path_buf(),
        reason: format!("record {index} has a truncated value"),
        expected: 4,
        actual: chunk.len() as u64,
    })
}

struct RepackJob<'a> {
    src: &'a Path,
    reader: BufReader<File>,
    /// Dimension prefix of record 0, already consumed from the stream.
    first_prefix: Option<[u8; RECORD_PREFIX]>,
    dim: usize,
    record_size: usize,
    file_len: u64,
    batch_records: usize,
    num_points: usize,
}

impl RepackJob<'_> {
    fn run<T: Element>(
        &mut self,
        dst: &Path,
        header: DatasetHeader,
        decode: impl Fn(&[u8], usize, &Path) -> PipelineResult<T>,
    ) -> PipelineResult<usize> {
        let mut writer = VectorWriter::<T>::create(dst, header)?;
        let value_size = (self.record_size - RECORD_PREFIX) / self.dim;

        let mut raw = Vec::new();
        let mut values: Vec<T> = Vec::new();
        let mut done = 0;
        let mut batches = 0;

        while done < self.num_points {
            let count = self.batch_records.min(self.num_points - done);
            self.fill_batch(&mut raw, count, done)?;

            values.clear();
            values.reserve(count * self.dim);
            for (offset, record) in raw.chunks_exact(self.record_size).enumerate() {
                let index = done + offset;
                let declared = i32::from_le_bytes([record[0], record[1], record[2], record[3]]);
                if declared as i64 != self.dim as i64 {
                    return Err(PipelineError::CorruptDataset {
                        path: self.src.to_path_buf(),
                        reason: format!("record {index} declares a different dimension"),
                        expected: self.dim as u64,
                        actual: declared.max(0) as u64,
                    });
                }
                for chunk in record[RECORD_PREFIX..].chunks_exact(value_size) {
                    values.push(decode(chunk, index, self.src)?);
                }
            }

            writer.write_block(&values)?;
            done += count;
            batches += 1;
            debug!("repacked {done}/{} records", self.num_points);
        }

        writer.finish()?;
        Ok(batches)
    }

    /// Reads `count` whole records into `raw`, re-inserting the prefix of
    /// record 0 that was consumed while sniffing the dimension.
    fn fill_batch(
        &mut self,
        raw: &mut Vec<u8>,
        count: usize,
        first_record: usize,
    ) -> PipelineResult<()> {
        raw.clear();
        raw.resize(count * self.record_size, 0);

        let mut start = 0;
        if let Some(prefix) = self.first_prefix.take() {
            raw[..RECORD_PREFIX].copy_from_slice(&prefix);
            start = RECORD_PREFIX;
        }

        let offset = (first_record * self.record_size + start) as u64;
        read_exact_or_incomplete(
            &mut self.reader,
            &mut raw[start..],
            self.src,
            self.file_len,
            offset,
        )
    }
}

fn read_exact_or_incomplete<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    path: &Path,
    expected: u64,
    offset: u64,
) -> PipelineResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PipelineError::IncompleteRead {
            path: path.to_path_buf(),
            expected,
            actual: offset,
        }),
        Err(e) => Err(e).read_context(path),
    }
}
