//! Streaming reader for NumPy `.npy` arrays.
//!
//! Only what dataset containers actually hold is accepted: 2-D, C-ordered,
//! little-endian numeric arrays. Rows are read on demand, so a container
//! array larger than memory can be repacked block by block.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec::{Element, ensure_available};
use crate::error::{ErrorContext, PipelineError, PipelineResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Element dtype of an `.npy` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    F32,
    F64,
    U8,
    I32,
    I64,
    U32,
}

impl NpyDtype {
    fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(Self::F32),
            "<f8" => Some(Self::F64),
            "|u1" | "<u1" => Some(Self::U8),
            "<i4" => Some(Self::I32),
            "<i8" => Some(Self::I64),
            "<u4" => Some(Self::U32),
            _ => None,
        }
    }

    #[must_use]
    pub fn item_size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }
}

/// Canonical element that an `.npy` value can be cast into.
pub trait NpyCast: Element {
    /// Casts one raw little-endian value, or explains why it cannot.
    fn cast(dtype: NpyDtype, raw: &[u8]) -> Result<Self, String>;

    /// Whether arrays of `dtype` can be read as `Self` at all.
    fn accepts(dtype: NpyDtype) -> bool;
}

fn le<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&raw[..N]);
    bytes
}

impl NpyCast for f32 {
    fn cast(dtype: NpyDtype, raw: &[u8]) -> Result<Self, String> {
        Ok(match dtype {
            NpyDtype::F32 => f32::from_le_bytes(le(raw)),
            NpyDtype::F64 => f64::from_le_bytes(le(raw)) as f32,
            NpyDtype::U8 => raw[0] as f32,
            NpyDtype::I32 => i32::from_le_bytes(le(raw)) as f32,
            NpyDtype::I64 => i64::from_le_bytes(le(raw)) as f32,
            NpyDtype::U32 => u32::from_le_bytes(le(raw)) as f32,
        })
    }

    fn accepts(_dtype: NpyDtype) -> bool {
        true
    }
}

impl NpyCast for u32 {
    fn cast(dtype: NpyDtype, raw: &[u8]) -> Result<Self, String> {
        match dtype {
            NpyDtype::U8 => Ok(raw[0] as u32),
            NpyDtype::U32 => Ok(u32::from_le_bytes(le(raw))),
            NpyDtype::I32 => {
                let v = i32::from_le_bytes(le(raw));
                u32::try_from(v).map_err(|_| format!("identifier {v} is out of range"))
            }
            NpyDtype::I64 => {
                let v = i64::from_le_bytes(le(raw));
                u32::try_from(v).map_err(|_| format!("identifier {v} is out of range"))
            }
            NpyDtype::F32 | NpyDtype::F64 => Err("float values cannot be identifiers".to_string()),
        }
    }

    fn accepts(dtype: NpyDtype) -> bool {
        dtype.is_integer()
    }
}

/// Open `.npy` array positioned for row reads.
#[derive(Debug)]
pub struct NpyArray {
    path: PathBuf,
    reader: BufReader<File>,
    dtype: NpyDtype,
    rows: usize,
    cols: usize,
    data_offset: u64,
}

impl NpyArray {
    /// Opens `path` and validates header, shape and payload length.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        ensure_available(path)?;

        let file = File::open(path).read_context(path)?;
        let file_len = file.metadata().read_context(path)?.len();
        let mut reader = BufReader::new(file);

        let mut preamble = [0u8; 8];
        reader
            .read_exact(&mut preamble)
            .map_err(|_| parse_error(path, "file too short for an NPY preamble"))?;
        if &preamble[..6] != MAGIC {
            return Err(parse_error(path, "missing NPY magic number"));
        }

        let major = preamble[6];
        let header_len = match major {
            1 => {
                let mut len = [0u8; 2];
                reader.read_exact(&mut len).read_context(path)?;
                u16::from_le_bytes(len) as usize
            }
            2 | 3 => {
                let mut len = [0u8; 4];
                reader.read_exact(&mut len).read_context(path)?;
                u32::from_le_bytes(len) as usize
            }
            other => {
                return Err(parse_error(path, &format!("unsupported NPY version {other}")));
            }
        };

        let mut header_bytes = vec![0u8; header_len];
        reader.read_exact(&mut header_bytes).read_context(path)?;
        let header = String::from_utf8(header_bytes)
            .map_err(|_| parse_error(path, "NPY header is not valid text"))?;
        let data_offset = reader.stream_position().read_context(path)?;

        let descr = dict_value(&header, "descr")
            .and_then(quoted)
            .ok_or_else(|| parse_error(path, "no 'descr' in NPY header"))?;
        let dtype = NpyDtype::from_descr(descr)
            .ok_or_else(|| parse_error(path, &format!("unsupported dtype '{descr}'")))?;

        match dict_value(&header, "fortran_order") {
            Some(v) if v.starts_with("False") => {}
            Some(_) => return Err(parse_error(path, "Fortran-ordered arrays are not supported")),
            None => return Err(parse_error(path, "no 'fortran_order' in NPY header")),
        }

        let shape = dict_value(&header, "shape")
            .and_then(parse_shape)
            .ok_or_else(|| parse_error(path, "unreadable 'shape' in NPY header"))?;
        let &[rows, cols] = shape.as_slice() else {
            return Err(parse_error(
                path,
                &format!("expected a 2-D array, found shape {shape:?}"),
            ));
        };

        // Shape comes from the file, so the size may not even be representable
        let Some(expected) = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(dtype.item_size()))
            .and_then(|bytes| u64::try_from(bytes).ok())
            .and_then(|bytes| bytes.checked_add(data_offset))
        else {
            return Err(PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: format!("NPY shape ({rows}, {cols}) overflows the addressable size"),
                expected: u64::MAX,
                actual: file_len,
            });
        };
        if file_len != expected {
            return Err(PipelineError::CorruptDataset {
                path: path.to_path_buf(),
                reason: format!("NPY shape ({rows}, {cols}) disagrees with payload length"),
                expected,
                actual: file_len,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            dtype,
            rows,
            cols,
            data_offset,
        })
    }

    #[must_use]
    pub fn dtype(&self) -> NpyDtype {
        self.dtype
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads `count` rows starting at `start_row`, cast to `T`.
    pub fn read_rows<T: NpyCast>(
        &mut self,
        start_row: usize,
        count: usize,
    ) -> PipelineResult<Vec<T>> {
        if !T::accepts(self.dtype) {
            return Err(PipelineError::CorruptDataset {
                path: self.path.clone(),
                reason: format!("{:?} array cannot be stored as {}", self.dtype, T::KIND),
                expected: 0,
                actual: 0,
            });
        }
        if start_row.checked_add(count).is_none_or(|end| end > self.rows) {
            return Err(PipelineError::InsufficientData {
                path: self.path.clone(),
                required: start_row.saturating_add(count),
                available: self.rows,
            });
        }

        let item = self.dtype.item_size();
        let row_bytes = self.cols * item;
        let offset = self.data_offset + (start_row * row_bytes) as u64;
        self.reader
            .seek(SeekFrom::Start(offset))
            .read_context(&self.path)?;

        let mut raw = vec![0u8; count * row_bytes];
        self.reader.read_exact(&mut raw).read_context(&self.path)?;

        let mut values = Vec::with_capacity(count * self.cols);
        for (i, chunk) in raw.chunks_exact(item).enumerate() {
            let value =
                T::cast(self.dtype, chunk).map_err(|reason| PipelineError::CorruptDataset {
                    path: self.path.clone(),
                    reason: format!("row {}: {reason}", start_row + i / self.cols),
                    expected: 0,
                    actual: 0,
                })?;
            values.push(value);
        }
        Ok(values)
    }
}

fn parse_error(path: &Path, reason: &str) -> PipelineError {
    PipelineError::ParseError {
        origin: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Text following `'key':` in a Python dict literal.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}

/// Contents of a leading single-quoted string.
fn quoted(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

/// Parses a leading tuple such as `(1000, 128)` or `(5,)`.
fn parse_shape(value: &str) -> Option<Vec<usize>> {
    let rest = value.strip_prefix('(')?;
    let end = rest.find(')')?;
    rest[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// Writes an `.npy` v1.0 file. Used by tests and fixtures.
#[cfg(test)]
pub(crate) fn write_npy(path: &Path, descr: &str, shape: (usize, usize), payload: &[u8]) {
    let mut header = format!(
        "{{'descr': '{descr}', 'fortran_order': False, 'shape': ({}, {}), }}",
        shape.0, shape.1
    );
    // Pad so that magic + version + len + header is a multiple of 64
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut bytes = Vec::new();
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);
    std::fs::write(path, bytes).unwrap();
}
