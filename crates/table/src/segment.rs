//! Segment files: the data half of a commit.
//!
//! A segment is a zstd stream of length-prefixed msgpack records
//! (`u32` little-endian length, then the encoded [`Record`]). One segment is
//! written per committed batch and never modified afterwards.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bronze_core::Record;
use memmap2::Mmap;
use tracing::debug;

use crate::error::TableError;

/// Size information for a finished segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentMeta {
    pub row_count: u64,
    pub size_bytes: u64,
    pub raw_bytes: u64,
}

pub struct SegmentWriter {
    path: PathBuf,
    encoder: zstd::Encoder<'static, BufWriter<fs::File>>,
    raw_bytes: u64,
    row_count: u64,
}

impl SegmentWriter {
    /// Create (or truncate) the segment file at `path`.
    pub fn create(path: &Path) -> Result<Self, TableError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), 3)?;

        Ok(Self {
            path: path.to_path_buf(),
            encoder,
            raw_bytes: 0,
            row_count: 0,
        })
    }

    /// Append a record to the compressed stream, returning its raw offset.
    pub fn append(&mut self, record: &Record) -> Result<u64, TableError> {
        let offset = self.raw_bytes;
        let encoded = rmp_serde::to_vec(record).map_err(TableError::serialize)?;

        let len = encoded.len() as u32;
        self.encoder.write_all(&len.to_le_bytes())?;
        self.encoder.write_all(&encoded)?;

        self.raw_bytes += 4 + encoded.len() as u64;
        self.row_count += 1;
        Ok(offset)
    }

    /// Finish the zstd stream and fsync the file.
    pub fn finalize(self) -> Result<SegmentMeta, TableError> {
        let buf_writer = self.encoder.finish()?;
        let file = buf_writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        let size_bytes = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        debug!(
            path = %self.path.display(),
            rows = self.row_count,
            size_bytes,
            raw_bytes = self.raw_bytes,
            "Segment finalized"
        );
        Ok(SegmentMeta {
            row_count: self.row_count,
            size_bytes,
            raw_bytes: self.raw_bytes,
        })
    }
}

/// Decompressed, read-only view of one segment.
pub struct SegmentReader {
    path: PathBuf,
    data: Vec<u8>,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self, TableError> {
        let file = fs::File::open(path)?;
        // SAFETY: segments are immutable once their commit entry exists.
        let mmap = unsafe { Mmap::map(&file)? };
        let data = zstd::decode_all(mmap.as_ref()).map_err(|e| TableError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Iterate all records in write order.
    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter {
            path: &self.path,
            data: &self.data,
            pos: 0,
        }
    }

    /// Decompressed size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub struct SegmentIter<'a> {
    path: &'a Path,
    data: &'a [u8],
    pos: usize,
}

impl SegmentIter<'_> {
    fn corrupt(&mut self, message: &str) -> TableError {
        self.pos = self.data.len();
        TableError::Corrupt {
            path: self.path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

impl Iterator for SegmentIter<'_> {
    type Item = Result<Record, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        if self.pos + 4 > self.data.len() {
            return Some(Err(self.corrupt("truncated length prefix")));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let start = self.pos + 4;
        if start + len > self.data.len() {
            return Some(Err(self.corrupt("truncated record")));
        }

        let result = rmp_serde::from_slice(&self.data[start..start + len])
            .map_err(TableError::serialize);
        self.pos = start + len;
        Some(result)
    }
}
