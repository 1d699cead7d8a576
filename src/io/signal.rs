//! # Raw Signal Container I/O
//!
//! A minimal binary container for raw reads and their device calibration.
//!
//! Format:
//! - [Magic 8 bytes] "RORSIG01"
//! - [Metadata Length u64 LE]
//! - [Metadata JSON] (version, read count)
//! - Per read: [id len u16 LE][id utf8][digitisation f32][offset f32]
//!   [range f32][sample count u32][samples i16 ...]
//!
//! Scalars are little-endian; bulk sample payloads are decoded with
//! `bytemuck`. Paths ending in `.gz` are transparently (de)compressed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::data::read::SignalRead;
use crate::error::{Result, RoradoError};

const MAGIC: &[u8; 8] = b"RORSIG01";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Metadata {
    version: u32,
    num_reads: u64,
}

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

fn read_exact_vec(reader: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Streaming reader over a signal container.
pub struct SignalReader {
    reader: Box<dyn Read + Send>,
    num_reads: u64,
    reads_returned: u64,
}

impl SignalReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| RoradoError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let mut reader: Box<dyn Read + Send> = if is_gz(path) {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(RoradoError::parse(path, "bad magic, not a signal container"));
        }
        let meta_len = read_u64(&mut reader)? as usize;
        let meta_bytes = read_exact_vec(&mut reader, meta_len)?;
        let metadata: Metadata = serde_json::from_slice(&meta_bytes)?;
        if metadata.version != VERSION {
            return Err(RoradoError::parse(
                path,
                format!("unsupported container version {}", metadata.version),
            ));
        }

        Ok(Self {
            reader,
            num_reads: metadata.num_reads,
            reads_returned: 0,
        })
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    /// Read the next record; `None` once the declared count is exhausted.
    pub fn next_read(&mut self) -> Result<Option<SignalRead>> {
        if self.reads_returned >= self.num_reads {
            return Ok(None);
        }
        let id_len = read_u16(&mut self.reader)? as usize;
        let id_bytes = read_exact_vec(&mut self.reader, id_len)?;
        let id = String::from_utf8(id_bytes)
            .map_err(|e| RoradoError::invalid_data(format!("read id is not utf8: {e}")))?;
        let digitisation = read_f32(&mut self.reader)?;
        let offset = read_f32(&mut self.reader)?;
        let range = read_f32(&mut self.reader)?;
        let n_samples = read_u32(&mut self.reader)? as usize;
        let raw = read_exact_vec(&mut self.reader, n_samples * 2)?;
        let samples: Vec<i16> = bytemuck::pod_collect_to_vec(&raw);

        self.reads_returned += 1;
        Ok(Some(SignalRead {
            id,
            samples,
            digitisation,
            offset,
            range,
        }))
    }

    /// Read up to `max` records.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<SignalRead>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next_read()? {
                Some(read) => batch.push(read),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Writer for signal containers. The read count is declared up front, so
/// the caller states it at creation time.
pub struct SignalWriter {
    writer: Box<dyn Write + Send>,
    remaining: u64,
}

impl SignalWriter {
    pub fn create(path: &Path, num_reads: u64) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer: Box<dyn Write + Send> = if is_gz(path) {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };

        writer.write_all(MAGIC)?;
        let meta = serde_json::to_vec(&Metadata {
            version: VERSION,
            num_reads,
        })?;
        writer.write_all(&(meta.len() as u64).to_le_bytes())?;
        writer.write_all(&meta)?;

        Ok(Self {
            writer,
            remaining: num_reads,
        })
    }

    pub fn write_read(&mut self, read: &SignalRead) -> Result<()> {
        if self.remaining == 0 {
            return Err(RoradoError::invalid_data(
                "more reads written than declared in the container header",
            ));
        }
        self.remaining -= 1;

        self.writer
            .write_all(&(read.id.len() as u16).to_le_bytes())?;
        self.writer.write_all(read.id.as_bytes())?;
        self.writer.write_all(&read.digitisation.to_le_bytes())?;
        self.writer.write_all(&read.offset.to_le_bytes())?;
        self.writer.write_all(&read.range.to_le_bytes())?;
        self.writer
            .write_all(&(read.samples.len() as u32).to_le_bytes())?;
        self.writer
            .write_all(bytemuck::cast_slice(&read.samples))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if self.remaining != 0 {
            return Err(RoradoError::invalid_data(format!(
                "{} declared reads were never written",
                self.remaining
            )));
        }
        self.writer.flush()?;
        Ok(())
    }
}
