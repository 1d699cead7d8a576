//! # Emission-Score Sources
//!
//! The decoder consumes per-chunk emission-score tensors produced by a
//! neural network. Inference itself is an external collaborator: the
//! `EmissionSource` trait is the seam, and the shipped implementation reads
//! tensors dumped by an external inference run from a binary container.
//!
//! Container format:
//! - [Magic 8 bytes] "ROREMS01"
//! - [Metadata Length u64 LE]
//! - [Metadata JSON] (version, state_len, dtype, scale, chunk geometry,
//!   record count)
//! - Per record: [read_idx u32][chunk_idx u32][num_timesteps u32]
//!   [num_transitions u32][payload f32/i8 ...]
//!
//! Records are memory-mapped and indexed on open, so decode workers can
//! fetch chunks in any order without seeking through the stream.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::data::chunk::Chunk;
use crate::error::{Result, RoradoError};
use crate::model::crf::CrfParams;
use crate::model::tensor::ScoreTensor;

const MAGIC: &[u8; 8] = b"ROREMS01";
const VERSION: u32 = 1;

/// Payload element type of an emission container.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmissionDtype {
    F32,
    I8,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmissionsMetadata {
    pub version: u32,
    pub state_len: usize,
    pub dtype: EmissionDtype,
    /// Dequantisation scale for i8 payloads (1.0 for f32)
    pub scale: f32,
    pub chunk_size: usize,
    pub overlap: usize,
    pub num_records: u64,
}

/// Seam to the out-of-scope neural network: anything that can produce the
/// emission tensor for one chunk.
pub trait EmissionSource: Send + Sync {
    /// Lattice dimensions of the model that produced (or will produce) the
    /// emissions.
    fn crf_params(&self) -> CrfParams;

    /// Chunk geometry the emissions were computed under. The pipeline
    /// validates its own configuration against this.
    fn chunk_geometry(&self) -> (usize, usize);

    /// Emission tensor for one chunk of one read. `features` is the
    /// repeat-padded feature window an in-process model would consume; a
    /// file-backed source ignores it.
    fn chunk_emissions(
        &self,
        read_idx: usize,
        chunk: &Chunk,
        features: &[f32],
    ) -> Result<ScoreTensor>;
}

#[derive(Clone, Copy, Debug)]
struct RecordIndex {
    payload_offset: usize,
    num_timesteps: usize,
    num_transitions: usize,
}

/// Emission tensors from a container file written by an external inference
/// step.
pub struct FileEmissionSource {
    mmap: Mmap,
    metadata: EmissionsMetadata,
    crf: CrfParams,
    index: HashMap<(u32, u32), RecordIndex>,
}

impl FileEmissionSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| RoradoError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        // Read-only map; the file is never mutated while we hold it.
        let mmap = unsafe { Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;

        if bytes.len() < 16 || &bytes[..8] != MAGIC {
            return Err(RoradoError::parse(path, "bad magic, not an emission container"));
        }
        let meta_len = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes")) as usize;
        let meta_end = 16 + meta_len;
        if bytes.len() < meta_end {
            return Err(RoradoError::parse(path, "truncated metadata"));
        }
        let metadata: EmissionsMetadata = serde_json::from_slice(&bytes[16..meta_end])?;
        if metadata.version != VERSION {
            return Err(RoradoError::parse(
                path,
                format!("unsupported container version {}", metadata.version),
            ));
        }
        if metadata.state_len == 0 || metadata.state_len > 12 {
            return Err(RoradoError::invalid_data(format!(
                "implausible k-mer context length {}",
                metadata.state_len
            )));
        }
        let crf = CrfParams::from_state_len(metadata.state_len);
        let elem_size = match metadata.dtype {
            EmissionDtype::F32 => 4,
            EmissionDtype::I8 => 1,
        };

        // Walk the records once, building the (read, chunk) -> offset index.
        let mut index = HashMap::with_capacity(metadata.num_records as usize);
        let mut pos = meta_end;
        for _ in 0..metadata.num_records {
            if bytes.len() < pos + 16 {
                return Err(RoradoError::parse(path, "truncated record header"));
            }
            let read_u32 = |at: usize| {
                u32::from_le_bytes(bytes[at..at + 4].try_into().expect("4 bytes"))
            };
            let read_idx = read_u32(pos);
            let chunk_idx = read_u32(pos + 4);
            let num_timesteps = read_u32(pos + 8) as usize;
            let num_transitions = read_u32(pos + 12) as usize;
            if num_transitions != crf.num_transitions {
                return Err(RoradoError::invalid_data(format!(
                    "record for read {read_idx} chunk {chunk_idx} has {} transitions, model has {}",
                    num_transitions, crf.num_transitions
                )));
            }
            let payload_offset = pos + 16;
            let payload_len = num_timesteps * num_transitions * elem_size;
            if bytes.len() < payload_offset + payload_len {
                return Err(RoradoError::parse(path, "truncated record payload"));
            }
            index.insert(
                (read_idx, chunk_idx),
                RecordIndex {
                    payload_offset,
                    num_timesteps,
                    num_transitions,
                },
            );
            pos = payload_offset + payload_len;
        }

        Ok(Self {
            mmap,
            metadata,
            crf,
            index,
        })
    }

    pub fn metadata(&self) -> &EmissionsMetadata {
        &self.metadata
    }
}

impl EmissionSource for FileEmissionSource {
    fn crf_params(&self) -> CrfParams {
        self.crf
    }

    fn chunk_geometry(&self) -> (usize, usize) {
        (self.metadata.chunk_size, self.metadata.overlap)
    }

    fn chunk_emissions(
        &self,
        read_idx: usize,
        chunk: &Chunk,
        _features: &[f32],
    ) -> Result<ScoreTensor> {
        let record = self
            .index
            .get(&(read_idx as u32, chunk.idx_in_read as u32))
            .ok_or_else(|| {
                RoradoError::invalid_data(format!(
                    "no emission record for read {} chunk {}",
                    read_idx, chunk.idx_in_read
                ))
            })?;

        let bytes: &[u8] = &self.mmap;
        match self.metadata.dtype {
            EmissionDtype::F32 => {
                let len = record.num_timesteps * record.num_transitions * 4;
                let payload = &bytes[record.payload_offset..record.payload_offset + len];
                let data: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
                ScoreTensor::from_f32(record.num_timesteps, 1, record.num_transitions, data)
            }
            EmissionDtype::I8 => {
                let len = record.num_timesteps * record.num_transitions;
                let payload = &bytes[record.payload_offset..record.payload_offset + len];
                let data: Vec<i8> = bytemuck::pod_collect_to_vec(payload);
                ScoreTensor::from_i8(
                    record.num_timesteps,
                    1,
                    record.num_transitions,
                    data,
                    self.metadata.scale,
                )
            }
        }
    }
}

/// Writer used by the external inference step (and the test suite) to
/// produce emission containers.
pub struct EmissionsWriter {
    buffer: Vec<u8>,
    metadata: EmissionsMetadata,
    records_written: u64,
}

impl EmissionsWriter {
    pub fn new(metadata: EmissionsMetadata) -> Self {
        Self {
            buffer: Vec::new(),
            metadata,
            records_written: 0,
        }
    }

    pub fn write_f32_record(
        &mut self,
        read_idx: u32,
        chunk_idx: u32,
        num_timesteps: usize,
        num_transitions: usize,
        payload: &[f32],
    ) {
        debug_assert_eq!(payload.len(), num_timesteps * num_transitions);
        self.write_header(read_idx, chunk_idx, num_timesteps, num_transitions);
        self.buffer.extend_from_slice(bytemuck::cast_slice(payload));
        self.records_written += 1;
    }

    pub fn write_i8_record(
        &mut self,
        read_idx: u32,
        chunk_idx: u32,
        num_timesteps: usize,
        num_transitions: usize,
        payload: &[i8],
    ) {
        debug_assert_eq!(payload.len(), num_timesteps * num_transitions);
        self.write_header(read_idx, chunk_idx, num_timesteps, num_transitions);
        self.buffer.extend_from_slice(bytemuck::cast_slice(payload));
        self.records_written += 1;
    }

    fn write_header(
        &mut self,
        read_idx: u32,
        chunk_idx: u32,
        num_timesteps: usize,
        num_transitions: usize,
    ) {
        self.buffer.extend_from_slice(&read_idx.to_le_bytes());
        self.buffer.extend_from_slice(&chunk_idx.to_le_bytes());
        self.buffer
            .extend_from_slice(&(num_timesteps as u32).to_le_bytes());
        self.buffer
            .extend_from_slice(&(num_transitions as u32).to_le_bytes());
    }

    pub fn finish(mut self, path: &Path) -> Result<()> {
        self.metadata.num_records = self.records_written;
        let meta = serde_json::to_vec(&self.metadata)?;
        let mut out = Vec::with_capacity(16 + meta.len() + self.buffer.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(meta.len() as u64).to_le_bytes());
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.buffer);
        std::fs::write(path, out)?;
        Ok(())
    }
}
