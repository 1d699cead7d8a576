//! # Emission-Score Tensors
//!
//! The network hands the decoder a 3-D block of per-timestep transition
//! scores, shape `[time, batch, transitions]`, as either 32-bit floats or
//! 8-bit integers with a dequantisation scale. All access goes through
//! `ScoresView`, a strided accessor that folds the dequant scale and the
//! softmax temperature into every fetch, so shape and stride arithmetic is
//! enforced by the type rather than repeated at call sites.

use crate::error::{Result, RoradoError};

/// Raw score storage, immutable once produced.
#[derive(Clone, Debug)]
pub enum ScorePayload {
    F32(Vec<f32>),
    I8 { data: Vec<i8>, scale: f32 },
}

/// A `[time, batch, transitions]` emission-score block for one inference
/// batch.
#[derive(Clone, Debug)]
pub struct ScoreTensor {
    num_timesteps: usize,
    batch_size: usize,
    num_transitions: usize,
    payload: ScorePayload,
}

impl ScoreTensor {
    pub fn from_f32(
        num_timesteps: usize,
        batch_size: usize,
        num_transitions: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        Self::new(
            num_timesteps,
            batch_size,
            num_transitions,
            data.len(),
            ScorePayload::F32(data),
        )
    }

    pub fn from_i8(
        num_timesteps: usize,
        batch_size: usize,
        num_transitions: usize,
        data: Vec<i8>,
        scale: f32,
    ) -> Result<Self> {
        Self::new(
            num_timesteps,
            batch_size,
            num_transitions,
            data.len(),
            ScorePayload::I8 { data, scale },
        )
    }

    fn new(
        num_timesteps: usize,
        batch_size: usize,
        num_transitions: usize,
        len: usize,
        payload: ScorePayload,
    ) -> Result<Self> {
        let expected = num_timesteps * batch_size * num_transitions;
        if len != expected {
            return Err(RoradoError::invalid_data(format!(
                "emission tensor has {} elements, expected {}x{}x{} = {}",
                len, num_timesteps, batch_size, num_transitions, expected
            )));
        }
        Ok(Self {
            num_timesteps,
            batch_size,
            num_transitions,
            payload,
        })
    }

    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_transitions(&self) -> usize {
        self.num_transitions
    }

    /// Strided view of one batch element. `temperature` divides every score
    /// on fetch; the i8 dequant scale is folded into the same multiplier.
    pub fn view(&self, batch_idx: usize, temperature: f32) -> ScoresView<'_> {
        assert!(batch_idx < self.batch_size);
        let dequant = match &self.payload {
            ScorePayload::F32(_) => 1.0,
            ScorePayload::I8 { scale, .. } => *scale,
        };
        ScoresView {
            payload: &self.payload,
            num_timesteps: self.num_timesteps,
            num_transitions: self.num_transitions,
            row_stride: self.batch_size * self.num_transitions,
            row_offset: batch_idx * self.num_transitions,
            scale: dequant / temperature,
        }
    }
}

/// Read-only strided accessor over one batch element of a `ScoreTensor`.
///
/// Safe to share across decoder threads: chunk ranges assigned to threads
/// are disjoint and the underlying payload is never mutated.
#[derive(Clone, Copy)]
pub struct ScoresView<'a> {
    payload: &'a ScorePayload,
    num_timesteps: usize,
    num_transitions: usize,
    row_stride: usize,
    row_offset: usize,
    scale: f32,
}

impl<'a> ScoresView<'a> {
    #[inline]
    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    #[inline]
    pub fn num_transitions(&self) -> usize {
        self.num_transitions
    }

    /// Fetch the score of transition `trans` at timestep `ts`, dequantised
    /// and temperature-scaled.
    #[inline]
    pub fn fetch(&self, ts: usize, trans: usize) -> f32 {
        debug_assert!(ts < self.num_timesteps && trans < self.num_transitions);
        let idx = ts * self.row_stride + self.row_offset + trans;
        match self.payload {
            ScorePayload::F32(data) => data[idx] * self.scale,
            ScorePayload::I8 { data, .. } => data[idx] as f32 * self.scale,
        }
    }
}

/// Row-stochastic posterior probabilities over states, one row per
/// timestep boundary (`num_timesteps + 1` rows; row 0 is the initial
/// boundary condition). Recomputed per chunk, owned by the decode
/// workspace.
#[derive(Debug, Default)]
pub struct PosteriorTable {
    num_rows: usize,
    num_states: usize,
    data: Vec<f32>,
}

impl PosteriorTable {
    pub fn resize(&mut self, num_rows: usize, num_states: usize) {
        self.num_rows = num_rows;
        self.num_states = num_states;
        self.data.clear();
        self.data.resize(num_rows * num_states, 0.0);
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.num_states;
        &self.data[start..start + self.num_states]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let start = row * self.num_states;
        &mut self.data[start..start + self.num_states]
    }
}
