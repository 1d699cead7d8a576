//! # Workspace Pattern for Decode Buffers
//!
//! Pre-allocated buffers for the scan and beam-search kernels. Instead of
//! storing mutable scratch inside the model structs (which fights the
//! borrow checker), each decoder thread owns one `DecodeWorkspace` and
//! passes pieces of it into the computation functions; buffers grow to the
//! largest chunk seen and are reused for every subsequent chunk.

use crate::model::beam::BeamScratch;
use crate::model::scan::ScanBuffer;
use crate::model::tensor::PosteriorTable;

/// Per-thread scratch for decoding one chunk at a time.
pub struct DecodeWorkspace {
    /// Backward log-partition table, `(T+1) * num_states`
    pub bwd: ScanBuffer,
    /// Rolling forward rows
    pub fwd_prev: ScanBuffer,
    pub fwd_curr: ScanBuffer,
    /// Softmax-normalised posterior table
    pub posts: PosteriorTable,
    /// Beam-search buffers
    pub beam: BeamScratch,
}

impl DecodeWorkspace {
    pub fn new() -> Self {
        Self {
            bwd: ScanBuffer::new(32),
            fwd_prev: ScanBuffer::new(32),
            fwd_curr: ScanBuffer::new(32),
            posts: PosteriorTable::default(),
            beam: BeamScratch::default(),
        }
    }
}

impl Default for DecodeWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::crf::CrfParams;
    use crate::model::scan::{backward_scan, forward_posteriors};
    use crate::model::tensor::ScoreTensor;

    #[test]
    fn test_workspace_reuse_across_chunk_sizes() {
        let crf = CrfParams::from_state_len(2);
        let mut ws = DecodeWorkspace::new();

        for num_timesteps in [4, 9, 3] {
            let tensor = ScoreTensor::from_f32(
                num_timesteps,
                1,
                crf.num_transitions,
                vec![0.5; num_timesteps * crf.num_transitions],
            )
            .unwrap();
            let view = tensor.view(0, 1.0);
            backward_scan(&view, &crf, 2.0, &mut ws.bwd);
            forward_posteriors(
                &view,
                &crf,
                2.0,
                &ws.bwd,
                &mut ws.fwd_prev,
                &mut ws.fwd_curr,
                &mut ws.posts,
            );
            assert_eq!(ws.bwd.len(), (num_timesteps + 1) * crf.num_states);
            assert_eq!(ws.posts.num_rows(), num_timesteps + 1);
        }
    }
}
