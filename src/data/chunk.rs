//! # Signal Chunking
//!
//! Splits one read's normalised signal into overlapping fixed-length windows
//! for fixed-shape neural-network batching, and materialises the per-chunk
//! feature buffer.
//!
//! Every chunk has exactly `chunk_size` samples. The tail chunk is clamped
//! backwards so it never reads past the end of the signal, which makes it
//! overlap its predecessor by more than the configured overlap when the read
//! length is not an exact multiple of the step. Reads shorter than one chunk
//! are repeat-padded: the network was never trained on a zero-padded
//! discontinuity, so the short signal is tiled whole and topped up with its
//! own prefix.

/// One fixed-length window of a read's signal.
///
/// Chunks within a read are ordered by `idx_in_read` and are contiguous in
/// ordinal with no gaps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Start index into the read's sample buffer
    pub input_offset: usize,
    /// Ordinal position within the read (0-based)
    pub idx_in_read: usize,
    /// Length of the chunk in signal samples
    pub raw_chunk_size: usize,
}

/// Decoded payload for one chunk.
#[derive(Clone, Debug, Default)]
pub struct DecodedChunk {
    pub sequence: String,
    pub qstring: String,
    /// One flag per network output timestep; 1 means a new base starts here.
    pub moves: Vec<u8>,
}

/// Split a read of `signal_len` samples into overlapping chunks.
///
/// The first chunk always starts at offset 0. Each subsequent offset is
/// `min(previous + step, signal_len - chunk_size)` with
/// `step = chunk_size - overlap`; generation stops once a chunk reaches the
/// end of the signal. A read shorter than `chunk_size` yields a single chunk
/// at offset 0 whose feature buffer is repeat-padded to full length.
///
/// `overlap < chunk_size` is enforced upstream by config validation.
pub fn chunk_read(signal_len: usize, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(overlap < chunk_size);

    if signal_len <= chunk_size {
        return vec![Chunk {
            input_offset: 0,
            idx_in_read: 0,
            raw_chunk_size: chunk_size.min(signal_len.max(1)),
        }];
    }

    let step = chunk_size - overlap;
    let last_offset = signal_len - chunk_size;

    let mut chunks = Vec::with_capacity(signal_len / step + 1);
    let mut offset = 0usize;
    loop {
        chunks.push(Chunk {
            input_offset: offset,
            idx_in_read: chunks.len(),
            raw_chunk_size: chunk_size,
        });
        if offset + chunk_size >= signal_len {
            break;
        }
        offset = (offset + step).min(last_offset);
    }
    chunks
}

impl Chunk {
    /// Materialise the feature buffer for this chunk from the read's
    /// normalised signal. The result always has exactly `chunk_size`
    /// samples: short reads are tiled whole-number-of-times and the
    /// remainder is filled with the signal's prefix.
    pub fn features(&self, signal: &[f32], chunk_size: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(chunk_size);
        if signal.len() >= self.input_offset + chunk_size {
            out.extend_from_slice(&signal[self.input_offset..self.input_offset + chunk_size]);
            return out;
        }

        // Short read: repeat-pad from offset 0
        let tiles = chunk_size / signal.len();
        for _ in 0..tiles {
            out.extend_from_slice(signal);
        }
        out.extend_from_slice(&signal[..chunk_size - out.len()]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coverage_no_gaps() {
        let chunks = chunk_read(100_000, 8000, 150);
        assert_eq!(chunks[0].input_offset, 0);
        for pair in chunks.windows(2) {
            // next chunk starts before the current one ends
            assert!(pair[1].input_offset < pair[0].input_offset + pair[0].raw_chunk_size);
            assert_eq!(pair[1].idx_in_read, pair[0].idx_in_read + 1);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.input_offset + last.raw_chunk_size, 100_000);
    }

    #[test]
    fn test_tail_chunk_clamps_backwards() {
        // length 20000, chunk 8000, overlap 150: tail clamps to 12000
        let chunks = chunk_read(20_000, 8000, 150);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.input_offset).collect();
        assert_eq!(offsets, vec![0, 7850, 12_000]);
    }

    #[test]
    fn test_short_read_single_chunk() {
        let chunks = chunk_read(3000, 8000, 150);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].input_offset, 0);
    }

    #[test]
    fn test_short_read_repeat_padding() {
        // length 3000, chunk 8000: two whole tiles plus a 2000-sample prefix
        let signal: Vec<f32> = (0..3000).map(|i| i as f32).collect();
        let chunks = chunk_read(signal.len(), 8000, 150);
        let features = chunks[0].features(&signal, 8000);
        assert_eq!(features.len(), 8000);
        assert_eq!(&features[..3000], &signal[..]);
        assert_eq!(&features[3000..6000], &signal[..]);
        assert_eq!(&features[6000..], &signal[..2000]);
    }

    #[test]
    fn test_exact_multiple_has_no_clamped_tail() {
        // step = 4000, length = 12000: offsets 0, 4000 (end 12000 exactly)
        let chunks = chunk_read(12_000, 8000, 4000);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.input_offset).collect();
        assert_eq!(offsets, vec![0, 4000]);
    }

    #[test]
    fn test_full_length_features_are_a_window() {
        let signal: Vec<f32> = (0..20_000).map(|i| (i % 97) as f32).collect();
        let chunks = chunk_read(signal.len(), 8000, 150);
        for chunk in &chunks {
            let features = chunk.features(&signal, 8000);
            assert_eq!(
                features,
                signal[chunk.input_offset..chunk.input_offset + 8000]
            );
        }
    }
}
