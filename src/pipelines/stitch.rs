//! # Chunk Stitching
//!
//! Reassembles the decoded outputs of one read's overlapping chunks into a
//! single contiguous sequence/qstring pair. Each adjacent pair splits its
//! overlap at the midpoint (in network-output timesteps): bases the current
//! chunk emitted in its trailing half are trimmed, bases the next chunk
//! emitted in its leading half are skipped, so every base is attributed to
//! exactly one chunk even though the underlying signal windows overlapped.
//! The read-external edges of the first and last chunk are never trimmed.

use crate::data::chunk::{Chunk, DecodedChunk};
use crate::error::{Result, RoradoError};

/// Number of raw signal samples each network-output timestep represents,
/// rounded half away from zero.
fn down_sampling(chunk: &Chunk, decoded: &DecodedChunk) -> usize {
    let ratio = chunk.raw_chunk_size as f64 / decoded.moves.len() as f64;
    (ratio.round() as usize).max(1)
}

#[inline]
fn count_moves(moves: &[u8]) -> usize {
    moves.iter().map(|&m| m as usize).sum()
}

/// Stitch an ordered list of decoded chunks into the read-level sequence
/// and quality string.
pub fn stitch_chunks(chunks: &[Chunk], decoded: &[DecodedChunk]) -> Result<(String, String)> {
    if chunks.len() != decoded.len() {
        return Err(RoradoError::invalid_data(format!(
            "{} chunks but {} decoded outputs",
            chunks.len(),
            decoded.len()
        )));
    }
    if chunks.is_empty() {
        return Ok((String::new(), String::new()));
    }
    if chunks.len() == 1 {
        // no neighbour, no trimming
        return Ok((decoded[0].sequence.clone(), decoded[0].qstring.clone()));
    }

    let ds = down_sampling(&chunks[0], &decoded[0]);

    let mut sequence = String::new();
    let mut qstring = String::new();
    let mut start_pos = 0usize;

    for i in 0..chunks.len() - 1 {
        let cur = &chunks[i];
        let next = &chunks[i + 1];
        let cur_dec = &decoded[i];
        let next_dec = &decoded[i + 1];

        let overlap_samples =
            (cur.input_offset + cur.raw_chunk_size).saturating_sub(next.input_offset);
        let overlap_ts = (overlap_samples / ds).min(cur_dec.moves.len());
        let trailing_half = overlap_ts / 2;
        let leading_half = (overlap_ts - trailing_half).min(next_dec.moves.len());

        let total_bases = count_moves(&cur_dec.moves);
        let trimmed =
            count_moves(&cur_dec.moves[cur_dec.moves.len() - trailing_half..]);
        let end_pos = (total_bases - trimmed).max(start_pos);

        sequence.push_str(&cur_dec.sequence[start_pos..end_pos]);
        qstring.push_str(&cur_dec.qstring[start_pos..end_pos]);

        start_pos = count_moves(&next_dec.moves[..leading_half]);
    }

    let last = decoded.last().expect("nonempty chunk list");
    sequence.push_str(&last.sequence[start_pos..]);
    qstring.push_str(&last.qstring[start_pos..]);

    Ok((sequence, qstring))
}
