//! # Configuration Logic
//!
//! CLI argument parsing and validation via `clap`.
//!
//! All decoder invariants that can be checked before touching data are
//! checked here: they indicate a programming or model-compatibility bug,
//! not a transient condition, so validation failures are fatal.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Result, RoradoError};
use crate::model::beam::MAX_BEAM_WIDTH;

/// rorado: CRF beam-search decoding for nanopore basecalling
#[derive(Parser, Debug, Clone)]
#[command(name = "rorado", version, about)]
pub struct Config {
    /// Raw signal container (.rsig, optionally .gz)
    #[arg(long = "signal")]
    pub signal: PathBuf,

    /// Emission-score container produced by an external inference run
    /// (.rems, one tensor per chunk)
    #[arg(long = "emissions")]
    pub emissions: PathBuf,

    /// Output FASTQ path (.fastq, optionally .gz)
    #[arg(long = "out")]
    pub out: PathBuf,

    /// Chunk size in signal samples
    #[arg(long, default_value_t = 8000)]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks in signal samples
    #[arg(long, default_value_t = 150)]
    pub overlap: usize,

    /// Maximum number of beam hypotheses retained per timestep
    #[arg(long, default_value_t = 32)]
    pub beam_width: usize,

    /// Beam score cutoff ratio; candidates below max_score - ln(beam_cut)
    /// are pruned
    #[arg(long, default_value_t = 100.0)]
    pub beam_cut: f32,

    /// Fixed additive score for stay transitions, independent of network
    /// output
    #[arg(long, default_value_t = 2.0)]
    pub fixed_stay_score: f32,

    /// Quality calibration shift (model-specific)
    #[arg(long, default_value_t = 0.0)]
    pub q_shift: f32,

    /// Quality calibration scale (model-specific)
    #[arg(long, default_value_t = 1.0)]
    pub q_scale: f32,

    /// Softmax temperature applied to emission scores
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Number of reads decoded per batch
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Worker threads (0 = all available cores)
    #[arg(long, default_value_t = 0)]
    pub nthreads: usize,

    /// Disable work stealing between decode workers
    #[arg(long, default_value_t = false)]
    pub no_steal: bool,

    /// Stop after decoding this many reads (debugging aid)
    #[arg(long)]
    pub max_reads: Option<usize>,
}

impl Config {
    /// Parse CLI arguments and validate decoder invariants.
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration without consuming it.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RoradoError::config("chunk_size must be nonzero"));
        }
        if self.overlap >= self.chunk_size {
            return Err(RoradoError::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.beam_width == 0 || self.beam_width > MAX_BEAM_WIDTH {
            return Err(RoradoError::config(format!(
                "beam_width must be in 1..={}, got {}",
                MAX_BEAM_WIDTH, self.beam_width
            )));
        }
        if !(self.beam_cut > 1.0) {
            return Err(RoradoError::config(format!(
                "beam_cut must be greater than 1.0, got {}",
                self.beam_cut
            )));
        }
        if !(self.temperature > 0.0) {
            return Err(RoradoError::config(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if self.batch_size == 0 {
            return Err(RoradoError::config("batch_size must be nonzero"));
        }
        if !self.signal.exists() {
            return Err(RoradoError::FileNotFound {
                path: self.signal.clone(),
            });
        }
        if !self.emissions.exists() {
            return Err(RoradoError::FileNotFound {
                path: self.emissions.clone(),
            });
        }
        Ok(())
    }

    /// Effective worker thread count.
    pub fn nthreads(&self) -> usize {
        if self.nthreads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.nthreads
        }
    }

    /// Decoder parameter bundle handed to the model layer.
    pub fn decoder_params(&self) -> DecoderParams {
        DecoderParams {
            beam_width: self.beam_width,
            beam_cut: self.beam_cut,
            fixed_stay_score: self.fixed_stay_score,
            q_shift: self.q_shift,
            q_scale: self.q_scale,
            temperature: self.temperature,
        }
    }

    /// Build a config for tests without touching the filesystem checks.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            signal: PathBuf::from("/dev/null"),
            emissions: PathBuf::from("/dev/null"),
            out: PathBuf::from("/dev/null"),
            chunk_size: 8000,
            overlap: 150,
            beam_width: 32,
            beam_cut: 100.0,
            fixed_stay_score: 2.0,
            q_shift: 0.0,
            q_scale: 1.0,
            temperature: 1.0,
            batch_size: 128,
            nthreads: 1,
            no_steal: false,
            max_reads: None,
        }
    }
}

/// Decoder hyperparameters, decoupled from the CLI surface so library
/// callers can construct them directly.
#[derive(Debug, Clone, Copy)]
pub struct DecoderParams {
    pub beam_width: usize,
    pub beam_cut: f32,
    pub fixed_stay_score: f32,
    pub q_shift: f32,
    pub q_scale: f32,
    pub temperature: f32,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            beam_width: 32,
            beam_cut: 100.0,
            fixed_stay_score: 2.0,
            q_shift: 0.0,
            q_scale: 1.0,
            temperature: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_overlap_ge_chunk_size() {
        let mut config = Config::for_tests();
        config.overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_beam_width_bounds() {
        let mut config = Config::for_tests();
        config.beam_width = 256;
        // 256 is the cap itself and must be accepted
        assert!(config.validate().is_ok());
        config.beam_width = 257;
        assert!(config.validate().is_err());
        config.beam_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::for_tests();
        config.temperature = 0.0;
        assert!(config.validate().is_err());
    }
}
