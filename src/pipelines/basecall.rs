//! # Basecall Pipeline
//!
//! Orchestrates the decode workflow over batches of reads:
//! 1. Load a batch of raw reads from the signal container
//! 2. Normalise and chunk each read (rayon map)
//! 3. Fetch per-chunk emission tensors from the `EmissionSource`
//! 4. Decode chunks: scan → beam search → quality calibration
//! 5. Stitch per-chunk outputs into read-level sequence/qstring
//! 6. Append to the FASTQ output in input order
//!
//! Phases are strictly sequential per batch; within a phase the work is
//! embarrassingly parallel. Reads are distributed over the work-stealing
//! harness (read lengths skew per-item cost); each read's chunks run on a
//! small fixed inner pool, independent of the outer harness.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, OnceLock};

use rayon::prelude::*;
use tracing::{debug, info, info_span};

use crate::config::{Config, DecoderParams};
use crate::data::chunk::{chunk_read, DecodedChunk};
use crate::data::read::{DecodedRead, SignalRead};
use crate::error::{Result, RoradoError};
use crate::io::emissions::{EmissionSource, FileEmissionSource};
use crate::io::fastq::FastqWriter;
use crate::io::signal::SignalReader;
use crate::model::beam::{beam_search, path_base_probs};
use crate::model::crf::CrfParams;
use crate::model::qscore::sequence_and_qstring;
use crate::model::scan::{backward_scan, forward_posteriors};
use crate::model::tensor::ScoresView;
use crate::pipelines::stitch::stitch_chunks;
use crate::utils::telemetry::{Stage, Telemetry};
use crate::utils::threading::{parallel_for, ParallelOptions};
use crate::utils::workspace::DecodeWorkspace;

/// Upper bound of the inner per-read chunk pool.
const DECODER_POOL_THREADS: usize = 4;

thread_local! {
    static THREAD_WORKSPACE: RefCell<DecodeWorkspace> =
        RefCell::new(DecodeWorkspace::new());
}

/// Decode one chunk's emission block into sequence, qstring and move table.
///
/// The view must already carry the softmax temperature (see
/// [`crate::model::tensor::ScoreTensor::view`]).
pub fn decode_chunk(
    view: &ScoresView<'_>,
    crf: &CrfParams,
    params: &DecoderParams,
    ws: &mut DecodeWorkspace,
) -> Result<DecodedChunk> {
    backward_scan(view, crf, params.fixed_stay_score, &mut ws.bwd);
    forward_posteriors(
        view,
        crf,
        params.fixed_stay_score,
        &ws.bwd,
        &mut ws.fwd_prev,
        &mut ws.fwd_curr,
        &mut ws.posts,
    );
    let path = beam_search(
        view,
        crf,
        &ws.bwd,
        params.beam_width,
        params.beam_cut,
        params.fixed_stay_score,
        &mut ws.beam,
    )?;
    let base_probs = path_base_probs(&path, &ws.posts, crf);
    let (sequence, qstring) =
        sequence_and_qstring(&path, &base_probs, crf, params.q_shift, params.q_scale);
    Ok(DecodedChunk {
        sequence,
        qstring,
        moves: path.moves,
    })
}

/// Decode a whole read: fetch emissions per chunk, decode the chunks on the
/// inner pool, stitch.
pub fn decode_read(
    read_idx: usize,
    read: &SignalRead,
    source: &dyn EmissionSource,
    params: &DecoderParams,
    telemetry: &Telemetry,
) -> Result<DecodedRead> {
    let crf = source.crf_params();
    let (chunk_size, overlap) = source.chunk_geometry();
    let normalised = read.normalised();
    let chunks = chunk_read(read.len(), chunk_size, overlap);

    let slots: Vec<OnceLock<DecodedChunk>> =
        (0..chunks.len()).map(|_| OnceLock::new()).collect();
    let first_error: Mutex<Option<RoradoError>> = Mutex::new(None);

    let pool = ParallelOptions::new(DECODER_POOL_THREADS.min(chunks.len()));
    parallel_for(chunks.len(), pool, |chunk_idx| {
        let chunk = &chunks[chunk_idx];
        let features = chunk.features(&normalised, chunk_size);
        let result = source
            .chunk_emissions(read_idx, chunk, &features)
            .and_then(|tensor| {
                let view = tensor.view(0, params.temperature);
                THREAD_WORKSPACE
                    .with(|ws| decode_chunk(&view, &crf, params, &mut ws.borrow_mut()))
            });
        match result {
            Ok(decoded) => {
                let _ = slots[chunk_idx].set(decoded);
                telemetry.add_chunks_done(1);
            }
            Err(err) => {
                let mut guard = first_error.lock().expect("error slot");
                guard.get_or_insert(err);
            }
        }
    });

    if let Some(err) = first_error.into_inner().expect("error slot") {
        return Err(err);
    }
    let decoded: Vec<DecodedChunk> = slots
        .into_iter()
        .map(|slot| slot.into_inner().expect("all chunks decoded"))
        .collect();

    let (sequence, qstring) = stitch_chunks(&chunks, &decoded)?;
    telemetry.add_reads_done(1);
    Ok(DecodedRead {
        read_id: read.id.clone(),
        sequence,
        qstring,
    })
}

/// Totals reported after a pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub reads: u64,
    pub bases: u64,
}

/// Basecall pipeline
pub struct BasecallPipeline {
    config: Config,
    telemetry: Arc<Telemetry>,
}

impl BasecallPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            telemetry: Arc::new(Telemetry::new()),
        }
    }

    /// Shared handle for a heartbeat reporter.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn run(&mut self) -> Result<PipelineSummary> {
        let config = &self.config;
        let telemetry = &self.telemetry;
        telemetry.set_stage(Stage::LoadingSignal);

        let source = FileEmissionSource::open(&config.emissions)?;
        let (em_chunk_size, em_overlap) = source.chunk_geometry();
        if em_chunk_size != config.chunk_size || em_overlap != config.overlap {
            return Err(RoradoError::config(format!(
                "emission container was produced with chunk geometry {}/{}, \
                 configuration asks for {}/{}",
                em_chunk_size, em_overlap, config.chunk_size, config.overlap
            )));
        }
        let crf = source.crf_params();
        info!(
            state_len = crf.state_len,
            num_states = crf.num_states,
            beam_width = config.beam_width,
            "decoder initialised"
        );

        let mut reader = SignalReader::open(&config.signal)?;
        let read_budget = config
            .max_reads
            .map(|m| m as u64)
            .unwrap_or(u64::MAX)
            .min(reader.num_reads());
        telemetry.set_reads_total(read_budget);

        let mut writer = FastqWriter::create(&config.out)?;
        let params = config.decoder_params();
        let options = {
            let base = ParallelOptions::new(self.config.nthreads());
            if self.config.no_steal {
                base.without_stealing()
            } else {
                base
            }
        };

        let mut summary = PipelineSummary::default();
        let mut next_read_idx = 0usize;
        let mut batch_num = 0usize;

        loop {
            let remaining = (read_budget - summary.reads) as usize;
            if remaining == 0 {
                break;
            }
            let batch = reader.next_batch(config.batch_size.min(remaining))?;
            if batch.is_empty() {
                break;
            }
            let _span = info_span!("batch", num = batch_num).entered();
            telemetry.set_stage(Stage::Decoding);

            let results = self.process_batch(&batch, next_read_idx, &source, &params, options)?;

            telemetry.set_stage(Stage::WritingOutput);
            for decoded in &results {
                writer.write_record(decoded)?;
                summary.bases += decoded.sequence.len() as u64;
                telemetry.add_bases_written(decoded.sequence.len() as u64);
            }
            summary.reads += batch.len() as u64;
            next_read_idx += batch.len();
            batch_num += 1;
            debug!(reads = summary.reads, "batch complete");
        }

        writer.finish()?;
        telemetry.set_stage(Stage::Complete);
        info!(
            reads = summary.reads,
            bases = summary.bases,
            elapsed_s = telemetry.elapsed().as_secs_f64(),
            "basecalling complete"
        );
        Ok(summary)
    }

    /// Decode one batch of reads. Output order matches input order: each
    /// read's slot is written independently by whichever worker claims it.
    fn process_batch(
        &self,
        batch: &[SignalRead],
        read_idx_base: usize,
        source: &FileEmissionSource,
        params: &DecoderParams,
        options: ParallelOptions,
    ) -> Result<Vec<DecodedRead>> {
        // sanity pass over the batch before burning decode time on it
        batch
            .par_iter()
            .try_for_each(|read| {
                if read.is_empty() {
                    Err(RoradoError::invalid_data(format!(
                        "read {} has no samples",
                        read.id
                    )))
                } else {
                    Ok(())
                }
            })?;

        let slots: Vec<OnceLock<DecodedRead>> =
            (0..batch.len()).map(|_| OnceLock::new()).collect();
        let first_error: Mutex<Option<RoradoError>> = Mutex::new(None);
        let telemetry: &Telemetry = &self.telemetry;

        parallel_for(batch.len(), options, |i| {
            match decode_read(read_idx_base + i, &batch[i], source, params, telemetry) {
                Ok(decoded) => {
                    let _ = slots[i].set(decoded);
                }
                Err(err) => {
                    let mut guard = first_error.lock().expect("error slot");
                    guard.get_or_insert(err);
                }
            }
        });

        if let Some(err) = first_error.into_inner().expect("error slot") {
            return Err(err);
        }
        Ok(slots
            .into_iter()
            .map(|slot| slot.into_inner().expect("all reads decoded"))
            .collect())
    }
}
