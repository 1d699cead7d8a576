//! # Read Representations
//!
//! A `SignalRead` is one read's raw current measurements plus the device
//! calibration needed to convert them to picoamps. Normalisation happens
//! once, before chunking; everything downstream sees unit-scaled floats.

/// One raw read as delivered by signal I/O.
#[derive(Clone, Debug)]
pub struct SignalRead {
    /// Read identifier (carried through to FASTQ output)
    pub id: String,
    /// Raw integer samples from the device
    pub samples: Vec<i16>,
    /// ADC digitisation (counts per volt range)
    pub digitisation: f32,
    /// ADC offset in counts
    pub offset: f32,
    /// Measurable current range in picoamps
    pub range: f32,
}

impl SignalRead {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert raw counts to picoamps using the device calibration.
    pub fn to_pa(&self) -> Vec<f32> {
        let scale = self.range / self.digitisation;
        self.samples
            .iter()
            .map(|&s| (s as f32 + self.offset) * scale)
            .collect()
    }

    /// Normalised feature signal: pA conversion followed by med/MAD scaling,
    /// the standard transform applied before chunking.
    pub fn normalised(&self) -> Vec<f32> {
        let mut pa = self.to_pa();
        let (med, mad) = med_mad(&pa);
        let denom = if mad > f32::EPSILON { mad } else { 1.0 };
        for x in &mut pa {
            *x = (*x - med) / denom;
        }
        pa
    }
}

/// Final stitched output for one read.
#[derive(Clone, Debug)]
pub struct DecodedRead {
    pub read_id: String,
    pub sequence: String,
    pub qstring: String,
}

/// Median and median-absolute-deviation of a sample buffer.
///
/// The MAD is scaled by 1.4826 to estimate the standard deviation of a
/// normal distribution.
fn med_mad(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 1.0);
    }
    let med = median(samples);
    let deviations: Vec<f32> = samples.iter().map(|&x| (x - med).abs()).collect();
    let mad = 1.4826 * median(&deviations);
    (med, mad)
}

fn median(samples: &[f32]) -> f32 {
    let mut sorted = samples.to_vec();
    let mid = sorted.len() / 2;
    let (_, m, _) = sorted.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_read(samples: Vec<i16>) -> SignalRead {
        SignalRead {
            id: "read-1".to_string(),
            samples,
            digitisation: 8192.0,
            offset: 10.0,
            range: 1400.0,
        }
    }

    #[test]
    fn test_pa_conversion() {
        let read = make_read(vec![0, 100]);
        let pa = read.to_pa();
        let scale = 1400.0 / 8192.0;
        assert!((pa[0] - 10.0 * scale).abs() < 1e-4);
        assert!((pa[1] - 110.0 * scale).abs() < 1e-4);
    }

    #[test]
    fn test_normalised_is_centred() {
        let read = make_read((0..1001).map(|i| (i % 400) as i16).collect());
        let norm = read.normalised();
        let mut sorted = norm.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let med = sorted[sorted.len() / 2];
        assert!(med.abs() < 1e-4);
    }

    #[test]
    fn test_constant_signal_does_not_divide_by_zero() {
        let read = make_read(vec![42; 100]);
        let norm = read.normalised();
        assert!(norm.iter().all(|x| x.is_finite()));
    }
}
