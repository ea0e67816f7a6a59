use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::TransformError;
use crate::guard::GuardedBuffer;

/// `10 / log2(10)`: turns `log2` of a squared magnitude into decibels.
pub const DB_FACTOR: f32 = 10.0 / std::f32::consts::LOG2_10;

const GUARD: Complex<f32> = Complex { re: -1.0, im: -1.0 };

/// Inclusive frequency bucket range that raises the trigger when any value
/// in it reaches `threshold_db`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerRange {
    pub min_bucket: usize,
    pub max_bucket: usize,
    pub threshold_db: f32,
}

impl TriggerRange {
    #[inline]
    fn fires(&self, bucket: usize, db: f32) -> bool {
        bucket >= self.min_bucket && bucket <= self.max_bucket && db >= self.threshold_db
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FftOutcome {
    pub windows: usize,
    pub triggered: bool,
}

/// Real FFT plan and buffers for one window size.
pub struct FftContext {
    window_size: usize,
    buckets: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: GuardedBuffer<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftContext {
    pub fn new(window_size: usize) -> Result<Self, TransformError> {
        if window_size < 2 || window_size % 2 != 0 {
            log::error!("Invalid FFT window size {}", window_size);
            return Err(TransformError::InvalidWindowSize(window_size));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let buckets = window_size / 2 + 1;
        let scratch = fft.make_scratch_vec();
        log::debug!("FFT context: window {}, {} buckets", window_size, buckets);
        Ok(Self {
            window_size,
            buckets,
            fft,
            input: vec![0.0; window_size],
            output: GuardedBuffer::new(buckets, Complex::new(0.0, 0.0), GUARD),
            scratch,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Frequency buckets per window, `window_size / 2 + 1`.
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Transforms `window_count` packed slices into dB rows of `out_db`
    /// starting at `out_offset`. A bucket with zero power gets `floor_db` and
    /// never raises the trigger, whatever the threshold.
    pub fn run(
        &mut self,
        window_count: usize,
        slices: &[f32],
        out_db: &mut [f32],
        out_offset: usize,
        floor_db: f32,
        trigger: Option<TriggerRange>,
    ) -> Result<FftOutcome, TransformError> {
        let needed_in = window_count * self.window_size;
        if slices.len() < needed_in {
            return Err(TransformError::BufferTooSmall {
                what: "slice",
                required: needed_in,
                actual: slices.len(),
            });
        }
        let needed_out = out_offset + window_count * self.buckets;
        if out_db.len() < needed_out {
            return Err(TransformError::BufferTooSmall {
                what: "dB",
                required: needed_out,
                actual: out_db.len(),
            });
        }

        let normalizer = 2.0 / self.window_size as f32;
        let normalizer2 = normalizer * normalizer;
        let mut triggered = false;

        let rows = out_db[out_offset..needed_out].chunks_exact_mut(self.buckets);
        for (slice, row) in slices[..needed_in].chunks_exact(self.window_size).zip(rows) {
            // The transform uses its input as workspace.
            self.input.copy_from_slice(slice);
            self.fft
                .process_with_scratch(&mut self.input, self.output.as_mut_slice(), &mut self.scratch)
                .map_err(|e| TransformError::Fft(e.to_string()))?;
            self.output.debug_check();

            for (bucket, (value, out)) in self.output.as_slice().iter().zip(row.iter_mut()).enumerate() {
                let mag2 = (value.re * value.re + value.im * value.im) * normalizer2;
                if mag2 > 0.0 {
                    let db = DB_FACTOR * mag2.log2();
                    *out = db;
                    if let Some(range) = &trigger {
                        triggered |= range.fires(bucket, db);
                    }
                } else {
                    *out = floor_db;
                }
            }
        }

        Ok(FftOutcome {
            windows: window_count,
            triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(size: usize, cycles: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * (cycles * i) as f32 / size as f32;
                x.sin() * amplitude
            })
            .collect()
    }

    #[test]
    fn rejects_odd_and_tiny_windows() {
        assert!(FftContext::new(0).is_err());
        assert!(FftContext::new(1).is_err());
        assert!(FftContext::new(255).is_err());
        assert_eq!(FftContext::new(256).unwrap().buckets(), 129);
    }

    #[test]
    fn silence_is_floor_and_never_triggers() {
        let mut ctx = FftContext::new(64).unwrap();
        let slices = vec![0.0f32; 64 * 3];
        let mut out = vec![1.0f32; 33 * 3];
        let trigger = TriggerRange {
            min_bucket: 0,
            max_bucket: 32,
            threshold_db: -1000.0,
        };
        let outcome = ctx.run(3, &slices, &mut out, 0, -120.0, Some(trigger)).unwrap();
        assert_eq!(outcome, FftOutcome { windows: 3, triggered: false });
        assert!(out.iter().all(|&v| v == -120.0));
    }

    #[test]
    fn floor_at_or_above_threshold_does_not_trigger() {
        let mut ctx = FftContext::new(16).unwrap();
        let slices = vec![0.0f32; 16];
        let mut out = vec![0.0f32; 9];
        let trigger = TriggerRange {
            min_bucket: 0,
            max_bucket: 8,
            threshold_db: -120.0,
        };
        let outcome = ctx.run(1, &slices, &mut out, 0, -120.0, Some(trigger)).unwrap();
        assert!(!outcome.triggered);

        // Any real energy at that threshold still fires.
        let mut slices = vec![0.0f32; 16];
        slices[0] = 1.0;
        let outcome = ctx.run(1, &slices, &mut out, 0, -120.0, Some(trigger)).unwrap();
        assert!(outcome.triggered);
    }

    #[test]
    fn sine_peaks_at_its_bucket_with_amplitude_normalised() {
        let size = 256;
        let mut ctx = FftContext::new(size).unwrap();
        let slices = sine(size, 32, 1000.0);
        let mut out = vec![0.0f32; ctx.buckets()];
        ctx.run(1, &slices, &mut out, 0, -200.0, None).unwrap();

        let (peak, value) = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(peak, 32);
        // Amplitude 1000 reads as 20*log10(1000) = 60 dB.
        assert!((value - 60.0).abs() < 0.1, "peak {} dB", value);
    }

    #[test]
    fn trigger_only_inside_range() {
        let size = 128;
        let mut ctx = FftContext::new(size).unwrap();
        let slices = sine(size, 10, 5000.0);
        let mut out = vec![0.0f32; ctx.buckets()];

        let outside = TriggerRange {
            min_bucket: 20,
            max_bucket: 40,
            threshold_db: 50.0,
        };
        assert!(!ctx.run(1, &slices, &mut out, 0, -200.0, Some(outside)).unwrap().triggered);

        let inside = TriggerRange {
            min_bucket: 5,
            max_bucket: 10,
            threshold_db: 50.0,
        };
        assert!(ctx.run(1, &slices, &mut out, 0, -200.0, Some(inside)).unwrap().triggered);
    }

    #[test]
    fn writes_at_output_offset() {
        let mut ctx = FftContext::new(8).unwrap();
        let slices = vec![0.0f32; 16];
        let mut out = vec![7.0f32; 3 + 2 * 5];
        ctx.run(2, &slices, &mut out, 3, -90.0, None).unwrap();
        assert_eq!(&out[..3], &[7.0, 7.0, 7.0]);
        assert!(out[3..].iter().all(|&v| v == -90.0));
    }

    #[test]
    fn output_buffer_must_fit() {
        let mut ctx = FftContext::new(8).unwrap();
        let slices = vec![0.0f32; 8];
        let mut out = vec![0.0f32; 4];
        assert!(matches!(
            ctx.run(1, &slices, &mut out, 0, -90.0, None),
            Err(TransformError::BufferTooSmall { what: "dB", required: 5, actual: 4 })
        ));
    }
}
