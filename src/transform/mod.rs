//! Windowed FFT: slice extraction, real transform, dB conversion and trigger
//! detection.

mod fft;
mod window;

pub use fft::{FftContext, FftOutcome, TriggerRange, DB_FACTOR};
pub use window::{extract_windows, WindowFunction};

use crate::error::TransformError;

/// Owner of the FFT context for an analysis session.
///
/// The window size is fixed while initialised; changing it means an explicit
/// [`Transform::cleanup`] (or a fresh [`Transform::init`]) first.
#[derive(Default)]
pub struct Transform {
    context: Option<FftContext>,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the context for `window_size`. Calling again with the same size
    /// keeps the existing plan; a different size replaces it.
    pub fn init(&mut self, window_size: usize) -> Result<(), TransformError> {
        if let Some(ctx) = &self.context {
            if ctx.window_size() == window_size {
                return Ok(());
            }
            log::info!(
                "FFT window size changing {} -> {}",
                ctx.window_size(),
                window_size
            );
            self.cleanup();
        }
        self.context = Some(FftContext::new(window_size)?);
        Ok(())
    }

    pub fn cleanup(&mut self) {
        self.context = None;
    }

    pub fn is_initialised(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&FftContext> {
        self.context.as_ref()
    }

    pub fn buckets(&self) -> Option<usize> {
        self.context.as_ref().map(FftContext::buckets)
    }

    pub fn run_fft(
        &mut self,
        window_count: usize,
        slices: &[f32],
        out_db: &mut [f32],
        out_offset: usize,
        floor_db: f32,
        trigger: Option<TriggerRange>,
    ) -> Result<FftOutcome, TransformError> {
        let ctx = self.context.as_mut().ok_or(TransformError::NotInitialised)?;
        ctx.run(window_count, slices, out_db, out_offset, floor_db, trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_before_init_fails() {
        let mut t = Transform::new();
        let mut out = vec![0.0f32; 4];
        assert!(matches!(
            t.run_fft(0, &[], &mut out, 0, -90.0, None),
            Err(TransformError::NotInitialised)
        ));
    }

    #[test]
    fn reinit_with_new_size_replaces_context() {
        let mut t = Transform::new();
        t.init(256).unwrap();
        assert_eq!(t.buckets(), Some(129));
        t.init(256).unwrap();
        t.init(512).unwrap();
        assert_eq!(t.buckets(), Some(257));
        t.cleanup();
        assert!(!t.is_initialised());
    }

    #[test]
    fn failed_init_leaves_nothing_armed() {
        let mut t = Transform::new();
        assert!(t.init(3).is_err());
        assert!(!t.is_initialised());
    }

    #[test]
    fn extract_then_transform() {
        let size = 64;
        let mut t = Transform::new();
        t.init(size).unwrap();
        let raw: Vec<i16> = (0..size * 4)
            .map(|i| ((2.0 * std::f32::consts::PI * 8.0 * i as f32 / size as f32).sin() * 8000.0) as i16)
            .collect();
        let window = WindowFunction::Hann.coefficients(size);
        let mut slices = vec![0.0f32; size * 4];
        let windows = extract_windows(&raw, 0, 4, size, &window, size, &mut slices).unwrap();
        assert_eq!(windows, 4);

        let buckets = t.buckets().unwrap();
        let mut db = vec![0.0f32; buckets * windows];
        let outcome = t
            .run_fft(
                windows,
                &slices,
                &mut db,
                0,
                -120.0,
                Some(TriggerRange {
                    min_bucket: 7,
                    max_bucket: 9,
                    threshold_db: 40.0,
                }),
            )
            .unwrap();
        assert!(outcome.triggered);
        for row in db.chunks(buckets) {
            let peak = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(peak, 8);
        }
    }
}
