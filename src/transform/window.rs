use rayon::prelude::*;
use serde::Deserialize;

use crate::error::TransformError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Rectangular,
}

impl WindowFunction {
    /// Symmetric window of `size` points.
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        if size < 2 {
            return vec![1.0; size];
        }
        let denom = (size - 1) as f32;
        let tau = 2.0 * std::f32::consts::PI;
        (0..size)
            .map(|i| {
                let x = tau * i as f32 / denom;
                match self {
                    WindowFunction::Hann => 0.5 * (1.0 - x.cos()),
                    WindowFunction::Hamming => 0.54 - 0.46 * x.cos(),
                    WindowFunction::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
                    WindowFunction::Rectangular => 1.0,
                }
            })
            .collect()
    }
}

/// Copies `window_count` windowed slices of `raw` into `slices`, packed back to
/// back. Window `i` starts at `start + i * stride`; windows that would run past
/// the end of `raw`, or whose start overflows, are skipped. Returns the number of slices written.
pub fn extract_windows(
    raw: &[i16],
    start: usize,
    window_count: usize,
    stride: usize,
    window: &[f32],
    window_size: usize,
    slices: &mut [f32],
) -> Result<usize, TransformError> {
    if window_size == 0 {
        return Err(TransformError::InvalidWindowSize(window_size));
    }
    if window.len() != window_size {
        return Err(TransformError::WindowLength {
            expected: window_size,
            actual: window.len(),
        });
    }

    // Starts only grow, so the first window that does not fit ends the list.
    let starts: Vec<usize> = (0..window_count)
        .map_while(|i| {
            let s = i.checked_mul(stride)?.checked_add(start)?;
            (s.checked_add(window_size)? <= raw.len()).then_some(s)
        })
        .collect();

    let required = starts.len() * window_size;
    if slices.len() < required {
        return Err(TransformError::BufferTooSmall {
            what: "slice",
            required,
            actual: slices.len(),
        });
    }

    slices[..required]
        .par_chunks_mut(window_size)
        .zip(starts.par_iter())
        .for_each(|(slice, &s)| {
            for ((out, &sample), &w) in slice.iter_mut().zip(&raw[s..s + window_size]).zip(window) {
                *out = sample as f32 * w;
            }
        });

    Ok(starts.len())
}
