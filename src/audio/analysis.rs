use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use super::decode::Recording;
use crate::render::{
    query_db_range, render_amplitude, render_colour_map, Calibration, ColourMap, PixelSurface,
};
use crate::transform::{extract_windows, Transform, TriggerRange, WindowFunction};

/// Trigger band in Hz, converted to buckets once the window size is known.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerBand {
    pub min_hz: f32,
    pub max_hz: f32,
    pub threshold_db: f32,
}

#[derive(Clone, Debug)]
pub struct SpectrogramSettings {
    pub window_size: usize,
    pub stride: usize,
    pub window: WindowFunction,
    pub floor_db: f32,
    /// Windows handed to the transform per call.
    pub chunk_windows: usize,
    pub trigger: Option<TriggerBand>,
}

/// dB matrix plus the amplitude strip for a whole recording.
pub struct Spectrogram {
    pub db: Vec<f32>,
    pub buckets: usize,
    pub windows: usize,
    pub window_size: usize,
    pub stride: usize,
    pub sample_rate: u32,
    pub amplitude: PixelSurface,
    /// Start time in seconds of every chunk that triggered.
    pub triggers: Vec<f32>,
}

/// Nearest FFT bucket for `hz`, clamped to the last bucket.
pub fn bucket_for_hz(hz: f32, window_size: usize, sample_rate: u32) -> usize {
    let buckets = window_size / 2 + 1;
    let bucket = (hz.max(0.0) * window_size as f32 / sample_rate.max(1) as f32).round() as usize;
    bucket.min(buckets - 1)
}

/// Windows of `window_size` at `stride` that fit entirely in `len` samples.
pub fn window_count(len: usize, window_size: usize, stride: usize) -> usize {
    if window_size == 0 || stride == 0 || len < window_size {
        return 0;
    }
    (len - window_size) / stride + 1
}

pub fn analyse(
    recording: &Recording,
    settings: &SpectrogramSettings,
    amplitude_height: usize,
    graph_colour: u16,
) -> Result<Spectrogram> {
    let size = settings.window_size;
    let stride = settings.stride.max(1);
    let chunk = settings.chunk_windows.max(1);

    let mut transform = Transform::new();
    transform.init(size).context("Failed to initialise FFT")?;
    let buckets = transform.buckets().context("FFT context missing after init")?;

    let total = window_count(recording.samples.len(), size, stride);
    anyhow::ensure!(
        total > 0,
        "Recording has {} samples, shorter than one {} sample window",
        recording.samples.len(),
        size
    );

    let trigger = settings.trigger.map(|band| TriggerRange {
        min_bucket: bucket_for_hz(band.min_hz, size, recording.sample_rate),
        max_bucket: bucket_for_hz(band.max_hz, size, recording.sample_rate),
        threshold_db: band.threshold_db,
    });
    if let Some(range) = &trigger {
        log::info!(
            "Trigger on buckets {}..={} at {:.1} dB",
            range.min_bucket,
            range.max_bucket,
            range.threshold_db
        );
    }

    let coefficients = settings.window.coefficients(size);
    let mut slices = vec![0.0f32; chunk * size];
    let mut db = vec![settings.floor_db; total * buckets];
    let mut amplitude = PixelSurface::new(total, amplitude_height);
    let mut triggers = Vec::new();

    log::info!(
        "Spectrogram: {} windows of {} ({:?}), stride {}, {} buckets",
        total,
        size,
        settings.window,
        stride,
        buckets
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} windows ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut done = 0;
    while done < total {
        let count = chunk.min(total - done);
        let start = done * stride;
        let extracted = extract_windows(
            &recording.samples,
            start,
            count,
            stride,
            &coefficients,
            size,
            &mut slices,
        )?;

        let outcome = transform.run_fft(
            extracted,
            &slices,
            &mut db,
            done * buckets,
            settings.floor_db,
            trigger,
        )?;
        if outcome.triggered {
            let at = start as f32 / recording.sample_rate as f32;
            log::info!("Trigger at {:.3}s", at);
            triggers.push(at);
        }

        render_amplitude(&slices, extracted, size, &mut amplitude, done, graph_colour)?;

        done += extracted.max(1);
        pb.set_position(done.min(total) as u64);
    }
    pb.finish_and_clear();

    transform.cleanup();

    Ok(Spectrogram {
        db,
        buckets,
        windows: total,
        window_size: size,
        stride,
        sample_rate: recording.sample_rate,
        amplitude,
        triggers,
    })
}

impl Spectrogram {
    /// dB range across the whole matrix, for automatic brightness/contrast.
    pub fn db_range(&self) -> Option<(f32, f32)> {
        if self.windows < 2 {
            return None;
        }
        query_db_range(&self.db, self.buckets, 0, self.windows - 1, 0, self.buckets - 1)
    }

    /// Colour-mapped spectrogram with the amplitude strip underneath.
    pub fn render(&self, map: &ColourMap, calibration: Calibration) -> Result<PixelSurface> {
        let mut plot = PixelSurface::new(self.windows, self.buckets);
        render_colour_map(map, &self.db, self.buckets, 0, self.windows, &mut plot, calibration)?;

        let mut canvas = PixelSurface::new(self.windows, self.buckets + self.amplitude.height());
        canvas.blit_rows(&plot, 0);
        canvas.blit_rows(&self.amplitude, self.buckets);
        Ok(canvas)
    }
}
