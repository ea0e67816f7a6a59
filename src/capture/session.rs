use crate::capture::{MAX_CHANNELS, MAX_SAMPLES_PER_FRAME, TARGET_AUDIO_OUT_RATE};
use crate::error::CaptureError;
use crate::monitor::AA_CUTOFF_HZ;

/// Parameters fixed for the lifetime of one capture run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSession {
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel in one 1 ms USB frame.
    pub samples_per_frame: u32,
    pub decimation_factor: u32,
    pub output_rate: u32,
    /// Anti-alias coefficient in Q31.
    pub iir_coefficient: i32,
}

impl CaptureSession {
    pub fn new(channels: u16, sample_rate: u32) -> Result<Self, CaptureError> {
        Self::with_target_rate(channels, sample_rate, TARGET_AUDIO_OUT_RATE)
    }

    pub fn with_target_rate(
        channels: u16,
        sample_rate: u32,
        target_output_rate: u32,
    ) -> Result<Self, CaptureError> {
        if channels == 0 || channels > MAX_CHANNELS {
            log::error!("Invalid number of channels: {}", channels);
            return Err(CaptureError::InvalidChannels(channels));
        }

        let samples_per_frame = sample_rate / 1000;
        if samples_per_frame == 0 || samples_per_frame > MAX_SAMPLES_PER_FRAME {
            log::error!(
                "Invalid samples per frame: {} ({} Hz)",
                samples_per_frame,
                sample_rate
            );
            return Err(CaptureError::InvalidFrameSize(samples_per_frame, sample_rate));
        }

        // The input rate is usually a multiple of 48 kHz, but not always, so the
        // real output rate may differ from the target.
        let decimation_factor = decimation_factor(sample_rate, target_output_rate);
        let output_rate = sample_rate / decimation_factor;
        let iir_coefficient = iir_coefficient(AA_CUTOFF_HZ as f64, sample_rate as f64);

        log::info!(
            "Capture session: {} ch @ {} Hz, decimation {} -> {} Hz",
            channels,
            sample_rate,
            decimation_factor,
            output_rate
        );

        Ok(Self {
            channels,
            sample_rate,
            samples_per_frame,
            decimation_factor,
            output_rate,
            iir_coefficient,
        })
    }
}

/// Nearest integer ratio between input and target rate, never below 1.
pub fn decimation_factor(input_rate: u32, target_rate: u32) -> u32 {
    if target_rate == 0 {
        return 1;
    }
    let ratio = (input_rate as f64 / target_rate as f64).round() as u32;
    ratio.max(1)
}

/// One-pole low-pass coefficient `1 - exp(-2*pi*fc/fs)` in Q31.
pub fn iir_coefficient(cutoff_hz: f64, sample_rate_hz: f64) -> i32 {
    let exponent = -2.0 * std::f64::consts::PI * cutoff_hz / sample_rate_hz;
    let a = 1.0 - exponent.exp();
    (a * (1i64 << 31) as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_rounds_to_nearest() {
        assert_eq!(decimation_factor(384_000, 48_000), 8);
        assert_eq!(decimation_factor(250_000, 48_000), 5);
        assert_eq!(decimation_factor(500_000, 48_000), 10);
        assert_eq!(decimation_factor(44_100, 48_000), 1);
        assert_eq!(decimation_factor(16_000, 48_000), 1);
    }

    #[test]
    fn output_rate_is_input_over_factor() {
        for rate in [44_100u32, 96_000, 192_000, 250_000, 256_000, 384_000] {
            let session = CaptureSession::new(1, rate).unwrap();
            assert_eq!(session.decimation_factor, decimation_factor(rate, 48_000));
            assert_eq!(session.output_rate, rate / session.decimation_factor);
        }
    }

    #[test]
    fn stereo_384k_session() {
        let session = CaptureSession::new(2, 384_000).unwrap();
        assert_eq!(session.samples_per_frame, 384);
        assert_eq!(session.decimation_factor, 8);
        assert_eq!(session.output_rate, 48_000);
    }

    #[test]
    fn rejects_bad_channel_counts() {
        assert!(matches!(
            CaptureSession::new(0, 384_000),
            Err(CaptureError::InvalidChannels(0))
        ));
        assert!(matches!(
            CaptureSession::new(3, 384_000),
            Err(CaptureError::InvalidChannels(3))
        ));
    }

    #[test]
    fn rejects_frame_sizes_outside_full_speed_limits() {
        assert!(CaptureSession::new(1, 999).is_err());
        assert!(CaptureSession::new(1, 386_000).is_err());
        assert!(CaptureSession::new(1, 385_000).is_ok());
    }

    #[test]
    fn coefficient_matches_closed_form() {
        let c = iir_coefficient(3000.0, 384_000.0);
        let expected = 1.0 - (-2.0 * std::f64::consts::PI * 3000.0 / 384_000.0f64).exp();
        assert!((c as f64 / (1u64 << 31) as f64 - expected).abs() < 1e-9);
        assert!(c > 0);
    }
}
