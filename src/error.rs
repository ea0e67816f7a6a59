use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unsupported channel count {0} (expected 1 or 2)")]
    InvalidChannels(u16),
    #[error("unsupported samples per frame {0} (sample rate {1} Hz)")]
    InvalidFrameSize(u32, u32),
    #[error("max packet size {0} bytes does not fit a transfer slot")]
    InvalidPacketSize(u32),
    #[error("failed to submit isochronous transfer: {0}")]
    Submit(Errno),
    #[error("device removed during capture")]
    DeviceRemoved,
    #[error("every transfer failed to resubmit; nothing left in flight")]
    AllTransfersLost,
    #[error("capture already running")]
    AlreadyRunning,
    #[error("no capture is running")]
    NotRunning,
    #[error("WAV recording: {0}")]
    Recording(#[from] hound::Error),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no capture session is active")]
    NoSession,
    #[error("heterodyne {tone} kHz is outside 0..={max} kHz for this frame length")]
    ToneOutOfRange { tone: u32, max: u32 },
    #[error("boost shift {0} is outside 0..=15")]
    InvalidBoost(u32),
    #[error("audio output: {0}")]
    Output(String),
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("FFT window size {0} must be even and at least 2")]
    InvalidWindowSize(usize),
    #[error("transform has not been initialised")]
    NotInitialised,
    #[error("window function has {actual} coefficients, expected {expected}")]
    WindowLength { expected: usize, actual: usize },
    #[error("{what} buffer holds {actual} values, {required} required")]
    BufferTooSmall {
        what: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("FFT failed: {0}")]
    Fft(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("colour map is empty")]
    EmptyColourMap,
    #[error("surface {width}x{height} cannot hold {what}")]
    SurfaceTooSmall {
        width: usize,
        height: usize,
        what: String,
    },
    #[error("{what} holds {actual} values, {required} required")]
    InputTooSmall {
        what: &'static str,
        required: usize,
        actual: usize,
    },
}
