//! Live capture: session parameters, the isochronous transfer loop, channel
//! merging, ring export and WAV recording.

/// Interleaved input channels supported by the merge stage.
pub const MAX_CHANNELS: u16 = 2;

/// Upper limit for full speed USB, plus one for devices that occasionally
/// send an extra sample to stay in sync.
pub const MAX_SAMPLES_PER_FRAME: u32 = 384 + 1;

/// Transfers completed per second; sets the host update rate.
pub const URBS_PER_SECOND: u32 = 40;

/// Transfers kept in flight. At least 2; more gives queueing depth.
pub const URBS_TO_JUGGLE: usize = 10;

/// One packet per 1 ms USB frame.
pub const PACKETS_PER_URB: usize = (1000 / URBS_PER_SECOND) as usize;

pub const MAX_SAMPLES_PER_URB: usize =
    MAX_SAMPLES_PER_FRAME as usize * MAX_CHANNELS as usize * PACKETS_PER_URB;

/// Native output rate on most audio hardware.
pub const TARGET_AUDIO_OUT_RATE: u32 = 48_000;

mod control;
mod engine;
mod merge;
mod recorder;
mod ring;
mod session;

pub use control::CaptureControl;
pub use engine::{start_capture, CaptureEngine, CaptureSummary, EngineState, StopReason};
pub use merge::{average_pair, compact_packets, merge_interleaved, merge_stereo_in_place};
pub use recorder::Recorder;
pub use ring::{copy_wrapped, SampleRun};
pub use session::{decimation_factor, iir_coefficient, CaptureSession};
