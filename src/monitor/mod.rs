//! Heterodyne monitor: mixes the capture down into the audible band and
//! plays it while recording.

use std::time::Duration;

use crate::capture::{CaptureSession, URBS_PER_SECOND};
use crate::error::MonitorError;

mod filter;
mod heterodyne;
mod oscillator;
mod output;

pub use filter::AntiAliasFilter;
pub use heterodyne::{Heterodyne, Tones, MAX_BOOST_SHIFT};
pub use oscillator::{Phase, ReferenceTable, MAX_REFERENCE_LEN, REFERENCE_AMPLITUDE};
pub use output::{AudioSink, CollectingSink, CpalSink};

/// Anti-alias low-pass corner ahead of decimation.
pub const AA_CUTOFF_HZ: u32 = 3000;

/// Cascaded one-pole stages in the anti-alias filter.
pub const AA_STAGES: usize = 4;

/// Longest a transfer's worth of monitor audio may block the capture loop.
pub fn write_timeout() -> Duration {
    Duration::from_secs(1) / URBS_PER_SECOND
}

/// A running monitor: heterodyne plus the sink it feeds.
pub struct MonitorPath {
    heterodyne: Heterodyne,
    sink: Box<dyn AudioSink>,
    scratch: Vec<i16>,
    timeout: Duration,
    short_writes: u64,
}

impl MonitorPath {
    pub fn new(heterodyne: Heterodyne, sink: Box<dyn AudioSink>) -> Self {
        Self {
            heterodyne,
            sink,
            scratch: Vec::new(),
            timeout: write_timeout(),
            short_writes: 0,
        }
    }

    pub fn start(
        session: &CaptureSession,
        reference: ReferenceTable,
        tones: Tones,
        boost_shift: u32,
        sink: Box<dyn AudioSink>,
    ) -> Result<Self, MonitorError> {
        if sink.sample_rate() != session.output_rate {
            log::warn!(
                "Monitor sink runs at {} Hz, capture decimates to {} Hz",
                sink.sample_rate(),
                session.output_rate
            );
        }
        let heterodyne = Heterodyne::new(session, reference, tones, boost_shift)?;
        Ok(Self::new(heterodyne, sink))
    }

    pub fn set_tones(&mut self, tones: Tones) -> Result<(), MonitorError> {
        self.heterodyne.set_tones(tones)
    }

    pub fn tones(&self) -> Tones {
        self.heterodyne.tones()
    }

    pub fn short_writes(&self) -> u64 {
        self.short_writes
    }

    /// Mixes one run of mono capture and writes it to the sink.
    pub fn feed(&mut self, samples: &[i16]) -> usize {
        self.scratch.clear();
        self.heterodyne.process(samples, &mut self.scratch);
        if self.scratch.is_empty() {
            return 0;
        }
        match self.sink.write(&self.scratch, self.timeout) {
            Ok(written) => {
                if written < self.scratch.len() {
                    self.short_writes += 1;
                    log::warn!(
                        "Monitor output short write: {} of {} samples",
                        written,
                        self.scratch.len()
                    );
                }
                written
            }
            Err(e) => {
                log::warn!("Monitor output failed: {}", e);
                0
            }
        }
    }

    /// Stops playback and hands back the reference table for reuse.
    pub fn stop(self) -> ReferenceTable {
        if self.short_writes > 0 {
            log::info!("Monitor stopped after {} short writes", self.short_writes);
        }
        self.heterodyne.into_reference()
    }
}
