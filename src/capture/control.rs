use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{CaptureError, MonitorError};
use crate::monitor::{AudioSink, MonitorPath, ReferenceTable, Tones, MAX_REFERENCE_LEN};

use super::{CaptureSession, Recorder};

/// Host-facing handle shared with the capture thread.
///
/// Flags are polled by the capture loop between reaps. Everything else sits
/// behind one mutex that the loop only takes to forward a finished run, never
/// while blocked on the device.
#[derive(Default)]
pub struct CaptureControl {
    cancel: AtomicBool,
    paused: AtomicBool,
    running: AtomicBool,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    session: Option<CaptureSession>,
    monitor: Option<MonitorPath>,
    recorder: Option<Recorder>,
    tones: Tones,
    reference: Option<ReferenceTable>,
}

impl CaptureControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops new submissions; the loop returns once in-flight transfers drain.
    /// Also clears a pending pause so the drain is not silently swallowed.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<CaptureSession> {
        self.shared().session
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self, session: CaptureSession) -> Result<(), CaptureError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::error!("Capture already running");
            return Err(CaptureError::AlreadyRunning);
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.shared().session = Some(session);
        Ok(())
    }

    pub(crate) fn end(&self) {
        self.stop_monitor();
        self.stop_recording();
        self.shared().session = None;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Records the merged capture to `path`, closing any previous recording.
    pub fn start_recording(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(hound::Error::from)?;
        self.start_recording_file(file, path)
    }

    pub fn start_recording_file(
        &self,
        file: File,
        label: impl AsRef<Path>,
    ) -> Result<(), CaptureError> {
        let mut shared = self.shared();
        let session = shared.session.ok_or(CaptureError::NotRunning)?;
        if let Some(previous) = shared.recorder.take() {
            finish_recorder(previous);
        }
        shared.recorder = Some(Recorder::from_file(file, label, session.sample_rate)?);
        Ok(())
    }

    /// Returns the number of samples in the closed recording, if one was open.
    pub fn stop_recording(&self) -> Option<u64> {
        let recorder = self.shared().recorder.take()?;
        finish_recorder(recorder)
    }

    pub fn is_recording(&self) -> bool {
        self.shared().recorder.is_some()
    }

    /// Starts (or restarts) the heterodyne monitor on `sink`. Filter and
    /// phase state start from zero; the reference table is kept between
    /// runs while the frame length stays the same.
    pub fn start_monitor(
        &self,
        sink: Box<dyn AudioSink>,
        tone1_khz: u32,
        tone2_khz: u32,
        boost_shift: u32,
    ) -> Result<(), MonitorError> {
        let mut shared = self.shared();
        let session = shared.session.ok_or(MonitorError::NoSession)?;

        if let Some(running) = shared.monitor.take() {
            shared.reference = Some(running.stop());
        }

        let wanted = (session.samples_per_frame as usize).min(MAX_REFERENCE_LEN);
        let reference = match shared.reference.take() {
            Some(table) if table.len() == wanted => table,
            _ => {
                log::debug!("Building {} point reference table", wanted);
                ReferenceTable::new(wanted)
            }
        };

        let tones = Tones::new(tone1_khz, tone2_khz);
        if let Err(e) = tones.validate(reference.len()) {
            shared.reference = Some(reference);
            return Err(e);
        }

        let monitor = MonitorPath::start(&session, reference, tones, boost_shift, sink)?;
        log::info!(
            "Monitor started: {} kHz / {} kHz, boost {}",
            tone1_khz,
            tone2_khz,
            boost_shift
        );
        shared.tones = tones;
        shared.monitor = Some(monitor);
        Ok(())
    }

    pub fn stop_monitor(&self) {
        let mut shared = self.shared();
        if let Some(monitor) = shared.monitor.take() {
            shared.reference = Some(monitor.stop());
            log::info!("Monitor stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared().monitor.is_some()
    }

    /// Retunes the running monitor. Tones are validated against the active
    /// session's frame length, so a capture must be running.
    pub fn set_heterodyne(&self, tone1_khz: u32, tone2_khz: u32) -> Result<(), MonitorError> {
        let tones = Tones::new(tone1_khz, tone2_khz);
        let mut shared = self.shared();
        let session = shared.session.ok_or(MonitorError::NoSession)?;
        tones.validate((session.samples_per_frame as usize).min(MAX_REFERENCE_LEN))?;
        if let Some(monitor) = shared.monitor.as_mut() {
            monitor.set_tones(tones)?;
        }
        shared.tones = tones;
        Ok(())
    }

    pub fn tones(&self) -> Tones {
        self.shared().tones
    }

    /// Hands one mono run to the monitor and recorder, whichever are active.
    pub(crate) fn forward(&self, samples: &[i16]) {
        let mut shared = self.shared();
        if let Some(monitor) = shared.monitor.as_mut() {
            monitor.feed(samples);
        }
        let failed = match shared.recorder.as_mut() {
            Some(recorder) => recorder.write(samples).err(),
            None => None,
        };
        if let Some(e) = failed {
            log::error!("Recording stopped: {}", e);
            if let Some(recorder) = shared.recorder.take() {
                finish_recorder(recorder);
            }
        }
    }
}

fn finish_recorder(recorder: Recorder) -> Option<u64> {
    let path = recorder.path().to_path_buf();
    match recorder.finish() {
        Ok(samples) => Some(samples),
        Err(e) => {
            log::error!("Failed to close recording {}: {}", path.display(), e);
            None
        }
    }
}
