use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use nix::errno::Errno;

use crate::error::CaptureError;
use crate::usb::{IsoEndpoint, TransferPool};

use super::merge::{compact_packets, merge_stereo_in_place};
use super::{CaptureControl, CaptureSession, SampleRun};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Submitting,
    AwaitingCompletion,
    /// Cancel seen; no resubmissions, waiting for in-flight transfers.
    Draining,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The notification receiver was dropped; treated as a cancel.
    HostDisconnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSummary {
    pub session: CaptureSession,
    pub transfers_reaped: u64,
    pub samples_delivered: u64,
    pub notifications_dropped: u64,
    pub reap_errors: u64,
    pub resubmit_failures: u64,
    pub stop_reason: StopReason,
}

/// Runs a capture on `endpoint` until `control` is cancelled and every
/// in-flight transfer has come back.
///
/// Parameters are validated before anything is submitted. Each drained
/// transfer produces one [`SampleRun`] on `sender` (dropped with a warning if
/// the channel is full) and is forwarded to the monitor and recorder. Both are
/// stopped when the loop exits, whatever the outcome.
pub fn start_capture<E: IsoEndpoint>(
    endpoint: &mut E,
    control: &CaptureControl,
    endpoint_address: u8,
    channels: u16,
    sample_rate: u32,
    max_packet_size: u32,
    sender: Sender<SampleRun>,
) -> Result<CaptureSummary, CaptureError> {
    let session = CaptureSession::new(channels, sample_rate)?;
    let pool = TransferPool::new(endpoint_address, max_packet_size)?;
    control.begin(session)?;

    let result = CaptureEngine::new(endpoint, control, session, pool, sender).run();

    control.end();
    match &result {
        Ok(summary) => log::info!(
            "Capture stopped ({:?}): {} transfers, {} samples, {} notifications dropped",
            summary.stop_reason,
            summary.transfers_reaped,
            summary.samples_delivered,
            summary.notifications_dropped
        ),
        Err(e) => log::error!("Capture failed: {}", e),
    }
    result
}

/// Submit/reap loop over a fixed transfer pool.
pub struct CaptureEngine<'a, E: IsoEndpoint> {
    endpoint: &'a mut E,
    control: &'a CaptureControl,
    session: CaptureSession,
    pool: TransferPool,
    sender: Sender<SampleRun>,
    state: EngineState,
    in_flight: Vec<bool>,
    outstanding: usize,
    scratch: Vec<i16>,
    sequence: u64,
    host_connected: bool,
    transfers_reaped: u64,
    samples_delivered: u64,
    notifications_dropped: u64,
    reap_errors: u64,
    resubmit_failures: u64,
}

impl<'a, E: IsoEndpoint> CaptureEngine<'a, E> {
    pub fn new(
        endpoint: &'a mut E,
        control: &'a CaptureControl,
        session: CaptureSession,
        pool: TransferPool,
        sender: Sender<SampleRun>,
    ) -> Self {
        let slots = pool.len();
        Self {
            endpoint,
            control,
            session,
            pool,
            sender,
            state: EngineState::Idle,
            in_flight: vec![false; slots],
            outstanding: 0,
            scratch: Vec::new(),
            sequence: 0,
            host_connected: true,
            transfers_reaped: 0,
            samples_delivered: 0,
            notifications_dropped: 0,
            reap_errors: 0,
            resubmit_failures: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            log::debug!("Capture engine {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    pub fn run(mut self) -> Result<CaptureSummary, CaptureError> {
        let result = self.juggle();
        self.transition(EngineState::Stopped);
        result
    }

    fn juggle(&mut self) -> Result<CaptureSummary, CaptureError> {
        self.submit_all()?;
        self.transition(EngineState::AwaitingCompletion);

        loop {
            if self.control.is_cancelled() {
                if self.state != EngineState::Draining {
                    log::info!(
                        "Capture cancelled, draining {} transfers",
                        self.outstanding
                    );
                }
                self.transition(EngineState::Draining);
                if self.outstanding == 0 {
                    break;
                }
            } else if self.outstanding == 0 {
                log::error!("No transfers left in flight");
                return Err(CaptureError::AllTransfersLost);
            }

            let index = match self.endpoint.reap(&mut self.pool) {
                Ok(index) => index,
                Err(Errno::EINTR) => continue,
                Err(Errno::ENODEV) => {
                    log::error!("Device removed while capturing");
                    return Err(CaptureError::DeviceRemoved);
                }
                Err(e) => {
                    log::warn!("Reap failed: {}", e);
                    self.reap_errors += 1;
                    continue;
                }
            };

            if !self.in_flight[index] {
                log::warn!("Reaped slot {} that was not in flight", index);
                continue;
            }
            self.in_flight[index] = false;
            self.outstanding -= 1;
            self.transfers_reaped += 1;

            if !self.control.is_paused() {
                self.drain(index);
            }

            if !self.control.is_cancelled() {
                self.resubmit(index)?;
            }
        }

        let stop_reason = if self.host_connected {
            StopReason::Cancelled
        } else {
            StopReason::HostDisconnected
        };
        Ok(CaptureSummary {
            session: self.session,
            transfers_reaped: self.transfers_reaped,
            samples_delivered: self.samples_delivered,
            notifications_dropped: self.notifications_dropped,
            reap_errors: self.reap_errors,
            resubmit_failures: self.resubmit_failures,
            stop_reason,
        })
    }

    fn submit_all(&mut self) -> Result<(), CaptureError> {
        self.transition(EngineState::Submitting);
        for index in 0..self.pool.len() {
            if let Err(e) = self.submit_slot(index) {
                log::error!("Failed to submit transfer {}: {}", index, e);
                self.discard_in_flight();
                return Err(match e {
                    Errno::ENODEV => CaptureError::DeviceRemoved,
                    e => CaptureError::Submit(e),
                });
            }
            self.in_flight[index] = true;
            self.outstanding += 1;
        }
        log::debug!("Submitted {} transfers", self.outstanding);
        Ok(())
    }

    fn discard_in_flight(&mut self) {
        for index in 0..self.pool.len() {
            if !self.in_flight[index] {
                continue;
            }
            if let Err(e) = self.endpoint.discard(self.pool.slot_mut(index)) {
                log::warn!("Failed to discard transfer {}: {}", index, e);
            }
            self.in_flight[index] = false;
        }
        self.outstanding = 0;
    }

    /// Submits one slot, retrying calls interrupted by a signal.
    fn submit_slot(&mut self, index: usize) -> Result<(), Errno> {
        loop {
            match self.endpoint.submit(self.pool.slot_mut(index)) {
                Err(Errno::EINTR) => continue,
                other => return other,
            }
        }
    }

    /// Puts a drained slot back in flight. Losing the device ends the
    /// capture; any other failure leaves the slot idle.
    fn resubmit(&mut self, index: usize) -> Result<(), CaptureError> {
        match self.submit_slot(index) {
            Ok(()) => {
                self.in_flight[index] = true;
                self.outstanding += 1;
                Ok(())
            }
            Err(Errno::ENODEV) => {
                log::error!("Device removed while resubmitting transfer {}", index);
                Err(CaptureError::DeviceRemoved)
            }
            Err(e) => {
                log::warn!("Failed to resubmit transfer {}: {}", index, e);
                self.resubmit_failures += 1;
                Ok(())
            }
        }
    }

    /// De-pads and merges a completed slot, then hands it on.
    fn drain(&mut self, index: usize) {
        let slot = self.pool.slot(index);
        let buffer = Arc::clone(slot.buffer());
        debug_assert!(buffer.is_intact(), "transfer slot {} overran its buffer", index);

        let mut samples = compact_packets(buffer.samples(), slot.packets());
        if self.session.channels == 2 {
            samples = merge_stereo_in_place(buffer.samples(), samples);
        }
        if samples == 0 {
            return;
        }

        if self.host_connected {
            let run = SampleRun::new(Arc::clone(&buffer), samples, self.sequence);
            match self.sender.try_send(run) {
                Ok(()) => self.samples_delivered += samples as u64,
                Err(TrySendError::Full(_)) => {
                    self.notifications_dropped += 1;
                    log::warn!("Host is not keeping up, dropped run {}", self.sequence);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("Sample receiver closed, stopping capture");
                    self.host_connected = false;
                    self.control.cancel();
                }
            }
        }
        self.sequence += 1;

        buffer.snapshot_into(samples, &mut self.scratch);
        self.control.forward(&self.scratch);
    }
}
