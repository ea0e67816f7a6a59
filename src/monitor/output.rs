use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};

use crate::error::MonitorError;

/// Destination for decimated monitor audio.
pub trait AudioSink: Send {
    /// Blocks for at most `timeout` and returns how many samples were
    /// accepted. A short count is not an error.
    fn write(&mut self, samples: &[i16], timeout: Duration) -> Result<usize, MonitorError>;

    fn sample_rate(&self) -> u32;
}

/// Monitor output on a cpal device.
///
/// The stream lives on its own thread since cpal streams are not `Send` on
/// every host. Samples reach the callback through a bounded channel; the
/// callback plays silence when it runs dry.
pub struct CpalSink {
    samples: Sender<i16>,
    stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Opens `device_name` (or the default output) at `sample_rate`, mono,
    /// with room for `buffer_frames` queued samples. Half the queue is primed
    /// with silence so playback starts straight away.
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        buffer_frames: usize,
    ) -> Result<Self, MonitorError> {
        let capacity = buffer_frames.max(2);
        let (sample_tx, sample_rx) = bounded::<i16>(capacity);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<String, MonitorError>>(1);

        let device_name = device_name.map(str::to_owned);
        let worker = std::thread::Builder::new()
            .name("monitor-output".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), sample_rate, sample_rx) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| MonitorError::Output(format!("failed to spawn output thread: {e}")))?;

        let name = ready_rx
            .recv()
            .map_err(|_| MonitorError::Output("output thread exited during setup".into()))??;

        for _ in 0..capacity / 2 {
            if sample_tx.try_send(0).is_err() {
                break;
            }
        }

        log::info!(
            "Monitor output on '{}' @ {} Hz, {} frame buffer",
            name,
            sample_rate,
            capacity
        );

        Ok(Self {
            samples: sample_tx,
            stop: stop_tx,
            worker: Some(worker),
            sample_rate,
        })
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, samples: &[i16], timeout: Duration) -> Result<usize, MonitorError> {
        let deadline = Instant::now() + timeout;
        for (written, &sample) in samples.iter().enumerate() {
            match self.samples.send_deadline(sample, deadline) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => return Ok(written),
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(MonitorError::Output("output stream closed".into()))
                }
            }
        }
        Ok(samples.len())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    samples: Receiver<i16>,
) -> Result<(Stream, String), MonitorError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| MonitorError::Output(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| MonitorError::Output(format!("output device '{wanted}' not found")))?,
        None => host
            .default_output_device()
            .ok_or_else(|| MonitorError::Output("no default output device".into()))?,
    };
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let (config, format) = select_config(&device, sample_rate)?;
    let channels = config.channels as usize;
    let err_fn = |err: cpal::StreamError| log::warn!("Monitor output stream error: {}", err);

    let stream = match format {
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| fill(data, channels, &samples, |s| s),
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                fill(data, channels, &samples, |s| s as f32 / i16::MAX as f32)
            },
            err_fn,
            None,
        ),
        other => {
            return Err(MonitorError::Output(format!(
                "unsupported output sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| MonitorError::Output(e.to_string()))?;

    stream
        .play()
        .map_err(|e| MonitorError::Output(format!("failed to start output stream: {e}")))?;
    Ok((stream, name))
}

fn select_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat), MonitorError> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| MonitorError::Output(e.to_string()))?
        .collect();

    for wanted in [SampleFormat::I16, SampleFormat::F32] {
        let found = ranges.iter().find(|range| {
            range.sample_format() == wanted
                && range.min_sample_rate().0 <= sample_rate
                && range.max_sample_rate().0 >= sample_rate
        });
        if let Some(range) = found {
            let config = range.clone().with_sample_rate(SampleRate(sample_rate)).config();
            return Ok((config, wanted));
        }
    }

    Err(MonitorError::Output(format!(
        "device does not support {} Hz output",
        sample_rate
    )))
}

fn fill<T: Copy>(data: &mut [T], channels: usize, samples: &Receiver<i16>, convert: impl Fn(i16) -> T) {
    for frame in data.chunks_mut(channels.max(1)) {
        let value = convert(samples.try_recv().unwrap_or(0));
        for out in frame.iter_mut() {
            *out = value;
        }
    }
}

/// Sink that keeps everything written to it, with an optional cap to mimic a
/// full device buffer.
#[derive(Clone, Default)]
pub struct CollectingSink {
    samples: Arc<Mutex<Vec<i16>>>,
    capacity: Option<usize>,
    sample_rate: u32,
}

impl CollectingSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Arc::default(),
            capacity: None,
            sample_rate,
        }
    }

    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(sample_rate)
        }
    }

    /// Handle that observes the same sample store.
    pub fn collected(&self) -> Arc<Mutex<Vec<i16>>> {
        Arc::clone(&self.samples)
    }
}

impl AudioSink for CollectingSink {
    fn write(&mut self, samples: &[i16], _timeout: Duration) -> Result<usize, MonitorError> {
        let mut store = self
            .samples
            .lock()
            .map_err(|_| MonitorError::Output("sample store poisoned".into()))?;
        let room = match self.capacity {
            Some(cap) => cap.saturating_sub(store.len()),
            None => samples.len(),
        };
        let accepted = room.min(samples.len());
        store.extend_from_slice(&samples[..accepted]);
        Ok(accepted)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_reports_short_writes() {
        let mut sink = CollectingSink::with_capacity(48_000, 5);
        let store = sink.collected();
        assert_eq!(sink.write(&[1, 2, 3], Duration::ZERO).unwrap(), 3);
        assert_eq!(sink.write(&[4, 5, 6], Duration::ZERO).unwrap(), 2);
        assert_eq!(*store.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn fill_duplicates_mono_and_pads_with_silence() {
        let (tx, rx) = bounded::<i16>(4);
        tx.send(7).unwrap();
        tx.send(-3).unwrap();
        let mut data = [99i16; 6];
        fill(&mut data, 2, &rx, |s| s);
        assert_eq!(data, [7, 7, -3, -3, 0, 0]);
    }
}
