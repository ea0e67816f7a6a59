mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use batscope::audio::{analyse, decode_recording, SpectrogramSettings, TriggerBand};
use batscope::capture::{start_capture, CaptureControl, SampleRun};
use batscope::encode::write_png;
use batscope::monitor::CpalSink;
use batscope::render::Calibration;
use batscope::usb::UsbdevfsEndpoint;

use cli::{CaptureArgs, Cli, Command, SpectrogramArgs};
use config::Config;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Explicit --config path, or auto-detect batscope.toml / global config
    let config_path = cli.config.clone().or_else(config::find_config);
    let cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match &mut cli.command {
        Command::Capture(args) => {
            merge_capture(args, &cfg);
            run_capture(args, &cfg)
        }
        Command::Spectrogram(args) => {
            merge_spectrogram(args, &cfg);
            run_spectrogram(args, &cfg)
        }
    }
}

// Config values apply only when the CLI is at its default.
fn merge_capture(args: &mut CaptureArgs, cfg: &Config) {
    if args.endpoint == 0x01 { args.endpoint = cfg.capture.endpoint; }
    if args.interface == 1 { args.interface = cfg.capture.interface; }
    if args.altsetting == 1 { args.altsetting = cfg.capture.altsetting; }
    if args.channels == 1 { args.channels = cfg.capture.channels; }
    if args.rate == 384_000 { args.rate = cfg.capture.sample_rate; }
    if args.packet_size == 770 { args.packet_size = cfg.capture.max_packet_size; }
    if !args.monitor { args.monitor = cfg.monitor.enabled; }
    if args.output_device.is_none() { args.output_device = cfg.monitor.device.clone(); }
    if args.tone1 == 40 { args.tone1 = cfg.monitor.tone1_khz; }
    if args.tone2 == 0 { args.tone2 = cfg.monitor.tone2_khz; }
    if args.boost == 0 { args.boost = cfg.monitor.boost; }
}

fn merge_spectrogram(args: &mut SpectrogramArgs, cfg: &Config) {
    let t = &cfg.transform;
    if args.window_size == 512 { args.window_size = t.window_size; }
    if args.stride == 256 { args.stride = t.stride; }
    if args.window == Default::default() { args.window = t.window; }
    if args.floor_db == -120.0 { args.floor_db = t.floor_db; }
    if args.trigger_min_hz.is_none() { args.trigger_min_hz = t.trigger_min_hz; }
    if args.trigger_max_hz.is_none() { args.trigger_max_hz = t.trigger_max_hz; }
    if args.threshold_db == 60.0 { args.threshold_db = t.trigger_threshold_db; }
    if args.colour_map == Default::default() { args.colour_map = cfg.render.colour_map; }
    if args.amplitude_height == 64 { args.amplitude_height = cfg.render.amplitude_height; }
}

fn run_capture(args: &CaptureArgs, cfg: &Config) -> Result<()> {
    log::info!("batscope capture");
    log::info!("Device: {}", args.device.display());
    log::info!(
        "Endpoint 0x{:02x}, interface {} alt {}, {} ch @ {} Hz, {} byte packets",
        args.endpoint,
        args.interface,
        args.altsetting,
        args.channels,
        args.rate,
        args.packet_size
    );

    let mut endpoint = UsbdevfsEndpoint::open(&args.device)
        .with_context(|| format!("Failed to open {}", args.device.display()))?;
    endpoint
        .claim_interface(args.interface)
        .with_context(|| format!("Failed to claim interface {}", args.interface))?;
    endpoint
        .set_interface(args.interface, args.altsetting)
        .with_context(|| format!("Failed to select alt setting {}", args.altsetting))?;

    let control = Arc::new(CaptureControl::new());
    let (tx, rx) = crossbeam_channel::bounded::<SampleRun>(cfg.capture.queue_depth.max(1));

    let worker = {
        let control = Arc::clone(&control);
        let (address, channels, rate, packet) =
            (args.endpoint, args.channels, args.rate, args.packet_size);
        std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || start_capture(&mut endpoint, &control, address, channels, rate, packet, tx))
            .context("Failed to spawn capture thread")?
    };

    while !control.is_running() && !worker.is_finished() {
        std::thread::sleep(Duration::from_millis(1));
    }

    if let Some(session) = control.session() {
        if let Some(path) = &args.record {
            if let Err(e) = control.start_recording(path) {
                log::error!("Recording to {} not started: {}", path.display(), e);
            }
        }
        if args.monitor {
            match CpalSink::open(
                args.output_device.as_deref(),
                session.output_rate,
                cfg.monitor.buffer_frames,
            ) {
                Ok(sink) => {
                    if let Err(e) =
                        control.start_monitor(Box::new(sink), args.tone1, args.tone2, args.boost)
                    {
                        log::error!("Monitor not started: {}", e);
                    }
                }
                Err(e) => log::error!("Failed to open monitor output: {}", e),
            }
        }
    }

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs_f32(s.max(0.0)));
    if deadline.is_none() {
        log::info!("Capturing; press Enter to stop");
        let control = Arc::clone(&control);
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            control.cancel();
        });
    }

    // One second of history, refreshed as runs arrive.
    let mut ring = vec![0i16; args.rate as usize];
    let mut offset = 0usize;
    let mut peak = 0i16;
    let mut last_report = Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(run) => {
                let copied = run.copy_into_ring(run.len(), &mut ring, offset);
                for i in 0..copied {
                    let v = ring[(offset + i) % ring.len()].saturating_abs();
                    peak = peak.max(v);
                }
                offset = (offset + copied) % ring.len().max(1);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            let dbfs = 20.0 * (peak.max(1) as f32 / i16::MAX as f32).log10();
            log::info!("Peak {:.1} dBFS", dbfs);
            peak = 0;
            last_report = Instant::now();
        }
        if deadline.is_some_and(|d| Instant::now() >= d) && !control.is_cancelled() {
            log::info!("Capture time elapsed");
            control.cancel();
        }
    }

    let summary = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Capture thread panicked"))??;
    log::info!(
        "Done: {} transfers, {} samples ({:.2}s), {} dropped notifications",
        summary.transfers_reaped,
        summary.samples_delivered,
        summary.samples_delivered as f64 / summary.session.sample_rate as f64,
        summary.notifications_dropped
    );
    Ok(())
}

fn run_spectrogram(args: &SpectrogramArgs, cfg: &Config) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    log::info!("batscope spectrogram");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", args.output.display());

    log::info!("Decoding recording...");
    let recording = decode_recording(&args.input)?;

    let trigger = match (args.trigger_min_hz, args.trigger_max_hz) {
        (Some(min_hz), Some(max_hz)) => Some(TriggerBand {
            min_hz,
            max_hz,
            threshold_db: args.threshold_db,
        }),
        (None, None) => None,
        _ => anyhow::bail!("--trigger-min-hz and --trigger-max-hz go together"),
    };

    let settings = SpectrogramSettings {
        window_size: args.window_size,
        stride: args.stride,
        window: args.window,
        floor_db: args.floor_db,
        chunk_windows: cfg.transform.chunk_windows,
        trigger,
    };

    let map = args
        .colour_map
        .build(cfg.render.levels)
        .with_graph_colour(cfg.render.graph_colour);
    let spectrogram = analyse(&recording, &settings, args.amplitude_height, map.graph_colour())?;

    let (lo, hi) = match (args.db_min, args.db_max) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            let range = spectrogram.db_range().unwrap_or((args.floor_db, 0.0));
            log::info!("Auto calibration: {:.1} dB .. {:.1} dB", range.0, range.1);
            (args.db_min.unwrap_or(range.0), args.db_max.unwrap_or(range.1))
        }
    };
    let calibration = Calibration::from_range(lo, hi, map.len());

    let canvas = spectrogram.render(&map, calibration)?;
    write_png(&args.output, &canvas)?;

    if trigger.is_some() {
        if spectrogram.triggers.is_empty() {
            log::info!("No triggers");
        } else {
            log::info!("{} triggered chunks", spectrogram.triggers.len());
            for at in &spectrogram.triggers {
                println!("{:.3}", at);
            }
        }
    }

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}
