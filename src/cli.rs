use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use batscope::transform::WindowFunction;

use crate::config::ColourMapKind;

#[derive(Parser, Debug)]
#[command(name = "batscope", about = "Ultrasonic USB capture, heterodyne monitor and spectrogram renderer")]
pub struct Cli {
    /// Config file (defaults to batscope.toml or ~/.config/batscope/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture from a USB microphone, optionally monitoring and recording
    Capture(CaptureArgs),
    /// Render a recording as a spectrogram PNG
    Spectrogram(SpectrogramArgs),
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// usbdevfs node, e.g. /dev/bus/usb/001/004
    pub device: PathBuf,

    /// Isochronous endpoint address (decimal or 0x..)
    #[arg(long, default_value = "0x01", value_parser = parse_endpoint)]
    pub endpoint: u8,

    /// Audio streaming interface to claim
    #[arg(long, default_value_t = 1)]
    pub interface: u32,

    /// Alternate setting that enables the streaming endpoint
    #[arg(long, default_value_t = 1)]
    pub altsetting: u32,

    /// Interleaved channels sent by the device (1 or 2)
    #[arg(long, default_value_t = 1)]
    pub channels: u16,

    /// Device sample rate in Hz
    #[arg(long, default_value_t = 384_000)]
    pub rate: u32,

    /// Endpoint max packet size in bytes
    #[arg(long, default_value_t = 770)]
    pub packet_size: u32,

    /// Play the heterodyned signal
    #[arg(long)]
    pub monitor: bool,

    /// Output device name for the monitor (default device if omitted)
    #[arg(long)]
    pub output_device: Option<String>,

    /// First heterodyne reference in kHz
    #[arg(long, default_value_t = 40)]
    pub tone1: u32,

    /// Second heterodyne reference in kHz (0 = off)
    #[arg(long, default_value_t = 0)]
    pub tone2: u32,

    /// Monitor gain as a left shift (0-15)
    #[arg(long, default_value_t = 0)]
    pub boost: u32,

    /// Write the merged capture to a WAV file
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Stop after this many seconds (otherwise on Enter)
    #[arg(long)]
    pub seconds: Option<f32>,
}

#[derive(Args, Debug)]
pub struct SpectrogramArgs {
    /// Recording to analyse (WAV or FLAC)
    pub input: PathBuf,

    /// Output image
    #[arg(short, long, default_value = "spectrogram.png")]
    pub output: PathBuf,

    /// FFT window size in samples (even)
    #[arg(long, default_value_t = 512)]
    pub window_size: usize,

    /// Samples between window starts
    #[arg(long, default_value_t = 256)]
    pub stride: usize,

    /// Window function
    #[arg(long, value_enum, default_value_t = WindowFunction::Hann)]
    pub window: WindowFunction,

    /// dB written for buckets with no energy
    #[arg(long, default_value_t = -120.0, allow_negative_numbers = true)]
    pub floor_db: f32,

    /// Lower edge of the trigger band in Hz
    #[arg(long)]
    pub trigger_min_hz: Option<f32>,

    /// Upper edge of the trigger band in Hz
    #[arg(long)]
    pub trigger_max_hz: Option<f32>,

    /// Trigger level in dB
    #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
    pub threshold_db: f32,

    /// Colour map
    #[arg(long, value_enum, default_value_t = ColourMapKind::Heat)]
    pub colour_map: ColourMapKind,

    /// Fixed lower dB limit (auto-calibrated if omitted)
    #[arg(long, allow_negative_numbers = true)]
    pub db_min: Option<f32>,

    /// Fixed upper dB limit (auto-calibrated if omitted)
    #[arg(long, allow_negative_numbers = true)]
    pub db_max: Option<f32>,

    /// Height of the amplitude strip in pixels
    #[arg(long, default_value_t = 64)]
    pub amplitude_height: usize,
}

fn parse_endpoint(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid endpoint address '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_accepts_hex_and_decimal() {
        assert_eq!(parse_endpoint("0x81"), Ok(0x81));
        assert_eq!(parse_endpoint("3"), Ok(3));
        assert!(parse_endpoint("0x1ff").is_err());
    }

    #[test]
    fn capture_defaults() {
        let cli = Cli::parse_from(["batscope", "capture", "/dev/bus/usb/001/004"]);
        let Command::Capture(args) = cli.command else {
            panic!("expected capture");
        };
        assert_eq!(args.endpoint, 1);
        assert_eq!(args.rate, 384_000);
        assert!(!args.monitor);
    }

    #[test]
    fn spectrogram_takes_negative_levels() {
        let cli = Cli::parse_from([
            "batscope",
            "spectrogram",
            "call.wav",
            "--floor-db",
            "-90",
            "--window",
            "hamming",
        ]);
        let Command::Spectrogram(args) = cli.command else {
            panic!("expected spectrogram");
        };
        assert_eq!(args.floor_db, -90.0);
        assert_eq!(args.window, WindowFunction::Hamming);
    }
}
