use serde::Deserialize;
use std::path::PathBuf;

use batscope::render::ColourMap;
use batscope::transform::WindowFunction;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: u8,
    #[serde(default = "default_interface")]
    pub interface: u32,
    #[serde(default = "default_altsetting")]
    pub altsetting: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_packet_size")]
    pub max_packet_size: u32,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_tone1")]
    pub tone1_khz: u32,
    #[serde(default)]
    pub tone2_khz: u32,
    #[serde(default)]
    pub boost: u32,
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
}

#[derive(Debug, Deserialize)]
pub struct TransformConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
    #[serde(default = "default_chunk_windows")]
    pub chunk_windows: usize,
    #[serde(default)]
    pub trigger_min_hz: Option<f32>,
    #[serde(default)]
    pub trigger_max_hz: Option<f32>,
    #[serde(default = "default_threshold_db")]
    pub trigger_threshold_db: f32,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub colour_map: ColourMapKind,
    #[serde(default = "default_levels")]
    pub levels: usize,
    #[serde(default = "default_amplitude_height")]
    pub amplitude_height: usize,
    #[serde(default = "default_graph_colour")]
    pub graph_colour: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColourMapKind {
    #[default]
    Heat,
    Gray,
}

impl ColourMapKind {
    pub fn build(self, levels: usize) -> ColourMap {
        match self {
            ColourMapKind::Heat => ColourMap::heat(levels),
            ColourMapKind::Gray => ColourMap::grayscale(levels),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            interface: default_interface(),
            altsetting: default_altsetting(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            max_packet_size: default_packet_size(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: None,
            tone1_khz: default_tone1(),
            tone2_khz: 0,
            boost: 0,
            buffer_frames: default_buffer_frames(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            stride: default_stride(),
            window: WindowFunction::default(),
            floor_db: default_floor_db(),
            chunk_windows: default_chunk_windows(),
            trigger_min_hz: None,
            trigger_max_hz: None,
            trigger_threshold_db: default_threshold_db(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            colour_map: ColourMapKind::default(),
            levels: default_levels(),
            amplitude_height: default_amplitude_height(),
            graph_colour: default_graph_colour(),
        }
    }
}

fn default_endpoint() -> u8 { 0x01 }
fn default_interface() -> u32 { 1 }
fn default_altsetting() -> u32 { 1 }
fn default_channels() -> u16 { 1 }
fn default_sample_rate() -> u32 { 384_000 }
fn default_packet_size() -> u32 { 770 }
fn default_queue_depth() -> usize { 64 }
fn default_tone1() -> u32 { 40 }
fn default_buffer_frames() -> usize { 4800 }
fn default_window_size() -> usize { 512 }
fn default_stride() -> usize { 256 }
fn default_floor_db() -> f32 { -120.0 }
fn default_chunk_windows() -> usize { 64 }
fn default_threshold_db() -> f32 { 60.0 }
fn default_levels() -> usize { 256 }
fn default_amplitude_height() -> usize { 64 }
fn default_graph_colour() -> u16 { 0x07E0 }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// `batscope.toml` in the working directory, then the per-user config.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("batscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("batscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("batscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.capture.sample_rate, 384_000);
        assert_eq!(cfg.transform.window, WindowFunction::Hann);
        assert_eq!(cfg.render.colour_map, ColourMapKind::Heat);
        assert!(!cfg.monitor.enabled);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [capture]
            channels = 2
            sample_rate = 250000

            [monitor]
            enabled = true
            tone1_khz = 45
            device = "USB Audio"

            [transform]
            window = "blackman"
            trigger_min_hz = 20000.0

            [render]
            colour_map = "gray"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.capture.channels, 2);
        assert_eq!(cfg.capture.sample_rate, 250_000);
        assert_eq!(cfg.capture.max_packet_size, 770);
        assert!(cfg.monitor.enabled);
        assert_eq!(cfg.monitor.tone1_khz, 45);
        assert_eq!(cfg.monitor.device.as_deref(), Some("USB Audio"));
        assert_eq!(cfg.transform.window, WindowFunction::Blackman);
        assert_eq!(cfg.transform.trigger_min_hz, Some(20_000.0));
        assert_eq!(cfg.render.colour_map, ColourMapKind::Gray);
    }
}
