pub mod ffmpeg;

pub use ffmpeg::{write_png, FfmpegImageWriter};
