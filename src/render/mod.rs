//! RGB565 rendering of amplitude envelopes and dB spectrograms.

mod amplitude;
mod colour_map;
mod surface;

pub use amplitude::{render_amplitude, AMPLITUDE_MAX, AMPLITUDE_MIN};
pub use colour_map::{query_db_range, render_colour_map, Calibration, ColourMap};
pub use surface::{rgb565, PixelSurface, BLACK};
