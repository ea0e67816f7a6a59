//! Ultrasonic capture from USB Audio Class microphones, a heterodyne
//! monitor path, and spectrogram rendering into RGB565 surfaces.

pub mod audio;
pub mod capture;
pub mod encode;
pub mod error;
pub mod guard;
pub mod monitor;
pub mod render;
pub mod transform;
pub mod usb;
