pub mod analysis;
pub mod decode;

pub use analysis::{analyse, Spectrogram, SpectrogramSettings, TriggerBand};
pub use decode::{decode_recording, Recording};
