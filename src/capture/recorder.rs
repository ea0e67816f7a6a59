use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Mono 16-bit WAV of the merged capture at the full input rate.
pub struct Recorder {
    writer: hound::WavWriter<BufWriter<File>>,
    path: PathBuf,
    samples: u64,
}

impl Recorder {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(hound::Error::from)?;
        Self::from_file(file, path, sample_rate)
    }

    /// Takes ownership of an already open file; `label` is only used in logs.
    pub fn from_file(
        file: File,
        label: impl AsRef<Path>,
        sample_rate: u32,
    ) -> Result<Self, CaptureError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = label.as_ref().to_path_buf();
        let writer = hound::WavWriter::new(BufWriter::new(file), spec)?;
        log::info!("Recording to {} @ {} Hz", path.display(), sample_rate);
        Ok(Self {
            writer,
            path,
            samples: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    pub fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        for &s in samples {
            self.writer.write_sample(s)?;
        }
        self.samples += samples.len() as u64;
        Ok(())
    }

    /// Writes the header sizes and closes the file.
    pub fn finish(self) -> Result<u64, CaptureError> {
        self.writer.finalize()?;
        log::info!(
            "Recording closed: {} ({} samples)",
            self.path.display(),
            self.samples
        );
        Ok(self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("batscope-{}-{}.wav", name, std::process::id()))
    }

    #[test]
    fn writes_a_readable_mono_wav() {
        let path = temp_path("recorder");
        let mut recorder = Recorder::create(&path, 384_000).unwrap();
        recorder.write(&[1, -2, 3]).unwrap();
        recorder.write(&[i16::MAX, i16::MIN]).unwrap();
        assert_eq!(recorder.finish().unwrap(), 5);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 384_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 3, i16::MAX, i16::MIN]);
        std::fs::remove_file(&path).ok();
    }
}
