use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::render::PixelSurface;

/// Pipes raw RGB565 frames into ffmpeg, which writes them out as images.
pub struct FfmpegImageWriter {
    child: Child,
    frame_bytes: usize,
}

impl FfmpegImageWriter {
    /// One image per frame; a single frame to a `.png` path gives one PNG.
    pub fn new(output_path: &Path, width: usize, height: usize) -> Result<Self> {
        let output = output_path
            .to_str()
            .context("Output path is not valid UTF-8")?
            .to_string();
        let args = vec![
            "-y".to_string(),
            "-loglevel".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            // Native-endian, matching the in-memory surface.
            "-pixel_format".into(), "rgb565".into(),
            "-video_size".into(), format!("{}x{}", width, height),
            "-i".into(), "pipe:0".into(),
            "-frames:v".into(), "1".into(),
            "-update".into(), "1".into(),
            output,
        ];

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!("FFmpeg image writer started: {}x{} -> {}", width, height, output_path.display());

        Ok(Self {
            child,
            frame_bytes: width * height * 2,
        })
    }

    pub fn write_surface(&mut self, surface: &PixelSurface) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        if surface.stride() == surface.width() {
            let bytes = surface.as_bytes();
            anyhow::ensure!(
                bytes.len() == self.frame_bytes,
                "Surface is {} bytes, writer expects {}",
                bytes.len(),
                self.frame_bytes
            );
            stdin.write_all(bytes).context("Failed to write frame to ffmpeg")?;
        } else {
            // Strip stride padding row by row.
            let row_bytes = surface.width() * 2;
            let stride_bytes = surface.stride() * 2;
            for row in surface.as_bytes().chunks(stride_bytes) {
                stdin
                    .write_all(&row[..row_bytes])
                    .context("Failed to write frame to ffmpeg")?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg image written");
        Ok(())
    }
}

/// Writes one surface to `path` through ffmpeg.
pub fn write_png(path: &Path, surface: &PixelSurface) -> Result<()> {
    let mut writer = FfmpegImageWriter::new(path, surface.width(), surface.height())?;
    writer.write_surface(surface)?;
    writer.finish()
}
