use std::path::{Path, PathBuf};

use opencv::core::Size;
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use tracing::{info, warn};

use crate::error::{PlateError, Result};

/// Destination for annotated frames.
pub trait VideoSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;

    /// Flushes and closes the output. Further writes are errors.
    fn finish(&mut self) -> Result<()>;
}

/// XVID/AVI encoder at the source frame rate and resolution.
pub struct AviWriter {
    writer: VideoWriter,
    path: PathBuf,
    frames: u64,
    released: bool,
}

impl AviWriter {
    pub fn create(path: &Path, fps: f64, frame_size: Size) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| PlateError::EncoderOpen(path.to_path_buf()))?;

        let writer = VideoWriter::new(
            path_str,
            VideoWriter::fourcc('X', 'V', 'I', 'D')?,
            fps,
            frame_size,
            true,
        )?;
        if !writer.is_opened()? {
            return Err(PlateError::EncoderOpen(path.to_path_buf()));
        }

        info!(
            path = %path.display(),
            fps,
            width = frame_size.width,
            height = frame_size.height,
            "opened video encoder"
        );

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            frames: 0,
            released: false,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl VideoSink for AviWriter {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        if self.released {
            return Err(PlateError::EncoderOpen(self.path.clone()));
        }
        self.writer.write(frame)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.writer.release()?;
            info!(path = %self.path.display(), frames = self.frames, "video written");
        }
        Ok(())
    }
}

impl Drop for AviWriter {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.writer.release() {
                warn!(path = %self.path.display(), error = %err, "failed to release video encoder");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    #[ignore = "needs an OpenCV build with an XVID encoder"]
    fn writes_frames_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = AviWriter::create(&path, 25.0, Size::new(64, 48)).unwrap();
        let frame =
            Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(128.0)).unwrap();
        writer.write(&frame).unwrap();
        writer.write(&frame).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.frames(), 2);
        assert!(writer.write(&frame).is_err());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
