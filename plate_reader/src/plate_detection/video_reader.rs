use std::path::{Path, PathBuf};

use opencv::core::Size;
use opencv::core::StsError;
use opencv::imgcodecs::imread;
use opencv::imgcodecs::IMREAD_COLOR;
use opencv::prelude::*;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use opencv::videoio::CAP_PROP_FPS;
use opencv::videoio::CAP_PROP_FRAME_COUNT;
use opencv::videoio::CAP_PROP_FRAME_HEIGHT;
use opencv::videoio::CAP_PROP_FRAME_WIDTH;
use opencv::videoio::CAP_PROP_POS_FRAMES;
use tracing::{debug, info, warn};

use crate::error::{PlateError, Result};

/// Result of asking a source for its next frame.
pub enum FrameRead {
    Frame(Mat),
    /// This frame is lost but the stream may continue.
    Failed(PlateError),
    EndOfStream,
}

/// Sequential frame provider driving the video loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> FrameRead;

    /// Frames per second reported by the source; may be 0 when unknown.
    fn fps(&self) -> f64;

    fn frame_size(&self) -> Size;
}

/// Decoder operations [`VideoReader`] relies on. Implemented for OpenCV's
/// `VideoCapture`.
pub trait FrameCapture {
    /// Decodes the next frame into `frame`. `Ok(false)` means no frame came
    /// out, which is either the end of the stream or a frame that failed to
    /// decode.
    fn read_frame(&mut self, frame: &mut Mat) -> opencv::Result<bool>;

    fn property(&self, property: i32) -> opencv::Result<f64>;

    fn release_capture(&mut self) -> opencv::Result<()>;
}

impl FrameCapture for VideoCapture {
    fn read_frame(&mut self, frame: &mut Mat) -> opencv::Result<bool> {
        self.read(frame)
    }

    fn property(&self, property: i32) -> opencv::Result<f64> {
        self.get(property)
    }

    fn release_capture(&mut self) -> opencv::Result<()> {
        self.release()
    }
}

/// Decodes a video frame by frame. The capture is released on drop.
///
/// An empty read in the middle of a stream with a known frame count is
/// reported as a failed frame, and the reader moves on to the next one. An
/// empty read is only the end of the stream when the count says so, when no
/// count is known, or when nothing follows.
pub struct VideoReader<C: FrameCapture = VideoCapture> {
    capture: C,
    path: PathBuf,
    fps: f64,
    frame_size: Size,
    frames_read: u64,
    pending: Option<Mat>,
}

impl VideoReader<VideoCapture> {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| PlateError::InputOpen(path.to_path_buf()))?;

        let capture = VideoCapture::from_file(path_str, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(PlateError::InputOpen(path.to_path_buf()));
        }

        Self::from_capture(capture, path)
    }
}

impl<C: FrameCapture> VideoReader<C> {
    pub fn from_capture(capture: C, path: &Path) -> Result<Self> {
        let fps = capture.property(CAP_PROP_FPS)?;
        let frame_size = Size::new(
            capture.property(CAP_PROP_FRAME_WIDTH)? as i32,
            capture.property(CAP_PROP_FRAME_HEIGHT)? as i32,
        );

        info!(
            path = %path.display(),
            fps,
            width = frame_size.width,
            height = frame_size.height,
            "opened video"
        );

        Ok(Self {
            capture,
            path: path.to_path_buf(),
            fps,
            frame_size,
            frames_read: 0,
            pending: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the container reports a frame count and the decoder has
    /// not reached it yet.
    fn frames_remaining(&self) -> bool {
        let count = self.capture.property(CAP_PROP_FRAME_COUNT).unwrap_or(0.0);
        if !(count > 0.0) {
            return false;
        }
        match self.capture.property(CAP_PROP_POS_FRAMES) {
            Ok(position) => position < count,
            Err(_) => false,
        }
    }

    fn after_empty_read(&mut self, index: u64) -> FrameRead {
        if !self.frames_remaining() {
            return FrameRead::EndOfStream;
        }

        // The container count is only an estimate for some formats, so a
        // second empty read settles it.
        let mut next = Mat::default();
        match self.capture.read_frame(&mut next) {
            Ok(true) if !next.empty() => {
                debug!(frame = index, "decoder recovered after a bad frame");
                self.pending = Some(next);
                FrameRead::Failed(PlateError::FrameDecode {
                    index,
                    source: opencv::Error::new(StsError, "decoder returned no frame".to_string()),
                })
            }
            Ok(_) => FrameRead::EndOfStream,
            Err(source) => FrameRead::Failed(PlateError::FrameDecode { index, source }),
        }
    }
}

impl<C: FrameCapture> FrameSource for VideoReader<C> {
    fn next_frame(&mut self) -> FrameRead {
        let index = self.frames_read;
        self.frames_read += 1;

        if let Some(frame) = self.pending.take() {
            return FrameRead::Frame(frame);
        }

        let mut image = Mat::default();
        match self.capture.read_frame(&mut image) {
            Ok(true) if !image.empty() => FrameRead::Frame(image),
            Ok(_) => self.after_empty_read(index),
            Err(source) => FrameRead::Failed(PlateError::FrameDecode { index, source }),
        }
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }
}

impl<C: FrameCapture> Drop for VideoReader<C> {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release_capture() {
            warn!(path = %self.path.display(), error = %err, "failed to release video capture");
        }
    }
}

/// Loads a still image as a BGR frame.
pub fn read_image(path: &Path) -> Result<Mat> {
    let path_str = path
        .to_str()
        .ok_or_else(|| PlateError::InputOpen(path.to_path_buf()))?;

    let image = imread(path_str, IMREAD_COLOR)?;
    if image.empty() {
        return Err(PlateError::InputOpen(path.to_path_buf()));
    }

    info!(path = %path.display(), width = image.cols(), height = image.rows(), "loaded image");
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use opencv::core::{Scalar, Vec3b, Vector, CV_8UC3};
    use opencv::imgcodecs::imwrite;

    enum Packet {
        Good(f64),
        Corrupt,
        Broken,
    }

    /// Decoder that plays back packets and advances its position on every
    /// packet it consumes, good or bad.
    struct ScriptedCapture {
        packets: VecDeque<Packet>,
        position: f64,
        frame_count: f64,
        released: Rc<Cell<bool>>,
    }

    impl ScriptedCapture {
        fn new(packets: Vec<Packet>, frame_count: f64) -> Self {
            Self {
                packets: packets.into(),
                position: 0.0,
                frame_count,
                released: Rc::new(Cell::new(false)),
            }
        }
    }

    impl FrameCapture for ScriptedCapture {
        fn read_frame(&mut self, frame: &mut Mat) -> opencv::Result<bool> {
            let Some(packet) = self.packets.pop_front() else {
                return Ok(false);
            };
            self.position += 1.0;
            match packet {
                Packet::Good(value) => {
                    *frame = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(value))?;
                    Ok(true)
                }
                Packet::Corrupt => Ok(false),
                Packet::Broken => Err(opencv::Error::new(StsError, "demuxer error".to_string())),
            }
        }

        fn property(&self, property: i32) -> opencv::Result<f64> {
            Ok(match property {
                CAP_PROP_FPS => 25.0,
                CAP_PROP_FRAME_WIDTH | CAP_PROP_FRAME_HEIGHT => 4.0,
                CAP_PROP_FRAME_COUNT => self.frame_count,
                CAP_PROP_POS_FRAMES => self.position,
                _ => 0.0,
            })
        }

        fn release_capture(&mut self) -> opencv::Result<()> {
            self.released.set(true);
            Ok(())
        }
    }

    fn reader(packets: Vec<Packet>, frame_count: f64) -> VideoReader<ScriptedCapture> {
        VideoReader::from_capture(ScriptedCapture::new(packets, frame_count), Path::new("clip.avi"))
            .unwrap()
    }

    /// `Some(value)` for a frame, `None` for a failed one, stopping at the end.
    fn drain(reader: &mut VideoReader<ScriptedCapture>) -> Vec<Option<f64>> {
        let mut seen = Vec::new();
        loop {
            match reader.next_frame() {
                FrameRead::Frame(frame) => {
                    seen.push(Some(f64::from(frame.at_2d::<Vec3b>(0, 0).unwrap().0[0])))
                }
                FrameRead::Failed(_) => seen.push(None),
                FrameRead::EndOfStream => return seen,
            }
        }
    }

    #[test]
    fn corrupt_frame_mid_stream_is_a_failure_not_the_end() {
        let mut reader = reader(
            vec![
                Packet::Good(10.0),
                Packet::Corrupt,
                Packet::Good(30.0),
                Packet::Good(40.0),
            ],
            4.0,
        );

        assert_eq!(drain(&mut reader), [Some(10.0), None, Some(30.0), Some(40.0)]);
    }

    #[test]
    fn failed_frame_reports_its_index() {
        let mut reader = reader(vec![Packet::Good(10.0), Packet::Corrupt, Packet::Good(30.0)], 3.0);

        assert!(matches!(reader.next_frame(), FrameRead::Frame(_)));
        assert!(matches!(
            reader.next_frame(),
            FrameRead::Failed(PlateError::FrameDecode { index: 1, .. })
        ));
        assert!(matches!(reader.next_frame(), FrameRead::Frame(_)));
        assert!(matches!(reader.next_frame(), FrameRead::EndOfStream));
    }

    #[test]
    fn empty_read_without_frame_count_ends_the_stream() {
        let mut reader = reader(vec![Packet::Good(10.0), Packet::Corrupt, Packet::Good(30.0)], 0.0);

        assert_eq!(drain(&mut reader), [Some(10.0)]);
    }

    #[test]
    fn overestimated_frame_count_still_ends_cleanly() {
        let mut reader = reader(vec![Packet::Good(10.0), Packet::Good(20.0)], 10.0);

        assert_eq!(drain(&mut reader), [Some(10.0), Some(20.0)]);
    }

    #[test]
    fn decoder_errors_are_failed_frames() {
        let mut reader = reader(vec![Packet::Broken, Packet::Good(20.0)], 2.0);

        assert_eq!(drain(&mut reader), [None, Some(20.0)]);
    }

    #[test]
    fn capture_is_released_on_drop() {
        let capture = ScriptedCapture::new(Vec::new(), 0.0);
        let released = Rc::clone(&capture.released);
        let reader = VideoReader::from_capture(capture, Path::new("clip.avi")).unwrap();
        assert_eq!(reader.fps(), 25.0);
        assert_eq!(reader.frame_size(), Size::new(4, 4));

        drop(reader);
        assert!(released.get());
    }

    #[test]
    fn missing_image_is_an_input_error() {
        let err = read_image(Path::new("/no/such/plate.jpg")).unwrap_err();
        assert!(matches!(err, PlateError::InputOpen(_)));
    }

    #[test]
    fn written_image_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.png");
        let frame =
            Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0))
                .unwrap();
        imwrite(path.to_str().unwrap(), &frame, &Vector::new()).unwrap();

        let image = read_image(&path).unwrap();
        assert_eq!((image.cols(), image.rows(), image.channels()), (64, 48, 3));
    }

    #[test]
    fn garbage_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(read_image(&path), Err(PlateError::InputOpen(_))));
    }

    #[test]
    fn missing_video_cannot_be_opened() {
        assert!(VideoReader::open(Path::new("/no/such/video.mp4")).is_err());
    }
}
