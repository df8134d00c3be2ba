#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use opencv::core::{Scalar, Size, CV_8UC3};
use opencv::prelude::*;

use plate_reader::plate_detection::geometry::PlateBox;
use plate_reader::plate_detection::object_detector::PlateDetector;
use plate_reader::plate_detection::ocr_reader::TextRecognizer;
use plate_reader::plate_detection::plate_log::{LogEntry, LogSink};
use plate_reader::plate_detection::video_reader::{FrameRead, FrameSource};
use plate_reader::plate_detection::video_writer::VideoSink;
use plate_reader::plate_detection::{Detection, RecognitionSpan};
use plate_reader::utils::StopSignal;
use plate_reader::{PlateError, Result};

pub fn frame(cols: i32, rows: i32) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(200.0)).unwrap()
}

pub fn detection(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
    Detection::new(PlateBox::new(x1, y1, x2, y2), 0.9, 0)
}

pub fn span(text: &str, confidence: f32) -> RecognitionSpan {
    RecognitionSpan::new(text, confidence, PlateBox::new(0, 0, 10, 10))
}

/// Returns the same detections for every frame, failing on the listed calls.
pub struct StubDetector {
    detections: Vec<Detection>,
    fail_on: Vec<u64>,
    calls: Rc<Cell<u64>>,
}

impl StubDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            fail_on: Vec::new(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing_on(mut self, calls: &[u64]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }
}

impl PlateDetector for StubDetector {
    fn detect(&mut self, _frame: &Mat) -> Result<Vec<Detection>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_on.contains(&call) {
            return Err(PlateError::Recognition(format!("detector failed on call {call}")));
        }
        Ok(self.detections.clone())
    }
}

/// Dimensions of one image handed to the recognizer: (cols, rows, channels).
pub type SeenImage = (i32, i32, i32);

/// Answers from a queue of canned responses, falling back to `default` once
/// the queue is drained. Records the shape of every image it is given.
pub struct StubRecognizer {
    responses: VecDeque<Result<Vec<RecognitionSpan>>>,
    default: Vec<RecognitionSpan>,
    seen: Rc<RefCell<Vec<SeenImage>>>,
}

impl StubRecognizer {
    pub fn always(spans: Vec<RecognitionSpan>) -> Self {
        Self {
            responses: VecDeque::new(),
            default: spans,
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn then(mut self, response: Result<Vec<RecognitionSpan>>) -> Self {
        self.responses.push_back(response);
        self
    }

    pub fn seen(&self) -> Rc<RefCell<Vec<SeenImage>>> {
        Rc::clone(&self.seen)
    }
}

impl TextRecognizer for StubRecognizer {
    fn read(&mut self, image: &Mat) -> Result<Vec<RecognitionSpan>> {
        self.seen
            .borrow_mut()
            .push((image.cols(), image.rows(), image.channels()));
        match self.responses.pop_front() {
            Some(response) => response,
            None => Ok(self.default.clone()),
        }
    }
}

pub enum Step {
    Frame,
    Corrupt,
}

/// Plays back a fixed sequence of good and corrupt frames.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    size: Size,
    index: u64,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            size: Size::new(640, 360),
            index: 0,
        }
    }

    pub fn frames(count: usize) -> Self {
        Self::new((0..count).map(|_| Step::Frame).collect())
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> FrameRead {
        let index = self.index;
        self.index += 1;
        match self.steps.pop_front() {
            Some(Step::Frame) => FrameRead::Frame(frame(self.size.width, self.size.height)),
            Some(Step::Corrupt) => FrameRead::Failed(PlateError::FrameDecode {
                index,
                source: opencv::Error::new(opencv::core::StsError, "corrupt packet".to_string()),
            }),
            None => FrameRead::EndOfStream,
        }
    }

    fn fps(&self) -> f64 {
        25.0
    }

    fn frame_size(&self) -> Size {
        self.size
    }
}

/// Keeps log rows in memory.
#[derive(Clone, Default)]
pub struct MemoryLog {
    pub rows: Rc<RefCell<Vec<LogEntry>>>,
    pub flushed: Rc<Cell<bool>>,
}

impl LogSink for MemoryLog {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        self.rows.borrow_mut().push(entry.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed.set(true);
        Ok(())
    }
}

/// Counts written frames, optionally requesting a stop after a number of them.
#[derive(Clone, Default)]
pub struct MemoryEncoder {
    pub written: Rc<Cell<u64>>,
    pub finished: Rc<Cell<bool>>,
    pub stop_after: Option<(u64, StopSignal)>,
}

impl VideoSink for MemoryEncoder {
    fn write(&mut self, _frame: &Mat) -> Result<()> {
        self.written.set(self.written.get() + 1);
        if let Some((limit, stop)) = &self.stop_after {
            if self.written.get() >= *limit {
                stop.request_stop();
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished.set(true);
        Ok(())
    }
}
