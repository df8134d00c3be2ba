pub mod aggregator;
pub mod bounding_box_render;
pub mod geometry;
pub mod object_detector;
pub mod ocr_reader;
pub mod orchestrator;
pub mod pipeline;
pub mod plate_log;
pub mod preview;
pub mod region_processor;
pub mod video_reader;
pub mod video_writer;

use opencv::core::Point;

use geometry::PlateBox;

/// Candidate plate region reported by the detector, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: PlateBox,
    pub confidence: f32,
    pub class_id: i32,
}

impl Detection {
    pub fn new(bbox: PlateBox, confidence: f32, class_id: i32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// One piece of text read by the recognizer. `location` is relative to the
/// region the recognizer was given, not to the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionSpan {
    pub text: String,
    pub confidence: f32,
    pub location: PlateBox,
}

impl RecognitionSpan {
    pub fn new(text: impl Into<String>, confidence: f32, location: PlateBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            location,
        }
    }
}

/// Render-ready outcome for one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResult {
    pub source: Detection,
    pub combined_text: String,
    pub overlay_box: PlateBox,
    pub text_anchor: Point,
}
