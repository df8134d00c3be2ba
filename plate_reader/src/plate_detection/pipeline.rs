//! Per-frame recognition: detect, then for every detection crop, prepare and
//! read the plate. Shared by the still-image and video entry points; the mode
//! and span threshold come from [`PipelineConfig`].

use opencv::prelude::Mat;
use tracing::{debug, info, warn};

use super::aggregator::RecognitionAggregator;
use super::object_detector::PlateDetector;
use super::ocr_reader::TextRecognizer;
use super::region_processor::{RegionOutcome, RegionProcessor};
use super::RegionResult;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metrics::PipelineMetrics;

/// What one frame produced.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub detections: usize,
    pub results: Vec<RegionResult>,
}

pub struct FramePipeline {
    detector: Box<dyn PlateDetector>,
    recognizer: Box<dyn TextRecognizer>,
    processor: RegionProcessor,
    aggregator: RecognitionAggregator,
    metrics: PipelineMetrics,
}

impl FramePipeline {
    pub fn new(
        config: &PipelineConfig,
        detector: Box<dyn PlateDetector>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Result<Self> {
        Ok(Self {
            detector,
            recognizer,
            processor: RegionProcessor::from_config(config),
            aggregator: RecognitionAggregator::new(config.min_span_confidence),
            metrics: PipelineMetrics::new()?,
        })
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Runs detection and recognition over one frame. A failing detector is
    /// an error for the whole frame; a failing region only drops that region.
    pub fn process_frame(&mut self, frame: &Mat, frame_index: u64) -> Result<FrameReport> {
        let detections = self.detector.detect(frame)?;
        self.metrics.frames_processed.inc();
        self.metrics.detections.inc_by(detections.len() as u64);

        if detections.is_empty() {
            debug!(frame = frame_index, "no objects detected");
            return Ok(FrameReport::default());
        }

        let mut results = Vec::new();
        for detection in &detections {
            let region = match self.processor.process(frame, detection) {
                Ok(RegionOutcome::Processed(region)) => region,
                Ok(RegionOutcome::Skipped(reason)) => {
                    debug!(
                        frame = frame_index,
                        bbox = ?detection.bbox,
                        reason = reason.as_str(),
                        "skipping detection"
                    );
                    self.metrics.skipped(reason.as_str());
                    continue;
                }
                Err(err) => {
                    warn!(frame = frame_index, bbox = ?detection.bbox, error = %err, "region preprocessing failed");
                    self.metrics.skipped("error");
                    continue;
                }
            };

            match self
                .aggregator
                .recognize(&region, self.recognizer.as_mut())
            {
                Ok(Some(result)) => {
                    info!(
                        frame = frame_index,
                        text = %result.combined_text,
                        confidence = detection.confidence,
                        "plate recognized"
                    );
                    self.metrics.plates_recognized.inc();
                    results.push(result);
                }
                Ok(None) => {
                    debug!(frame = frame_index, bbox = ?detection.bbox, "no readable text");
                    self.metrics.skipped("no_text");
                }
                Err(err) => {
                    warn!(frame = frame_index, bbox = ?detection.bbox, error = %err, "recognition failed");
                    self.metrics.skipped("error");
                }
            }
        }

        Ok(FrameReport {
            detections: detections.len(),
            results,
        })
    }
}
