use super::geometry::text_anchor;
use super::ocr_reader::TextRecognizer;
use super::region_processor::ProcessedRegion;
use super::{RecognitionSpan, RegionResult};
use crate::error::Result;

/// Turns the spans read from one region into a single labelled result.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionAggregator {
    min_span_confidence: Option<f32>,
}

impl RecognitionAggregator {
    /// `None` keeps every span regardless of confidence.
    pub fn new(min_span_confidence: Option<f32>) -> Self {
        Self {
            min_span_confidence,
        }
    }

    /// Returns `Ok(None)` when nothing readable survives filtering; such
    /// regions must not be drawn or logged.
    pub fn recognize(
        &self,
        region: &ProcessedRegion,
        recognizer: &mut dyn TextRecognizer,
    ) -> Result<Option<RegionResult>> {
        let spans = recognizer.read(&region.pixels)?;
        let combined_text = combine_spans(&spans, self.min_span_confidence);
        if combined_text.is_empty() {
            return Ok(None);
        }

        let overlay_box = region.source.bbox;
        Ok(Some(RegionResult {
            source: region.source,
            combined_text,
            overlay_box,
            text_anchor: text_anchor(&overlay_box),
        }))
    }
}

/// Joins span texts with single spaces in engine order, dropping spans whose
/// confidence is not strictly above the threshold, and trims the ends.
pub fn combine_spans(spans: &[RecognitionSpan], min_confidence: Option<f32>) -> String {
    spans
        .iter()
        .filter(|span| min_confidence.map_or(true, |threshold| span.confidence > threshold))
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
