use std::fs;
use std::path::Path;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Counters for one pipeline run, kept in a private registry so several
/// pipelines (or tests) never collide.
pub struct PipelineMetrics {
    registry: Registry,
    pub frames_processed: IntCounter,
    pub frames_failed: IntCounter,
    pub detections: IntCounter,
    pub regions_skipped: IntCounterVec,
    pub plates_recognized: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("plate_reader".to_string()), None)?;

        let frames_processed =
            IntCounter::new("frames_processed_total", "Frames run through detection")?;
        let frames_failed = IntCounter::new(
            "frames_failed_total",
            "Frames that could not be decoded or processed",
        )?;
        let detections = IntCounter::new("detections_total", "Candidate plate regions detected")?;
        let regions_skipped = IntCounterVec::new(
            Opts::new(
                "regions_skipped_total",
                "Detections that did not produce a result",
            ),
            &["reason"],
        )?;
        let plates_recognized = IntCounter::new(
            "plates_recognized_total",
            "Regions that produced non-empty text",
        )?;

        registry.register(Box::new(frames_processed.clone()))?;
        registry.register(Box::new(frames_failed.clone()))?;
        registry.register(Box::new(detections.clone()))?;
        registry.register(Box::new(regions_skipped.clone()))?;
        registry.register(Box::new(plates_recognized.clone()))?;

        Ok(Self {
            registry,
            frames_processed,
            frames_failed,
            detections,
            regions_skipped,
            plates_recognized,
        })
    }

    pub fn skipped(&self, reason: &str) {
        self.regions_skipped.with_label_values(&[reason]).inc();
    }

    pub fn skipped_count(&self, reason: &str) -> u64 {
        self.regions_skipped.with_label_values(&[reason]).get()
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.frames_processed.inc_by(3);
        metrics.skipped("too_small");
        metrics.skipped("too_small");

        let text = metrics.render().unwrap();
        assert!(text.contains("plate_reader_frames_processed_total 3"));
        assert!(text.contains("plate_reader_regions_skipped_total{reason=\"too_small\"} 2"));
        assert_eq!(metrics.skipped_count("too_small"), 2);
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let first = PipelineMetrics::new().unwrap();
        let second = PipelineMetrics::new().unwrap();
        first.plates_recognized.inc();
        assert_eq!(second.plates_recognized.get(), 0);
    }
}
