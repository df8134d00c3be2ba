use opencv::core::Size;
use opencv::core::BORDER_DEFAULT;
use opencv::imgproc::cvt_color;
use opencv::imgproc::gaussian_blur;
use opencv::imgproc::resize;
use opencv::imgproc::threshold;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::INTER_CUBIC;
use opencv::imgproc::THRESH_BINARY;
use opencv::imgproc::THRESH_OTSU;
use opencv::prelude::*;

use super::Detection;
use crate::config::{PipelineConfig, ProcessingMode};
use crate::error::Result;

const UPSCALE_FACTOR: f64 = 2.0;
const BLUR_KERNEL: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Inverted or zero-area detection box.
    Degenerate,
    /// Below the minimum plate size (enhanced mode only).
    TooSmall,
    /// Nothing of the box is left after clipping to the frame.
    OutsideFrame,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Degenerate => "degenerate",
            SkipReason::TooSmall => "too_small",
            SkipReason::OutsideFrame => "outside_frame",
        }
    }
}

/// Plate pixels ready for the recognizer.
#[derive(Debug)]
pub struct ProcessedRegion {
    pub pixels: Mat,
    pub source: Detection,
}

#[derive(Debug)]
pub enum RegionOutcome {
    Processed(ProcessedRegion),
    Skipped(SkipReason),
}

/// Validates a detection, crops it out of the frame and prepares it for OCR.
/// Never modifies the frame.
#[derive(Debug, Clone, Copy)]
pub struct RegionProcessor {
    mode: ProcessingMode,
    min_width: i32,
    min_height: i32,
}

impl RegionProcessor {
    pub fn new(mode: ProcessingMode, min_width: i32, min_height: i32) -> Self {
        Self {
            mode,
            min_width,
            min_height,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.mode, config.min_width, config.min_height)
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn process(&self, frame: &Mat, detection: &Detection) -> Result<RegionOutcome> {
        let bbox = detection.bbox;
        if bbox.is_degenerate() {
            return Ok(RegionOutcome::Skipped(SkipReason::Degenerate));
        }

        if self.mode == ProcessingMode::Enhanced
            && (bbox.width() < self.min_width || bbox.height() < self.min_height)
        {
            return Ok(RegionOutcome::Skipped(SkipReason::TooSmall));
        }

        let Some(clamped) = bbox.clamp_to(frame.cols(), frame.rows()) else {
            return Ok(RegionOutcome::Skipped(SkipReason::OutsideFrame));
        };

        // Copy out of the ROI so the region owns contiguous memory.
        let cropped = frame.apply_1(clamped.to_rect())?.try_clone()?;

        let pixels = match self.mode {
            ProcessingMode::Raw => cropped,
            ProcessingMode::Enhanced => enhance_for_ocr(&cropped)?,
        };

        Ok(RegionOutcome::Processed(ProcessedRegion {
            pixels,
            source: *detection,
        }))
    }
}

/// Grayscale, 2x cubic upscale, 5x5 Gaussian blur, then Otsu binarization.
pub fn enhance_for_ocr(region: &Mat) -> Result<Mat> {
    let gray = if region.channels() == 1 {
        region.try_clone()?
    } else {
        let mut gray = Mat::default();
        cvt_color(region, &mut gray, COLOR_BGR2GRAY, 0)?;
        gray
    };

    let mut upscaled = Mat::default();
    resize(
        &gray,
        &mut upscaled,
        Size::new(0, 0),
        UPSCALE_FACTOR,
        UPSCALE_FACTOR,
        INTER_CUBIC,
    )?;

    let mut blurred = Mat::default();
    gaussian_blur(
        &upscaled,
        &mut blurred,
        Size::new(BLUR_KERNEL, BLUR_KERNEL),
        0.0,
        0.0,
        BORDER_DEFAULT,
    )?;

    let mut binary = Mat::default();
    threshold(
        &blurred,
        &mut binary,
        0.0,
        255.0,
        THRESH_BINARY | THRESH_OTSU,
    )?;

    Ok(binary)
}
