//! Pipeline configuration.
//!
//! Each entry point starts from a preset ([`PipelineConfig::still_image`] or
//! [`PipelineConfig::video`]) and may layer a TOML file on top of it with
//! [`PipelineConfig::load`]. Every key in the file is optional; missing keys
//! keep the preset value.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{PlateError, Result};

const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_INPUT_SIZE: i32 = 640;
const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.4;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
const DEFAULT_MIN_WIDTH: i32 = 50;
const DEFAULT_MIN_HEIGHT: i32 = 20;
const DEFAULT_VIDEO_SPAN_CONFIDENCE: f32 = 0.4;
const DEFAULT_PAGE_SEG_MODE: u32 = 7;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Crop only. Used for still images.
    Raw,
    /// Crop, grayscale, upscale, blur and binarize. Used for video frames.
    Enhanced,
}

/// What the video loop does when a single frame cannot be decoded or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameErrorPolicy {
    Skip,
    Abort,
}

impl FromStr for FrameErrorPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown frame error policy '{other}' (skip|abort)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: i32,
    pub class_count: usize,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub use_gpu: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            class_count: 1,
            confidence_threshold: DEFAULT_DETECTION_CONFIDENCE,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            use_gpu: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerConfig {
    /// Tesseract data directory. `None` lets Tesseract use `TESSDATA_PREFIX`.
    pub data_path: Option<PathBuf>,
    pub languages: Vec<String>,
    pub page_seg_mode: u32,
    pub char_whitelist: Option<String>,
}

impl RecognizerConfig {
    pub fn with_languages(languages: &[&str]) -> Self {
        Self {
            data_path: None,
            languages: languages.iter().map(|lang| lang.to_string()).collect(),
            page_seg_mode: DEFAULT_PAGE_SEG_MODE,
            char_whitelist: None,
        }
    }

    /// Language string in the form Tesseract expects, e.g. `eng+tur`.
    pub fn joined_languages(&self) -> String {
        self.languages.join("+")
    }
}

/// Colours are BGR.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub box_color: [f64; 3],
    pub box_thickness: i32,
    pub text_color: [f64; 3],
    pub font_scale: f64,
    pub text_thickness: i32,
    /// Factor applied to the annotated frame before it is displayed.
    pub display_scale: f64,
}

impl RenderStyle {
    pub fn still_image() -> Self {
        Self {
            box_color: [255.0, 0.0, 0.0],
            box_thickness: 4,
            text_color: [0.0, 255.0, 255.0],
            font_scale: 2.0,
            text_thickness: 10,
            display_scale: 1.5,
        }
    }

    pub fn video() -> Self {
        Self {
            box_color: [255.0, 0.0, 0.0],
            box_thickness: 3,
            text_color: [0.0, 0.0, 0.0],
            font_scale: 1.6,
            text_thickness: 3,
            display_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: ProcessingMode,
    pub min_width: i32,
    pub min_height: i32,
    /// Spans at or below this confidence are dropped. `None` keeps every span.
    pub min_span_confidence: Option<f32>,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    pub render: RenderStyle,
    pub frame_errors: FrameErrorPolicy,
    pub max_consecutive_failures: u32,
}

impl PipelineConfig {
    pub fn still_image() -> Self {
        Self {
            mode: ProcessingMode::Raw,
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            min_span_confidence: None,
            detector: DetectorConfig::default(),
            recognizer: RecognizerConfig::with_languages(&["eng"]),
            render: RenderStyle::still_image(),
            frame_errors: FrameErrorPolicy::Abort,
            max_consecutive_failures: 1,
        }
    }

    pub fn video() -> Self {
        Self {
            mode: ProcessingMode::Enhanced,
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            min_span_confidence: Some(DEFAULT_VIDEO_SPAN_CONFIDENCE),
            detector: DetectorConfig::default(),
            recognizer: RecognizerConfig::with_languages(&["eng", "tur"]),
            render: RenderStyle::video(),
            frame_errors: FrameErrorPolicy::Skip,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// Layers the TOML file at `path` (if any) over `preset` and validates
    /// the result.
    pub fn load(path: Option<&Path>, preset: PipelineConfig) -> Result<Self> {
        let mut config = preset;
        if let Some(path) = path {
            let contents = fs::read_to_string(path).map_err(|source| PlateError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
            let file = parse_file_config(&contents).map_err(|source| PlateError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
            file.apply(&mut config);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.min_span_confidence {
            check_unit_interval("min_span_confidence", threshold)?;
        }
        check_unit_interval(
            "detector.confidence_threshold",
            self.detector.confidence_threshold,
        )?;
        check_unit_interval("detector.nms_threshold", self.detector.nms_threshold)?;

        if self.min_width < 0 {
            return Err(invalid("min_width", self.min_width));
        }
        if self.min_height < 0 {
            return Err(invalid("min_height", self.min_height));
        }
        if self.detector.input_size <= 0 {
            return Err(invalid("detector.input_size", self.detector.input_size));
        }
        if self.detector.class_count == 0 {
            return Err(invalid("detector.class_count", self.detector.class_count));
        }
        if self.recognizer.languages.is_empty() {
            return Err(invalid("recognizer.languages", "[]"));
        }
        if !(self.render.display_scale > 0.0) {
            return Err(invalid("render.display_scale", self.render.display_scale));
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid(
                "max_consecutive_failures",
                self.max_consecutive_failures,
            ));
        }
        Ok(())
    }
}

fn check_unit_interval(field: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, value))
    }
}

fn invalid(field: &'static str, value: impl ToString) -> PlateError {
    PlateError::InvalidConfig {
        field,
        value: value.to_string(),
    }
}

fn parse_file_config(contents: &str) -> std::result::Result<FileConfig, toml::de::Error> {
    toml::from_str(contents)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    mode: Option<ProcessingMode>,
    min_width: Option<i32>,
    min_height: Option<i32>,
    /// A negative value disables span filtering.
    min_span_confidence: Option<f32>,
    frame_errors: Option<FrameErrorPolicy>,
    max_consecutive_failures: Option<u32>,
    detector: DetectorFileConfig,
    recognizer: RecognizerFileConfig,
    render: RenderFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DetectorFileConfig {
    model_path: Option<PathBuf>,
    input_size: Option<i32>,
    class_count: Option<usize>,
    confidence_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    use_gpu: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RecognizerFileConfig {
    data_path: Option<PathBuf>,
    languages: Option<Vec<String>>,
    page_seg_mode: Option<u32>,
    char_whitelist: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RenderFileConfig {
    box_color: Option<[f64; 3]>,
    box_thickness: Option<i32>,
    text_color: Option<[f64; 3]>,
    font_scale: Option<f64>,
    text_thickness: Option<i32>,
    display_scale: Option<f64>,
}

impl FileConfig {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(min_width) = self.min_width {
            config.min_width = min_width;
        }
        if let Some(min_height) = self.min_height {
            config.min_height = min_height;
        }
        if let Some(threshold) = self.min_span_confidence {
            config.min_span_confidence = (threshold >= 0.0).then_some(threshold);
        }
        if let Some(policy) = self.frame_errors {
            config.frame_errors = policy;
        }
        if let Some(limit) = self.max_consecutive_failures {
            config.max_consecutive_failures = limit;
        }

        let detector = &mut config.detector;
        if let Some(path) = self.detector.model_path {
            detector.model_path = path;
        }
        if let Some(size) = self.detector.input_size {
            detector.input_size = size;
        }
        if let Some(count) = self.detector.class_count {
            detector.class_count = count;
        }
        if let Some(threshold) = self.detector.confidence_threshold {
            detector.confidence_threshold = threshold;
        }
        if let Some(threshold) = self.detector.nms_threshold {
            detector.nms_threshold = threshold;
        }
        if let Some(use_gpu) = self.detector.use_gpu {
            detector.use_gpu = use_gpu;
        }

        let recognizer = &mut config.recognizer;
        if let Some(path) = self.recognizer.data_path {
            recognizer.data_path = Some(path);
        }
        if let Some(languages) = self.recognizer.languages {
            recognizer.languages = languages;
        }
        if let Some(psm) = self.recognizer.page_seg_mode {
            recognizer.page_seg_mode = psm;
        }
        if let Some(whitelist) = self.recognizer.char_whitelist {
            recognizer.char_whitelist = (!whitelist.is_empty()).then_some(whitelist);
        }

        let render = &mut config.render;
        if let Some(color) = self.render.box_color {
            render.box_color = color;
        }
        if let Some(thickness) = self.render.box_thickness {
            render.box_thickness = thickness;
        }
        if let Some(color) = self.render.text_color {
            render.text_color = color;
        }
        if let Some(scale) = self.render.font_scale {
            render.font_scale = scale;
        }
        if let Some(thickness) = self.render.text_thickness {
            render.text_thickness = thickness;
        }
        if let Some(scale) = self.render.display_scale {
            render.display_scale = scale;
        }
    }
}
