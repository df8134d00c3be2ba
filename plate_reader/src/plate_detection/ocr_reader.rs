use std::ffi::CStr;
use std::ffi::CString;

use leptess::tesseract::TessApi;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_BGR2RGB;
use opencv::prelude::*;
use tracing::{debug, info};

use super::geometry::PlateBox;
use super::RecognitionSpan;
use crate::config::RecognizerConfig;
use crate::error::{PlateError, Result};

/// TSV level of a single word.
const TSV_WORD_LEVEL: &str = "5";
const TSV_COLUMNS: usize = 12;

/// Reads text out of an image region. Spans come back in engine order.
pub trait TextRecognizer {
    fn read(&mut self, image: &Mat) -> Result<Vec<RecognitionSpan>>;
}

/// Tesseract-backed recognizer. One span per recognised word.
pub struct TesseractRecognizer {
    ocr: TessApi,
}

impl TesseractRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let languages = config.joined_languages();
        let data_path = config
            .data_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());

        let mut ocr = TessApi::new(data_path.as_deref(), &languages).map_err(|err| {
            PlateError::RecognizerInit(format!("languages '{languages}': {err:?}"))
        })?;

        set_variable(
            &mut ocr,
            "tessedit_pageseg_mode",
            &config.page_seg_mode.to_string(),
        )?;
        if let Some(whitelist) = &config.char_whitelist {
            set_variable(&mut ocr, "tessedit_char_whitelist", whitelist)?;
        }

        info!(languages = %languages, psm = config.page_seg_mode, "loaded text recognizer");
        Ok(Self { ocr })
    }
}

fn set_variable(ocr: &mut TessApi, name: &str, value: &str) -> Result<()> {
    let name_cstr =
        CString::new(name).map_err(|err| PlateError::RecognizerInit(err.to_string()))?;
    let value_cstr =
        CString::new(value).map_err(|err| PlateError::RecognizerInit(err.to_string()))?;

    ocr.raw
        .set_variable(&name_cstr, &value_cstr)
        .map_err(|err| PlateError::RecognizerInit(format!("cannot set {name}: {err:?}")))
}

impl TextRecognizer for TesseractRecognizer {
    fn read(&mut self, image: &Mat) -> Result<Vec<RecognitionSpan>> {
        // Tesseract wants tightly packed RGB or gray bytes.
        let pixels = match image.channels() {
            1 => image.try_clone()?,
            3 => {
                let mut rgb = Mat::default();
                cvt_color(image, &mut rgb, COLOR_BGR2RGB, 0)?;
                rgb
            }
            channels => {
                return Err(PlateError::Recognition(format!(
                    "unsupported channel count {channels}"
                )))
            }
        };

        let cols = pixels.cols();
        let rows = pixels.rows();
        let channels = pixels.channels();
        self.ocr
            .raw
            .set_image(pixels.data_bytes()?, cols, rows, channels, cols * channels)
            .map_err(|err| PlateError::Recognition(format!("set_image: {err:?}")))?;

        let tsv = self
            .ocr
            .raw
            .get_tsv_text(0)
            .map_err(|err| PlateError::Recognition(format!("get_tsv_text: {err:?}")))?;
        let tsv: &CStr = tsv.as_ref();

        let spans = parse_tsv(&tsv.to_string_lossy());
        debug!(spans = spans.len(), cols, rows, "ocr read");
        Ok(spans)
    }
}

/// Extracts word spans from Tesseract TSV output. Confidence is rescaled from
/// 0-100 to 0-1; rows without a word or with a negative confidence are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<RecognitionSpan> {
    tsv.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
            if fields.len() < TSV_COLUMNS || fields[0] != TSV_WORD_LEVEL {
                return None;
            }

            let text = fields[11].trim();
            let confidence: f32 = fields[10].trim().parse().ok()?;
            if text.is_empty() || confidence < 0.0 {
                return None;
            }

            let left: i32 = fields[6].parse().ok()?;
            let top: i32 = fields[7].parse().ok()?;
            let width: i32 = fields[8].parse().ok()?;
            let height: i32 = fields[9].parse().ok()?;

            Some(RecognitionSpan::new(
                text,
                (confidence / 100.0).clamp(0.0, 1.0),
                PlateBox::new(left, top, left + width, top + height),
            ))
        })
        .collect()
}
