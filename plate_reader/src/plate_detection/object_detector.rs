use opencv::core::Rect;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::core::CV_32F;
use opencv::dnn;
use opencv::dnn::blob_from_image;
use opencv::dnn::nms_boxes;
use opencv::dnn::Net;
use opencv::dnn::DNN_BACKEND_CUDA;
use opencv::dnn::DNN_BACKEND_OPENCV;
use opencv::dnn::DNN_TARGET_CPU;
use opencv::dnn::DNN_TARGET_CUDA;
use opencv::prelude::*;
use tracing::{debug, info};

use super::geometry::PlateBox;
use super::Detection;
use crate::config::DetectorConfig;
use crate::error::{PlateError, Result};

/// Anything that can propose plate regions for a frame. The confidence
/// threshold is applied before results are returned.
pub trait PlateDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>>;
}

/// YOLOv5 plate detector exported to ONNX and run with OpenCV DNN.
pub struct YoloPlateDetector {
    classifier: Net,
    input_size: i32,
    class_count: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl YoloPlateDetector {
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        let model_path = &config.model_path;
        let load_error = |reason: String| PlateError::ModelLoad {
            path: model_path.clone(),
            reason,
        };

        if !model_path.is_file() {
            return Err(load_error("file not found".to_string()));
        }
        let path = model_path
            .to_str()
            .ok_or_else(|| load_error("path is not valid UTF-8".to_string()))?;

        let mut classifier =
            dnn::read_net_from_onnx(path).map_err(|err| load_error(err.to_string()))?;

        if config.use_gpu {
            classifier.set_preferable_backend(DNN_BACKEND_CUDA)?;
            classifier.set_preferable_target(DNN_TARGET_CUDA)?;
        } else {
            classifier.set_preferable_backend(DNN_BACKEND_OPENCV)?;
            classifier.set_preferable_target(DNN_TARGET_CPU)?;
        }

        info!(
            model = %model_path.display(),
            input_size = config.input_size,
            gpu = config.use_gpu,
            "loaded plate detector"
        );

        Ok(Self {
            classifier,
            input_size: config.input_size,
            class_count: config.class_count,
            confidence_threshold: config.confidence_threshold,
            nms_threshold: config.nms_threshold,
        })
    }
}

impl PlateDetector for YoloPlateDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let mut blob = blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;

        self.classifier
            .set_input(&mut blob, "", 1.0, Scalar::default())?;

        let output_names = self.classifier.get_unconnected_out_layers_names()?;
        let mut output_values = Vector::<Mat>::new();
        self.classifier.forward(&mut output_values, &output_names)?;

        let x_factor = frame.cols() as f32 / self.input_size as f32;
        let y_factor = frame.rows() as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for output in output_values.iter() {
            let data = output.data_typed::<f32>()?;
            candidates.extend(decode_yolov5(
                data,
                self.class_count,
                x_factor,
                y_factor,
                self.confidence_threshold,
            ));
        }

        let detections =
            suppress_overlaps(candidates, self.confidence_threshold, self.nms_threshold)?;
        debug!(count = detections.len(), "plate detection");
        Ok(detections)
    }
}

/// Decodes raw YOLOv5 rows `[cx, cy, w, h, objectness, class scores...]`
/// given in network input pixels. Scores are objectness times the best class
/// score, kept when strictly above `confidence_threshold`.
pub fn decode_yolov5(
    data: &[f32],
    class_count: usize,
    x_factor: f32,
    y_factor: f32,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let row_len = 5 + class_count;

    data.chunks_exact(row_len)
        .filter_map(|row| {
            let objectness = row[4];
            if objectness <= confidence_threshold {
                return None;
            }

            let (class_id, class_score) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::MIN), |best, (id, score)| {
                    if score > best.1 {
                        (id, score)
                    } else {
                        best
                    }
                });

            let confidence = objectness * class_score;
            if confidence <= confidence_threshold {
                return None;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            let left = (cx - 0.5 * w) * x_factor;
            let top = (cy - 0.5 * h) * y_factor;
            let right = left + w * x_factor;
            let bottom = top + h * y_factor;

            Some(Detection::new(
                PlateBox::new(left as i32, top as i32, right as i32, bottom as i32),
                confidence,
                class_id as i32,
            ))
        })
        .collect()
}

/// Non-maximum suppression over decoded candidates, highest score first.
pub fn suppress_overlaps(
    candidates: Vec<Detection>,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let boxes: Vector<Rect> = candidates.iter().map(|d| d.bbox.to_rect()).collect();
    let scores: Vector<f32> = candidates.iter().map(|d| d.confidence).collect();

    let mut indices = Vector::<i32>::new();
    nms_boxes(
        &boxes,
        &scores,
        score_threshold,
        nms_threshold,
        &mut indices,
        1.0,
        0,
    )?;

    Ok(indices
        .iter()
        .filter_map(|i| usize::try_from(i).ok())
        .filter_map(|i| candidates.get(i).copied())
        .collect())
}
