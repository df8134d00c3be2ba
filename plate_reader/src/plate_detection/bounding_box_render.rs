use opencv::core::Scalar;
use opencv::core::Size;
use opencv::imgproc::put_text;
use opencv::imgproc::rectangle_points;
use opencv::imgproc::resize;
use opencv::imgproc::FONT_HERSHEY_SIMPLEX;
use opencv::imgproc::INTER_LINEAR;
use opencv::imgproc::LINE_AA;
use opencv::imgproc::LINE_8;
use opencv::prelude::*;

use super::RegionResult;
use crate::config::RenderStyle;
use crate::error::Result;

/// Draws plate boxes and their text onto frames.
pub struct BoundingBoxRender {
    style: RenderStyle,
}

impl BoundingBoxRender {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    pub fn draw(&self, image: &mut Mat, results: &[RegionResult]) -> Result<()> {
        let box_color = bgr(self.style.box_color);
        let text_color = bgr(self.style.text_color);

        for result in results {
            rectangle_points(
                image,
                result.overlay_box.top_left(),
                result.overlay_box.bottom_right(),
                box_color,
                self.style.box_thickness,
                LINE_8,
                0,
            )?;
            put_text(
                image,
                &result.combined_text,
                result.text_anchor,
                FONT_HERSHEY_SIMPLEX,
                self.style.font_scale,
                text_color,
                self.style.text_thickness,
                LINE_AA,
                false,
            )?;
        }

        Ok(())
    }

    /// Copy of `image` resized by the display scale. Only for showing; the
    /// annotated frame itself keeps its resolution.
    pub fn scale_for_display(&self, image: &Mat) -> Result<Mat> {
        let scale = self.style.display_scale;
        if (scale - 1.0).abs() < f64::EPSILON {
            return Ok(image.try_clone()?);
        }

        let size = Size::new(
            (image.cols() as f64 * scale) as i32,
            (image.rows() as f64 * scale) as i32,
        );
        let mut scaled = Mat::default();
        resize(image, &mut scaled, size, 0.0, 0.0, INTER_LINEAR)?;
        Ok(scaled)
    }
}

fn bgr(color: [f64; 3]) -> Scalar {
    Scalar::new(color[0], color[1], color[2], 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_detection::geometry::{text_anchor, PlateBox};
    use crate::plate_detection::Detection;
    use opencv::core::{Vec3b, CV_8UC3};

    fn result(bbox: PlateBox, text: &str) -> RegionResult {
        RegionResult {
            source: Detection::new(bbox, 0.9, 0),
            combined_text: text.to_string(),
            overlay_box: bbox,
            text_anchor: text_anchor(&bbox),
        }
    }

    fn black_frame(cols: i32, rows: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn draws_box_outline_in_box_color() {
        let render = BoundingBoxRender::new(RenderStyle::video());
        let mut frame = black_frame(640, 480);
        render
            .draw(&mut frame, &[result(PlateBox::new(100, 200, 400, 260), "AB12CD")])
            .unwrap();

        let edge = frame.at_2d::<Vec3b>(200, 250).unwrap();
        assert_eq!(edge.0, [255, 0, 0]);
        let inside = frame.at_2d::<Vec3b>(230, 250).unwrap();
        assert_eq!(inside.0, [0, 0, 0]);
    }

    #[test]
    fn text_lands_near_the_anchor() {
        let render = BoundingBoxRender::new(RenderStyle::still_image());
        let mut frame = black_frame(640, 480);
        render
            .draw(&mut frame, &[result(PlateBox::new(100, 200, 400, 260), "AB")])
            .unwrap();

        let mut text_pixels = 0;
        for row in 140..182 {
            for col in 100..200 {
                if frame.at_2d::<Vec3b>(row, col).unwrap().0 == [0, 255, 255] {
                    text_pixels += 1;
                }
            }
        }
        assert!(text_pixels > 0);
    }

    #[test]
    fn nothing_to_draw_leaves_frame_black() {
        let render = BoundingBoxRender::new(RenderStyle::video());
        let mut frame = black_frame(64, 48);
        render.draw(&mut frame, &[]).unwrap();
        assert!(frame.data_bytes().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn display_scaling_only_touches_the_copy() {
        let render = BoundingBoxRender::new(RenderStyle::still_image());
        let frame = black_frame(200, 100);

        let scaled = render.scale_for_display(&frame).unwrap();
        assert_eq!((scaled.cols(), scaled.rows()), (300, 150));
        assert_eq!((frame.cols(), frame.rows()), (200, 100));

        let unscaled = BoundingBoxRender::new(RenderStyle::video())
            .scale_for_display(&frame)
            .unwrap();
        assert_eq!((unscaled.cols(), unscaled.rows()), (200, 100));
    }
}
