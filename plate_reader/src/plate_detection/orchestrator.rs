//! Drives the frame pipeline over a still image or a video and routes the
//! results to the render, preview, encoder and log sinks.

use opencv::prelude::Mat;
use tracing::{info, warn};

use super::bounding_box_render::BoundingBoxRender;
use super::pipeline::FramePipeline;
use super::plate_log::{LogEntry, LogSink};
use super::preview::{Preview, PreviewEvent};
use super::video_reader::{FrameRead, FrameSource};
use super::video_writer::VideoSink;
use super::RegionResult;
use crate::config::{FrameErrorPolicy, PipelineConfig};
use crate::error::{PlateError, Result};
use crate::utils::{FpsLimiter, StopSignal};

const VIDEO_KEY_WAIT_MS: i32 = 1;

/// Runs one pass over a still image, draws the results onto it and shows the
/// scaled copy until a key is pressed.
pub fn run_still_image(
    pipeline: &mut FramePipeline,
    image: &mut Mat,
    render: &BoundingBoxRender,
    preview: &Preview,
) -> Result<Vec<RegionResult>> {
    let report = pipeline.process_frame(image, 0)?;
    if report.detections == 0 {
        info!("no objects detected");
        return Ok(Vec::new());
    }

    render.draw(image, &report.results)?;

    let display = render.scale_for_display(image)?;
    preview.show(&display, 0)?;
    preview.close()?;

    Ok(report.results)
}

#[derive(Debug, Clone, Copy)]
pub struct VideoRunOptions {
    pub frame_errors: FrameErrorPolicy,
    pub max_consecutive_failures: u32,
    /// Pace the loop to the source frame rate.
    pub realtime: bool,
}

impl VideoRunOptions {
    pub fn from_config(config: &PipelineConfig, realtime: bool) -> Self {
        Self {
            frame_errors: config.frame_errors,
            max_consecutive_failures: config.max_consecutive_failures,
            realtime,
        }
    }
}

/// Everything the video loop writes to. The encoder and the log are owned
/// here and closed by [`run_video`] whichever way the loop ends.
pub struct VideoSinks {
    pub render: BoundingBoxRender,
    pub preview: Preview,
    pub encoder: Option<Box<dyn VideoSink>>,
    pub log: Option<Box<dyn LogSink>>,
    pub stop: StopSignal,
}

impl VideoSinks {
    fn close(&mut self) -> Result<()> {
        let encoder = match self.encoder.as_mut() {
            Some(encoder) => encoder.finish(),
            None => Ok(()),
        };
        let log = match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        };
        let preview = self.preview.close();
        encoder.and(log).and(preview)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames that went through the pipeline and out to the encoder.
    pub frames: u64,
    pub failed_frames: u64,
    pub plates: u64,
    pub stopped_early: bool,
}

/// Processes `source` frame by frame until it ends or a stop is requested.
/// Stop requests are honoured between frames only, and the encoder and log
/// are closed on every exit path.
pub fn run_video(
    pipeline: &mut FramePipeline,
    source: &mut dyn FrameSource,
    sinks: &mut VideoSinks,
    options: VideoRunOptions,
) -> Result<RunSummary> {
    let outcome = frame_loop(pipeline, source, sinks, options);
    let closed = sinks.close();

    let summary = outcome?;
    closed?;

    info!(
        frames = summary.frames,
        failed = summary.failed_frames,
        plates = summary.plates,
        stopped_early = summary.stopped_early,
        "video finished"
    );
    Ok(summary)
}

fn frame_loop(
    pipeline: &mut FramePipeline,
    source: &mut dyn FrameSource,
    sinks: &mut VideoSinks,
    options: VideoRunOptions,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut limiter = options.realtime.then(|| FpsLimiter::new(source.fps()));
    let mut consecutive_failures = 0u32;
    let mut frame_index = 0u64;

    loop {
        if sinks.stop.is_requested() {
            summary.stopped_early = true;
            break;
        }

        let mut frame = match source.next_frame() {
            FrameRead::Frame(frame) => frame,
            FrameRead::EndOfStream => break,
            FrameRead::Failed(err) => {
                handle_frame_failure(
                    err,
                    frame_index,
                    options,
                    &mut consecutive_failures,
                    &mut summary,
                    pipeline,
                )?;
                frame_index += 1;
                continue;
            }
        };

        let results = match pipeline.process_frame(&frame, frame_index) {
            Ok(report) => {
                consecutive_failures = 0;
                report.results
            }
            Err(err) => {
                handle_frame_failure(
                    err,
                    frame_index,
                    options,
                    &mut consecutive_failures,
                    &mut summary,
                    pipeline,
                )?;
                Vec::new()
            }
        };

        if let Some(log) = sinks.log.as_mut() {
            for result in &results {
                log.append(&LogEntry::now(frame_index, result.combined_text.as_str()))?;
            }
        }
        summary.plates += results.len() as u64;

        sinks.render.draw(&mut frame, &results)?;
        let event = sinks.preview.show(&frame, VIDEO_KEY_WAIT_MS)?;
        if let Some(encoder) = sinks.encoder.as_mut() {
            encoder.write(&frame)?;
        }
        summary.frames += 1;

        if event == PreviewEvent::Stop {
            summary.stopped_early = true;
            break;
        }

        frame_index += 1;
        if let Some(limiter) = limiter.as_mut() {
            limiter.wait();
        }
    }

    Ok(summary)
}

fn handle_frame_failure(
    err: PlateError,
    frame_index: u64,
    options: VideoRunOptions,
    consecutive_failures: &mut u32,
    summary: &mut RunSummary,
    pipeline: &FramePipeline,
) -> Result<()> {
    summary.failed_frames += 1;
    pipeline.metrics().frames_failed.inc();

    match options.frame_errors {
        FrameErrorPolicy::Abort => Err(err),
        FrameErrorPolicy::Skip => {
            *consecutive_failures += 1;
            warn!(frame = frame_index, error = %err, "skipping frame");
            if *consecutive_failures >= options.max_consecutive_failures {
                Err(PlateError::TooManyFrameFailures(*consecutive_failures))
            } else {
                Ok(())
            }
        }
    }
}
