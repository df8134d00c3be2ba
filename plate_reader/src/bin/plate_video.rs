use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plate_reader::plate_detection::bounding_box_render::BoundingBoxRender;
use plate_reader::plate_detection::object_detector::YoloPlateDetector;
use plate_reader::plate_detection::ocr_reader::TesseractRecognizer;
use plate_reader::plate_detection::orchestrator::{run_video, VideoRunOptions, VideoSinks};
use plate_reader::plate_detection::pipeline::FramePipeline;
use plate_reader::plate_detection::plate_log::{LogSink, PlateLog};
use plate_reader::plate_detection::preview::Preview;
use plate_reader::plate_detection::video_reader::{FrameSource, VideoReader};
use plate_reader::plate_detection::video_writer::AviWriter;
use plate_reader::utils::{stop_on_interrupt, usable_fps, StopSignal, FALLBACK_FPS};
use plate_reader::{FrameErrorPolicy, PipelineConfig};

/// Detect, read and log licence plates in a video.
#[derive(Parser, Debug)]
#[command(name = "plate_video", version, about, long_about = None)]
struct Args {
    /// Video to process
    input: PathBuf,

    /// TOML file layered over the video defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Annotated output video (XVID)
    #[arg(short, long, default_value = "output_with_text.avi")]
    output: PathBuf,

    /// CSV file recognized plates are appended to
    #[arg(long, default_value = "plates_log.csv")]
    log: PathBuf,

    /// Do not write the plate log
    #[arg(long, default_value_t = false)]
    no_log: bool,

    /// YOLOv5 ONNX plate detector
    #[arg(long)]
    model: Option<PathBuf>,

    /// Tesseract data directory
    #[arg(long)]
    tessdata: Option<PathBuf>,

    /// Drop recognized words at or below this confidence (0-1)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// What to do with a frame that cannot be decoded or processed (skip|abort)
    #[arg(long)]
    frame_errors: Option<FrameErrorPolicy>,

    /// Pace processing to the source frame rate
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Run the detector on CUDA
    #[arg(long, default_value_t = false)]
    gpu: bool,

    /// Do not open a preview window
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Write Prometheus counters here when the run ends
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::load(args.config.as_deref(), PipelineConfig::video())
        .context("loading configuration")?;
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    if let Some(tessdata) = args.tessdata {
        config.recognizer.data_path = Some(tessdata);
    }
    if args.min_confidence.is_some() {
        config.min_span_confidence = args.min_confidence;
    }
    if let Some(policy) = args.frame_errors {
        config.frame_errors = policy;
    }
    if args.gpu {
        config.detector.use_gpu = true;
    }
    config.validate().context("invalid command line override")?;

    let mut reader = VideoReader::open(&args.input)
        .with_context(|| format!("opening video {}", args.input.display()))?;
    let fps = usable_fps(reader.fps());
    if fps != reader.fps() {
        warn!(fps = reader.fps(), fallback = FALLBACK_FPS, "source reports no frame rate");
    }

    let detector = YoloPlateDetector::load(&config.detector).context("loading plate detector")?;
    let recognizer =
        TesseractRecognizer::new(&config.recognizer).context("starting text recognizer")?;
    let mut pipeline = FramePipeline::new(&config, Box::new(detector), Box::new(recognizer))?;

    let encoder = AviWriter::create(&args.output, fps, reader.frame_size())
        .with_context(|| format!("creating {}", args.output.display()))?;
    let log: Option<Box<dyn LogSink>> = if args.no_log {
        None
    } else {
        let log = PlateLog::open(&args.log)
            .with_context(|| format!("opening plate log {}", args.log.display()))?;
        Some(Box::new(log))
    };

    let stop = StopSignal::new();
    stop_on_interrupt(&stop).context("installing Ctrl-C handler")?;

    let mut sinks = VideoSinks {
        render: BoundingBoxRender::new(config.render.clone()),
        preview: if args.headless {
            Preview::Headless
        } else {
            Preview::window("plates")
        },
        encoder: Some(Box::new(encoder)),
        log,
        stop,
    };

    let options = VideoRunOptions::from_config(&config, args.realtime);
    let outcome = run_video(&mut pipeline, &mut reader, &mut sinks, options);

    let metrics = pipeline.metrics();
    info!(
        frames = metrics.frames_processed.get(),
        failed = metrics.frames_failed.get(),
        detections = metrics.detections.get(),
        plates = metrics.plates_recognized.get(),
        "pipeline counters"
    );
    if let Some(path) = &args.metrics_out {
        metrics
            .write_to(path)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    let summary = outcome.context("processing video")?;
    if summary.stopped_early {
        info!("stopped before the end of the video");
    }
    Ok(())
}
