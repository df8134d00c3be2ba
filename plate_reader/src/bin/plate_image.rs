use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use opencv::core::Vector;
use opencv::imgcodecs::imwrite;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plate_reader::plate_detection::bounding_box_render::BoundingBoxRender;
use plate_reader::plate_detection::object_detector::YoloPlateDetector;
use plate_reader::plate_detection::ocr_reader::TesseractRecognizer;
use plate_reader::plate_detection::orchestrator::run_still_image;
use plate_reader::plate_detection::pipeline::FramePipeline;
use plate_reader::plate_detection::preview::Preview;
use plate_reader::plate_detection::video_reader::read_image;
use plate_reader::PipelineConfig;

/// Detect and read licence plates in a single image.
#[derive(Parser, Debug)]
#[command(name = "plate_image", version, about, long_about = None)]
struct Args {
    /// Image to process
    input: PathBuf,

    /// TOML file layered over the still-image defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// YOLOv5 ONNX plate detector
    #[arg(long)]
    model: Option<PathBuf>,

    /// Tesseract data directory
    #[arg(long)]
    tessdata: Option<PathBuf>,

    /// Drop recognized words at or below this confidence (0-1)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Run the detector on CUDA
    #[arg(long, default_value_t = false)]
    gpu: bool,

    /// Do not open a preview window
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Write the annotated image here
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::load(args.config.as_deref(), PipelineConfig::still_image())
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
    if args.gpu {
        config.detector.use_gpu = true;
    }
    config.validate().context("invalid command line override")?;

    let mut image = read_image(&args.input)
        .with_context(|| format!("reading image {}", args.input.display()))?;

    let detector = YoloPlateDetector::load(&config.detector).context("loading plate detector")?;
    let recognizer =
        TesseractRecognizer::new(&config.recognizer).context("starting text recognizer")?;
    let mut pipeline = FramePipeline::new(&config, Box::new(detector), Box::new(recognizer))?;

    let render = BoundingBoxRender::new(config.render.clone());
    let preview = if args.headless {
        Preview::Headless
    } else {
        Preview::window("plates")
    };

    let results = run_still_image(&mut pipeline, &mut image, &render, &preview)?;
    for result in &results {
        println!("{}", result.combined_text);
    }
    info!(plates = results.len(), "done");

    if let Some(path) = args.save {
        let path_str = path
            .to_str()
            .with_context(|| format!("output path is not valid UTF-8: {}", path.display()))?;
        imwrite(path_str, &image, &Vector::new())
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "annotated image saved");
    }

    Ok(())
}
