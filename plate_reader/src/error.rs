use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlateError {
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The detection network could not be read or configured.
    #[error("failed to load detection model {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to initialise text recognizer: {0}")]
    RecognizerInit(String),

    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Missing, unreadable or undecodable image/video input.
    #[error("cannot open input {}", .0.display())]
    InputOpen(PathBuf),

    #[error("cannot open video encoder for {}", .0.display())]
    EncoderOpen(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for '{field}'")]
    InvalidConfig { field: &'static str, value: String },

    #[error("frame {index} could not be decoded: {source}")]
    FrameDecode { index: u64, source: opencv::Error },

    #[error("giving up after {0} consecutive frame failures")]
    TooManyFrameFailures(u32),
}

pub type Result<T> = std::result::Result<T, PlateError>;
