pub mod config;
pub mod error;
pub mod metrics;
pub mod plate_detection;
pub mod utils;

pub use config::{FrameErrorPolicy, PipelineConfig, ProcessingMode};
pub use error::{PlateError, Result};
