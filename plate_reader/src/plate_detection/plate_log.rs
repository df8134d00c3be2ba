use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::Result;

/// ISO-8601 local time with microseconds and no offset.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One recognised plate in a video.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub frame_index: u64,
    pub text: String,
}

impl LogEntry {
    pub fn now(frame_index: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            frame_index,
            text: text.into(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only store of recognised plates.
pub trait LogSink {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// CSV log of `timestamp,frame_index,text` rows. The file is opened in append
/// mode and flushed after every row so outside readers always see whole rows.
pub struct PlateLog {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl PlateLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        info!(path = %path.display(), "appending plate log");
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written through this handle.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl LogSink for PlateLog {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let timestamp = entry.formatted_timestamp();
        let frame_index = entry.frame_index.to_string();
        self.writer
            .write_record([timestamp.as_str(), frame_index.as_str(), entry.text.as_str()])?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
