use opencv::highgui::destroy_all_windows;
use opencv::highgui::imshow;
use opencv::highgui::wait_key;
use opencv::prelude::*;

use crate::error::Result;

const STOP_KEY: i32 = 'q' as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    Continue,
    Stop,
}

/// On-screen preview. `Headless` shows nothing and never asks to stop.
#[derive(Debug, Clone)]
pub enum Preview {
    Window { title: String },
    Headless,
}

impl Preview {
    pub fn window(title: impl Into<String>) -> Self {
        Preview::Window {
            title: title.into(),
        }
    }

    /// Shows `frame` and waits up to `wait_ms` for a key (`0` waits forever).
    /// Pressing `q` asks the caller to stop.
    pub fn show(&self, frame: &Mat, wait_ms: i32) -> Result<PreviewEvent> {
        match self {
            Preview::Headless => Ok(PreviewEvent::Continue),
            Preview::Window { title } => {
                imshow(title, frame)?;
                let key = wait_key(wait_ms)?;
                if key >= 0 && key & 0xFF == STOP_KEY {
                    Ok(PreviewEvent::Stop)
                } else {
                    Ok(PreviewEvent::Continue)
                }
            }
        }
    }

    pub fn close(&self) -> Result<()> {
        if let Preview::Window { .. } = self {
            destroy_all_windows()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_preview_never_stops() {
        let preview = Preview::Headless;
        let frame = Mat::default();
        assert_eq!(preview.show(&frame, 1).unwrap(), PreviewEvent::Continue);
        preview.close().unwrap();
    }
}
