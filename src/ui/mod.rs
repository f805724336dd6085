use std::path::Path;

use crate::thumbnail::{CacheError, ThumbSize};
use crate::ui::preview::{PreviewError, render_preview, save_preview};
use crate::ui::state::{Browser, LoadOutcome};

pub mod preview;
pub mod state;

// ---------------------------------------------------------------------------
// Headless front end: drives the browser the way a window would
// ---------------------------------------------------------------------------

pub struct App {
    pub state: Browser,
}

impl App {
    pub fn new(state: Browser) -> Self {
        Self { state }
    }

    /// Load `folder` and pump worker events until every thumbnail is in.
    pub fn open_folder(&mut self, folder: &Path) -> Result<LoadOutcome, CacheError> {
        let outcome = self.state.load_folder(folder)?;
        println!("{}", self.state.status());

        if let LoadOutcome::Pending(_) = outcome {
            let mut last_status = self.state.status().to_string();
            while self.state.is_loading() && self.state.recv() {
                if self.state.status() != last_status {
                    last_status = self.state.status().to_string();
                    println!("{}", last_status);
                }
            }
        }
        Ok(outcome)
    }

    pub fn print_listing(&self) {
        for record in self.state.records() {
            let thumb = self
                .state
                .thumbnail(record.index)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}\t{}\t{}", record.index, record.path.display(), thumb);
        }
        let missing = (0..self.state.len())
            .filter(|&i| self.state.thumbnail(i).is_none())
            .count();
        if missing > 0 {
            log::warn!("{} of {} images have no thumbnail", missing, self.state.len());
        }
    }

    /// Select `index` and write its scale-to-fit preview to `out`.
    /// Returns false if `index` is out of range.
    pub fn preview(
        &mut self,
        index: usize,
        fit: ThumbSize,
        out: &Path,
    ) -> Result<bool, PreviewError> {
        let Some(record) = self.state.show(index) else {
            log::error!("No image at index {} ({} loaded)", index, self.state.len());
            return Ok(false);
        };
        let path = record.path.clone();
        println!("{}", self.state.status());

        let img = render_preview(&path, fit.width, fit.height)?;
        save_preview(&img, out)?;
        log::info!("Preview of {:?} written to {:?} ({}x{})", path, out, img.width(), img.height());
        Ok(true)
    }
}
