use indicatif::{ProgressBar, ProgressStyle};
use neural_style::{ProgressUpdate, TransferProgress};
use std::path::PathBuf;

pub struct ProgressBars {
    iter_pb: Option<ProgressBar>,
    preview_dir: Option<PathBuf>,
    total_len: usize,
}

impl ProgressBars {
    pub fn new(show_bar: bool) -> Self {
        let iter_pb = if show_bar {
            let sty = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
                .progress_chars("##-");

            let pb = ProgressBar::new(100);
            pb.set_style(sty);
            Some(pb)
        } else {
            None
        };

        Self {
            iter_pb,
            preview_dir: None,
            total_len: 100,
        }
    }

    /// Saves every preview the transfer hands out into `dir`
    pub fn with_previews(mut self, dir: PathBuf) -> Result<Self, neural_style::Error> {
        std::fs::create_dir_all(&dir)?;
        self.preview_dir = Some(dir);
        Ok(self)
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        if let Some(pb) = &self.iter_pb {
            pb.finish();
        }
    }
}

impl TransferProgress for ProgressBars {
    fn update(&mut self, update: ProgressUpdate<'_>) {
        if let Some(pb) = &self.iter_pb {
            if update.iteration.total != self.total_len {
                self.total_len = update.iteration.total;
                pb.set_length(self.total_len as u64);
            }

            pb.set_position(update.iteration.current as u64);
            pb.set_message(&format!("loss {:.4e}", update.loss.total));
        }

        if let (Some(dir), Some(img)) = (&self.preview_dir, update.preview) {
            let path = dir.join(format!("iter_{:05}.png", update.iteration.current));

            // A missing preview shouldn't abort the run
            if let Err(e) = img.save(&path) {
                log::warn!("failed to save preview '{}': {}", path.display(), e);
            }
        }
    }
}
