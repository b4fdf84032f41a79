use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::still::{has_image_extension, load_image};
use super::video::{timestamp_for, SourceStats, DEFAULT_FPS};
use crate::frame::Frame;

/// A directory of images played back in file-name order.
pub(super) struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    frame_count: u64,
}

impl ImageSequenceSource {
    pub(super) fn new(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            bail!("directory {} contains no images", dir.display());
        }
        files.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            frame_count: 0,
        })
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoSource: connected to {} (image sequence, {} files)",
            self.dir.display(),
            self.files.len()
        );
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.frame_count;
        let Some(path) = self.files.get(index as usize) else {
            return Ok(None);
        };
        let mut frame = load_image(path)?;
        self.frame_count += 1;
        frame.index = index;
        Ok(Some(frame.with_timestamp(timestamp_for(index, DEFAULT_FPS))))
    }

    pub(super) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.dir.display().to_string(),
        }
    }
}
