//! Stage contexts: configuration → [`Loaded`] → [`Gridded`] → artifact.
//!
//! Each stage consumes the previous one, so a later stage can only run on a
//! successfully completed earlier one.

use log::info;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::PipelineError;
use crate::grid::{self, RegularGrid};
use crate::loader::{self, FrameSet};
use crate::sequence::{self, RenderOptions};
use crate::summary::{self, Summary};

/// Frames loaded from disk.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub frames: FrameSet,
}

/// Frames plus the sampling grid built from the reference frame.
#[derive(Debug)]
pub struct Gridded {
    pub config: Config,
    pub frames: FrameSet,
    pub grid: RegularGrid,
}

pub fn load(config: Config) -> Result<Loaded, PipelineError> {
    let frames = loader::load_frames(&config)?;
    info!(
        "Loaded {} frames of {} points ({} frames, {} pieces skipped)",
        frames.frames.len(),
        frames.reference().point_count(),
        frames.skipped(),
        frames.skipped_pieces
    );
    Ok(Loaded { config, frames })
}

impl Loaded {
    pub fn summary(&self) -> Summary {
        summary::summarize(&self.frames.frames, &self.config.components, self.config.dt)
    }

    pub fn build_grid(self) -> Result<Gridded, PipelineError> {
        let grid = grid::build_grid(&self.frames.reference().points, self.config.grid_resolution)?;
        info!(
            "Interpolation grid setup: {0}x{0} points ({1} nodes)",
            self.config.grid_resolution,
            grid.len()
        );
        Ok(Gridded {
            config: self.config,
            frames: self.frames,
            grid,
        })
    }
}

impl Gridded {
    pub fn render(&self) -> Result<PathBuf, PipelineError> {
        let options = RenderOptions::from_config(&self.config);
        Ok(sequence::render_sequence(&self.frames.frames, &self.grid, &options)?)
    }
}

/// Load, grid and render in one go.
pub fn run(config: Config) -> Result<PathBuf, PipelineError> {
    load(config)?.build_grid()?.render()
}
