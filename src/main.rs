use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use vtu_animator::config::{self, Config};
use vtu_animator::interp::InterpMode;
use vtu_animator::pipeline;
use vtu_animator::renderer::ColorMap;

#[derive(Parser, Debug)]
#[command(name = "vtu-animator")]
#[command(about = "Animate velocity magnitude from a time series of VTK unstructured-grid files")]
struct Cli {
    /// YAML config file (defaults to ./vtu-animator.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the frame files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Physical time between consecutive frames, in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Nodes per axis of the sampling grid
    #[arg(long)]
    grid_resolution: Option<usize>,

    /// Animation path (.gif)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Height of the horizontal slice for linear-3d
    #[arg(long, allow_negative_numbers = true)]
    z_slice: Option<f64>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long)]
    dpi: Option<u32>,

    #[arg(long, value_enum)]
    mode: Option<InterpMode>,

    #[arg(long, value_enum)]
    colormap: Option<ColorMap>,

    /// Print the data summary and exit without rendering
    #[arg(long)]
    summary_only: bool,

    /// Also write the data summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load(),
        };
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dt) = self.dt {
            cfg.dt = dt;
        }
        if let Some(n) = self.grid_resolution {
            cfg.grid_resolution = n;
        }
        if let Some(path) = &self.output {
            cfg.output_path = Some(path.clone());
        }
        if self.z_slice.is_some() {
            cfg.z_slice = self.z_slice;
        }
        if let Some(fps) = self.fps {
            cfg.fps = fps;
        }
        if let Some(dpi) = self.dpi {
            cfg.dpi = dpi;
        }
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if self.colormap.is_some() {
            cfg.colormap = self.colormap;
        }
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = cli.config()?;
    info!(
        "Mode {} reading {} (dt = {:e} s)",
        cfg.mode.name(),
        cfg.data_dir.display(),
        cfg.dt
    );

    let loaded = pipeline::load(cfg)?;
    let summary = loaded.summary();
    println!("{summary}");
    if let Some(path) = &cli.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }
    if cli.summary_only {
        return Ok(());
    }

    let output = loaded.build_grid()?.render()?;
    info!("Animation saved to {}", output.display());
    Ok(())
}
