use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::interp::InterpMode;
use crate::loader::Layout;
use crate::renderer::ColorMap;

/// Config file picked up from the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "vtu-animator.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Simulation time between consecutive frames (seconds).
    pub dt: f64,
    pub grid_resolution: usize,
    /// Output artifact; defaults to a per-mode file name.
    pub output_path: Option<PathBuf>,
    /// Slice height for `linear-3d`; defaults to the median z of the mesh.
    pub z_slice: Option<f64>,
    pub fps: u32,
    pub dpi: u32,
    pub mode: InterpMode,
    /// Defaults to a per-mode color map.
    pub colormap: Option<ColorMap>,
    /// Figure width and height in inches.
    pub figure_size: [f64; 2],
    pub filled_levels: usize,
    pub line_levels: usize,
    pub show_points: bool,
    /// Point-data keys of the three velocity components.
    pub components: Vec<String>,
    pub layout: Layout,
    pub frame_suffix: String,
    pub manifest_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            dt: 1e-12,
            grid_resolution: 150,
            output_path: None,
            z_slice: None,
            fps: 25,
            dpi: 150,
            mode: InterpMode::Scattered2d,
            colormap: None,
            figure_size: [8.0, 6.4],
            filled_levels: 50,
            line_levels: 20,
            show_points: true,
            components: vec!["u".to_string(), "v".to_string(), "w".to_string()],
            layout: Layout::Auto,
            frame_suffix: "_0.vtu".to_string(),
            manifest_extension: "pvtu".to_string(),
        }
    }
}

impl Config {
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.mode.default_output()))
    }

    pub fn colormap(&self) -> ColorMap {
        self.colormap.unwrap_or_else(|| self.mode.default_colormap())
    }

    /// Figure size in pixels at the configured dpi.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.figure_size[0] * self.dpi as f64,
            self.figure_size[1] * self.dpi as f64,
        )
    }
}

/// Load `vtu-animator.yaml` from the working directory, falling back to
/// defaults when it is absent or unreadable.
pub fn load() -> Config {
    let path = Path::new(CONFIG_FILE);
    if !path.exists() {
        return Config::default();
    }
    match load_from(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("{e}; using defaults");
            Config::default()
        }
    }
}

/// Load an explicitly requested config file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.dt, 1e-12);
        assert_eq!(cfg.grid_resolution, 150);
        assert_eq!(cfg.output_path, None);
        assert_eq!(cfg.z_slice, None);
        assert_eq!(cfg.fps, 25);
        assert_eq!(cfg.dpi, 150);
        assert_eq!(cfg.mode, InterpMode::Scattered2d);
        assert_eq!(cfg.filled_levels, 50);
        assert_eq!(cfg.line_levels, 20);
        assert!(cfg.show_points);
        assert_eq!(cfg.components, vec!["u", "v", "w"]);
        assert_eq!(cfg.layout, Layout::Auto);
        assert_eq!(cfg.frame_suffix, "_0.vtu");
        assert_eq!(cfg.manifest_extension, "pvtu");
    }

    #[test]
    fn test_per_mode_defaults() {
        let mut cfg = Config::default();
        assert_eq!(cfg.output_path(), PathBuf::from("smooth_velocity_magnitude.gif"));
        assert_eq!(cfg.colormap(), ColorMap::Viridis);

        cfg.mode = InterpMode::Linear3d;
        assert_eq!(cfg.output_path(), PathBuf::from("velocity_3d_slice.gif"));
        assert_eq!(cfg.colormap(), ColorMap::Plasma);

        cfg.mode = InterpMode::TriangulatedSurface;
        assert_eq!(cfg.output_path(), PathBuf::from("velocity_tri_contour.gif"));
        assert_eq!(cfg.colormap(), ColorMap::Inferno);

        cfg.colormap = Some(ColorMap::Viridis);
        assert_eq!(cfg.colormap(), ColorMap::Viridis);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "dt: 2.5e-9\nmode: linear-3d\nz_slice: 0.25\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.dt, 2.5e-9);
        assert_eq!(cfg.mode, InterpMode::Linear3d);
        assert_eq!(cfg.z_slice, Some(0.25));
        assert_eq!(cfg.fps, 25); // default
        assert_eq!(cfg.grid_resolution, 150); // default
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
data_dir: /tmp/run
dt: 1.0e-6
grid_resolution: 64
output_path: out/anim.gif
z_slice: -0.5
fps: 10
dpi: 80
mode: triangulated-surface
colormap: plasma
figure_size: [4.0, 3.0]
filled_levels: 12
line_levels: 6
show_points: false
components: ["velocity[0]", "velocity[1]", "velocity[2]"]
layout: manifest
frame_suffix: ".vtu"
manifest_extension: pvtu
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/run"));
        assert_eq!(cfg.grid_resolution, 64);
        assert_eq!(cfg.output_path(), PathBuf::from("out/anim.gif"));
        assert_eq!(cfg.z_slice, Some(-0.5));
        assert_eq!(cfg.fps, 10);
        assert_eq!(cfg.dpi, 80);
        assert_eq!(cfg.mode, InterpMode::TriangulatedSurface);
        assert_eq!(cfg.colormap(), ColorMap::Plasma);
        assert_eq!(cfg.figure_size, [4.0, 3.0]);
        assert_eq!(cfg.pixel_size(), (320.0, 240.0));
        assert_eq!(cfg.filled_levels, 12);
        assert_eq!(cfg.line_levels, 6);
        assert!(!cfg.show_points);
        assert_eq!(cfg.components[2], "velocity[2]");
        assert_eq!(cfg.layout, Layout::Manifest);
        assert_eq!(cfg.frame_suffix, ".vtu");
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "mode: [not, a, mode]\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load_from(&dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
