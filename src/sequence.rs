//! Frame sequencer: velocity magnitudes, the interpolation stack, the global
//! color scale and the redraw loop that feeds the GIF encoder.

use log::{info, warn};
use std::path::PathBuf;

use crate::animation;
use crate::config::Config;
use crate::error::RenderError;
use crate::grid::RegularGrid;
use crate::interp::{FILL_VALUE, InterpMode, Interpolator};
use crate::loader::Frame;
use crate::renderer::{ColorMap, Figure, FigureLayout, Style, format_sci};

/// Scalar values on a rectangular sampling lattice, row-major with rows of
/// constant y (ascending).
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedField {
    pub nx: usize,
    pub ny: usize,
    /// First and last lattice x coordinate.
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub values: Vec<f64>,
    /// False where the sample fell outside the mesh hull.
    pub inside: Vec<bool>,
}

/// Everything the sequencer needs from the configuration.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub mode: InterpMode,
    pub colormap: ColorMap,
    pub dt: f64,
    pub fps: u32,
    /// Figure size in pixels.
    pub pixels: (f64, f64),
    pub filled_levels: usize,
    pub line_levels: usize,
    pub show_points: bool,
    pub components: Vec<String>,
    pub z_slice: Option<f64>,
    pub output: PathBuf,
}

impl RenderOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            mode: cfg.mode,
            colormap: cfg.colormap(),
            dt: cfg.dt,
            fps: cfg.fps,
            pixels: cfg.pixel_size(),
            filled_levels: cfg.filled_levels,
            line_levels: cfg.line_levels,
            show_points: cfg.show_points,
            components: cfg.components.clone(),
            z_slice: cfg.z_slice,
            output: cfg.output_path(),
        }
    }
}

/// `sqrt(sum of squares)` of the configured components at every point.
pub fn magnitudes(frame: &Frame, components: &[String]) -> Result<Vec<f64>, RenderError> {
    let n = frame.point_count();
    let mut sum = vec![0.0; n];
    for key in components {
        let values = frame
            .component(key)
            .filter(|v| v.len() == n)
            .ok_or_else(|| RenderError::Component {
                frame: frame.index,
                component: key.clone(),
            })?;
        for (acc, v) in sum.iter_mut().zip(values) {
            *acc += v * v;
        }
    }
    Ok(sum.into_iter().map(f64::sqrt).collect())
}

/// The slice height actually used, and what was asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZSlice {
    pub value: f64,
    pub requested: f64,
}

impl ZSlice {
    pub fn substituted(&self) -> bool {
        self.value != self.requested
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

/// Snap the requested slice height (default: median z) to the nearest z
/// level present in the mesh; ties go to the lower level.
pub fn resolve_z_slice(points: &[[f64; 3]], requested: Option<f64>) -> ZSlice {
    let mut levels: Vec<f64> = points.iter().map(|p| p[2]).filter(|z| z.is_finite()).collect();
    let requested = requested.unwrap_or_else(|| median(levels.clone()));
    levels.sort_by(f64::total_cmp);
    levels.dedup();

    let value = levels
        .iter()
        .copied()
        .fold(None, |best: Option<f64>, z| match best {
            // Ascending order: keep the earlier (lower) level on ties.
            Some(b) if (b - requested).abs() <= (z - requested).abs() => Some(b),
            _ => Some(z),
        })
        .unwrap_or(requested);

    let slice = ZSlice { value, requested };
    if slice.substituted() {
        warn!("z-slice {requested} is not a mesh level; using nearest level z={value}");
    }
    slice
}

fn title(mode: InterpMode, z: f64) -> String {
    match mode {
        InterpMode::Scattered2d => "Smooth Velocity Magnitude Evolution".to_string(),
        InterpMode::TriangulatedSurface => "Interpolated Velocity Magnitude (Triangulated FEM)".to_string(),
        InterpMode::Linear3d => format!("Velocity Magnitude Slice at z={z:.2}"),
    }
}

fn axis_labels(mode: InterpMode) -> (&'static str, &'static str) {
    match mode {
        InterpMode::Scattered2d => ("X coordinate", "Y coordinate"),
        _ => ("X", "Y"),
    }
}

/// Min and max over the finite values; (0, 0) when there are none.
pub fn global_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo > hi { (0.0, 0.0) } else { (lo, hi) }
}

fn xy_extent(points: &[[f64; 3]]) -> [f64; 4] {
    let mut e = [f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY];
    for p in points {
        e[0] = e[0].min(p[0]);
        e[1] = e[1].max(p[0]);
        e[2] = e[2].min(p[1]);
        e[3] = e[3].max(p[1]);
    }
    e
}

/// Lattice coordinates and the z at which it samples.
struct Lattice {
    xs: Vec<f64>,
    ys: Vec<f64>,
    z: f64,
}

impl Lattice {
    fn queries(&self) -> Vec<[f64; 3]> {
        self.ys
            .iter()
            .flat_map(|&y| self.xs.iter().map(move |&x| [x, y, self.z]))
            .collect()
    }

    fn field(&self, values: Vec<f64>, inside: Vec<bool>) -> InterpolatedField {
        let ends = |v: &[f64]| [v.first().copied().unwrap_or(0.0), v.last().copied().unwrap_or(0.0)];
        InterpolatedField {
            nx: self.xs.len(),
            ny: self.ys.len(),
            x_range: ends(&self.xs),
            y_range: ends(&self.ys),
            values,
            inside,
        }
    }
}

/// Interpolate every frame, then draw and encode the animation and write it
/// to `options.output`. Returns the written path.
pub fn render_sequence(frames: &[Frame], grid: &RegularGrid, options: &RenderOptions) -> Result<PathBuf, RenderError> {
    animation::validate_output(&options.output, options.fps)?;
    let (width, height) = animation::frame_size(options.pixels)?;
    let reference = frames.first().ok_or(RenderError::NoFrames)?;
    let mode = options.mode;

    let point_values = frames
        .iter()
        .map(|f| magnitudes(f, &options.components))
        .collect::<Result<Vec<_>, _>>()?;

    info!("Building {} interpolator over {} points", mode.name(), reference.point_count());
    let interpolator = Interpolator::new(&reference.points, mode)?;
    info!(
        "{} mesh decomposed into {} simplices",
        interpolator.mode().name(),
        interpolator.simplex_count()
    );

    // Axes extent and sampling lattice per mode.
    let (extent, z) = match mode {
        InterpMode::Scattered2d => (grid_extent(grid), 0.0),
        InterpMode::Linear3d => (grid_extent(grid), resolve_z_slice(&reference.points, options.z_slice).value),
        InterpMode::TriangulatedSurface => (xy_extent(&reference.points), 0.0),
    };
    let aspect = (extent[1] - extent[0]) / (extent[3] - extent[2]);
    let layout = FigureLayout::fit(width as usize, height as usize, aspect);
    let lattice = if mode.uses_grid() {
        Lattice {
            xs: grid.x.clone(),
            ys: grid.y.clone(),
            z,
        }
    } else {
        let (xs, ys) = layout.pixel_lattice(extent);
        Lattice { xs, ys, z }
    };

    let queries = lattice.queries();
    let stencil = interpolator.stencil(&queries);
    info!(
        "Interpolating {} frames onto {}x{} samples ({} of {} inside the mesh)",
        frames.len(),
        lattice.xs.len(),
        lattice.ys.len(),
        stencil.inside_count(),
        stencil.len()
    );
    let inside = stencil.inside();
    let fields = point_values
        .iter()
        .map(|values| -> Result<InterpolatedField, RenderError> {
            Ok(lattice.field(stencil.apply(values, FILL_VALUE)?, inside.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (vmin, vmax) = if mode.uses_grid() {
        global_range(fields.iter().flat_map(|f| &f.values))
    } else {
        global_range(point_values.iter().flatten())
    };
    info!("Global color scale: [{}, {}]", format_sci(vmin, 3), format_sci(vmax, 3));

    let (x_label, y_label) = axis_labels(mode);
    let style = Style {
        colormap: options.colormap,
        filled_levels: options.filled_levels.max(1),
        line_levels: if mode.uses_grid() { options.line_levels } else { 0 },
        mask_outside: !mode.uses_grid(),
        title: title(mode, z),
        x_label: x_label.to_string(),
        y_label: y_label.to_string(),
    };
    let mut figure = Figure::new(layout, extent, vmin, vmax, style);
    if options.show_points && mode == InterpMode::Scattered2d {
        figure.set_markers(&reference.points);
    }

    let total = frames.len();
    let rendered = frames.iter().zip(&fields).map(|(frame, field)| {
        let buf = figure.draw_frame(field, frame.timestamp(options.dt));
        info!("Rendered frame {}/{total}", frame.index + 1);
        buf
    });
    let bytes = animation::encode_gif(rendered, width, height, options.fps)?;
    animation::write_artifact(&options.output, &bytes)?;
    info!("Saved animation to {}", options.output.display());
    Ok(options.output.clone())
}

fn grid_extent(grid: &RegularGrid) -> [f64; 4] {
    [grid.bounds.min[0], grid.bounds.max[0], grid.bounds.min[1], grid.bounds.max[1]]
}
