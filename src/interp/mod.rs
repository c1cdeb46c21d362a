//! Piecewise-linear interpolation of point data onto arbitrary query points.
//!
//! The mesh is triangulated once per run; for a fixed set of queries the
//! barycentric weights are computed once as a [`Stencil`] and every frame is
//! then evaluated as a weighted sum. Queries outside the convex hull of the
//! mesh produce the fill value.

mod delaunay;
mod locate;

use serde::Deserialize;

use crate::error::InterpError;
use crate::renderer::ColorMap;
use delaunay::{Tetrahedralization, Triangulation};
use locate::BucketIndex;

/// Value reported for queries outside the convex hull.
pub const FILL_VALUE: f64 = 0.0;

/// Barycentric coordinates down to this are still "inside" (edges, vertices).
const INSIDE_TOL: f64 = -1e-9;
/// z-extent below this fraction of the xy extent counts as a planar mesh.
const FLAT_Z: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum InterpMode {
    /// Triangulate the xy projection and fill smooth contours on a grid.
    #[serde(rename = "scattered-2d")]
    #[value(name = "scattered-2d")]
    Scattered2d,
    /// Tetrahedralize the mesh and sample a horizontal slice.
    #[serde(rename = "linear-3d")]
    #[value(name = "linear-3d")]
    Linear3d,
    /// Triangulate the xy projection and shade the triangles directly.
    #[serde(rename = "triangulated-surface")]
    #[value(name = "triangulated-surface")]
    TriangulatedSurface,
}

impl InterpMode {
    pub fn name(self) -> &'static str {
        match self {
            InterpMode::Scattered2d => "scattered-2d",
            InterpMode::Linear3d => "linear-3d",
            InterpMode::TriangulatedSurface => "triangulated-surface",
        }
    }

    pub fn default_output(self) -> &'static str {
        match self {
            InterpMode::Scattered2d => "smooth_velocity_magnitude.gif",
            InterpMode::Linear3d => "velocity_3d_slice.gif",
            InterpMode::TriangulatedSurface => "velocity_tri_contour.gif",
        }
    }

    pub fn default_colormap(self) -> ColorMap {
        match self {
            InterpMode::Scattered2d => ColorMap::Viridis,
            InterpMode::Linear3d => ColorMap::Plasma,
            InterpMode::TriangulatedSurface => ColorMap::Inferno,
        }
    }

    /// Whether frames are sampled on the regular grid (as opposed to the
    /// raster itself).
    pub fn uses_grid(self) -> bool {
        !matches!(self, InterpMode::TriangulatedSurface)
    }
}

/// Interpolation weights of one query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Indices into the original point array.
    pub vertices: [usize; 4],
    pub weights: [f64; 4],
    /// 3 for a triangle, 4 for a tetrahedron.
    pub len: usize,
}

impl Weights {
    fn eval(&self, values: &[f64]) -> f64 {
        (0..self.len)
            .map(|k| self.weights[k] * values[self.vertices[k]])
            .sum()
    }
}

/// Precomputed weights for a fixed query set.
#[derive(Debug, Clone)]
pub struct Stencil {
    entries: Vec<Option<Weights>>,
    point_count: usize,
}

impl Stencil {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-query flag: inside the convex hull.
    pub fn inside(&self) -> Vec<bool> {
        self.entries.iter().map(Option::is_some).collect()
    }

    pub fn inside_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Evaluate one frame of point values at every query.
    pub fn apply(&self, values: &[f64], fill: f64) -> Result<Vec<f64>, InterpError> {
        if values.len() != self.point_count {
            return Err(InterpError::ValueCount {
                points: self.point_count,
                values: values.len(),
            });
        }
        Ok(self
            .entries
            .iter()
            .map(|e| e.as_ref().map_or(fill, |w| w.eval(values)))
            .collect())
    }
}

#[derive(Debug, Clone)]
enum Mesh {
    Planar(Triangulation),
    /// 3D request on a mesh with a single z level.
    Sheet { tri: Triangulation, z: f64 },
    Volume(Tetrahedralization),
}

/// A triangulated mesh ready to answer point-location queries.
#[derive(Debug, Clone)]
pub struct Interpolator {
    mode: InterpMode,
    mesh: Mesh,
    index: BucketIndex,
    point_count: usize,
}

fn xy(p: &[f64; 3]) -> [f64; 2] {
    [p[0], p[1]]
}

impl Interpolator {
    pub fn new(points: &[[f64; 3]], mode: InterpMode) -> Result<Self, InterpError> {
        let mesh = match mode {
            InterpMode::Scattered2d | InterpMode::TriangulatedSurface => {
                Mesh::Planar(Triangulation::new(&points.iter().map(xy).collect::<Vec<_>>())?)
            }
            InterpMode::Linear3d => {
                let extent = |a: usize| {
                    let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                        (lo.min(p[a]), hi.max(p[a]))
                    });
                    hi - lo
                };
                let planar = extent(2) <= FLAT_Z * extent(0).max(extent(1));
                if planar && !points.is_empty() {
                    log::info!("Mesh has a single z level; interpolating in its plane");
                    let tri = Triangulation::new(&points.iter().map(xy).collect::<Vec<_>>())?;
                    Mesh::Sheet { tri, z: points[0][2] }
                } else {
                    Mesh::Volume(Tetrahedralization::new(points)?)
                }
            }
        };

        let boxes: Vec<_> = match &mesh {
            Mesh::Planar(tri) | Mesh::Sheet { tri, .. } => {
                (0..tri.simplices.len()).map(|t| tri.xy_bounds(t)).collect()
            }
            Mesh::Volume(tet) => (0..tet.simplices.len()).map(|t| tet.xy_bounds(t)).collect(),
        };
        log::debug!("{}: {} simplices indexed", mode.name(), boxes.len());

        Ok(Self {
            mode,
            mesh,
            index: BucketIndex::new(&boxes),
            point_count: points.len(),
        })
    }

    pub fn mode(&self) -> InterpMode {
        self.mode
    }

    pub fn simplex_count(&self) -> usize {
        match &self.mesh {
            Mesh::Planar(tri) | Mesh::Sheet { tri, .. } => tri.simplices.len(),
            Mesh::Volume(tet) => tet.simplices.len(),
        }
    }

    fn locate_planar(&self, tri: &Triangulation, q: [f64; 2]) -> Option<Weights> {
        let qn = tri.normalize(q);
        self.index.candidates(qn).iter().find_map(|&t| {
            let t = t as usize;
            let l = tri.barycentric(t, qn)?;
            if l.iter().any(|&w| w < INSIDE_TOL) {
                return None;
            }
            let v = tri.simplices[t].map(|k| tri.source[k]);
            Some(Weights {
                vertices: [v[0], v[1], v[2], v[0]],
                weights: [l[0], l[1], l[2], 0.0],
                len: 3,
            })
        })
    }

    fn locate_volume(&self, tet: &Tetrahedralization, q: [f64; 3]) -> Option<Weights> {
        let qn = tet.normalize(q);
        self.index.candidates([qn[0], qn[1]]).iter().find_map(|&t| {
            let t = t as usize;
            let l = tet.barycentric(t, qn)?;
            if l.iter().any(|&w| w < INSIDE_TOL) {
                return None;
            }
            Some(Weights {
                vertices: tet.simplices[t].map(|k| tet.source[k]),
                weights: l,
                len: 4,
            })
        })
    }

    /// Weights for one query, or `None` outside the hull.
    pub fn locate(&self, q: [f64; 3]) -> Option<Weights> {
        if q.iter().any(|c| !c.is_finite()) {
            return None;
        }
        match &self.mesh {
            Mesh::Planar(tri) => self.locate_planar(tri, [q[0], q[1]]),
            Mesh::Sheet { tri, z } => {
                if (q[2] - z).abs() > FLAT_Z * tri.scale() {
                    return None;
                }
                self.locate_planar(tri, [q[0], q[1]])
            }
            Mesh::Volume(tet) => self.locate_volume(tet, q),
        }
    }

    pub fn stencil(&self, queries: &[[f64; 3]]) -> Stencil {
        Stencil {
            entries: queries.iter().map(|&q| self.locate(q)).collect(),
            point_count: self.point_count,
        }
    }
}

/// One-shot interpolation of `values` (one per point) at `queries`.
pub fn interpolate(
    points: &[[f64; 3]],
    values: &[f64],
    queries: &[[f64; 3]],
    mode: InterpMode,
) -> Result<Vec<f64>, InterpError> {
    if values.len() != points.len() {
        return Err(InterpError::ValueCount {
            points: points.len(),
            values: values.len(),
        });
    }
    Interpolator::new(points, mode)?
        .stencil(queries)
        .apply(values, FILL_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SQUARE: [[f64; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];

    fn lattice_3d(n: usize) -> Vec<[f64; 3]> {
        let h = 1.0 / (n - 1) as f64;
        let mut pts = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    pts.push([i as f64 * h, j as f64 * h, k as f64 * h]);
                }
            }
        }
        pts
    }

    #[test]
    fn test_exact_at_vertices() {
        let values = [0.0, 1.0, 2.0, 1.0];
        for mode in [InterpMode::Scattered2d, InterpMode::TriangulatedSurface] {
            let out = interpolate(&SQUARE, &values, &SQUARE, mode).unwrap();
            for (got, want) in out.iter().zip(values) {
                assert_relative_eq!(*got, want, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_constant_field_scenario() {
        // Uniform velocity (1, 0, 0) gives magnitude 1 everywhere in the hull.
        let values = [1.0; 4];
        let queries = [[0.5, 0.5, 0.0], [0.1, 0.9, 0.0], [2.0, 2.0, 0.0], [-0.05, 0.5, 0.0]];
        let out = interpolate(&SQUARE, &values, &queries, InterpMode::Scattered2d).unwrap();
        assert_relative_eq!(out[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[1], 1.0, epsilon = 1e-12);
        assert_eq!(out[2], FILL_VALUE, "outside the hull must be the fill value");
        assert_eq!(out[3], FILL_VALUE);
    }

    #[test]
    fn test_linear_field_reproduced() {
        // Piecewise-linear interpolation is exact for a linear field.
        let pts: Vec<[f64; 3]> = (0..7)
            .flat_map(|j| (0..7).map(move |i| [i as f64 / 6.0, j as f64 / 6.0, 0.0]))
            .collect();
        let values: Vec<f64> = pts.iter().map(|p| 2.0 * p[0] - p[1] + 0.5).collect();
        let queries = [[0.33, 0.71, 0.0], [0.05, 0.02, 0.0], [0.99, 0.5, 0.0]];
        let out = interpolate(&pts, &values, &queries, InterpMode::Scattered2d).unwrap();
        for (q, v) in queries.iter().zip(out) {
            assert_relative_eq!(v, 2.0 * q[0] - q[1] + 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_linear_3d_slice() {
        let pts = lattice_3d(4);
        let values: Vec<f64> = pts.iter().map(|p| p[0] + 2.0 * p[1] + 3.0 * p[2]).collect();
        let queries = [[0.4, 0.6, 0.5], [0.9, 0.1, 0.25], [0.5, 0.5, 1.5]];
        let out = interpolate(&pts, &values, &queries, InterpMode::Linear3d).unwrap();
        assert_relative_eq!(out[0], 0.4 + 1.2 + 1.5, epsilon = 1e-9);
        assert_relative_eq!(out[1], 0.9 + 0.2 + 0.75, epsilon = 1e-9);
        assert_eq!(out[2], FILL_VALUE);
    }

    #[test]
    fn test_linear_3d_on_flat_mesh() {
        let values = [0.0, 1.0, 2.0, 1.0];
        let on_plane = interpolate(&SQUARE, &values, &[[0.5, 0.5, 0.0]], InterpMode::Linear3d).unwrap();
        assert_relative_eq!(on_plane[0], 1.0, epsilon = 1e-9);
        let off_plane = interpolate(&SQUARE, &values, &[[0.5, 0.5, 0.3]], InterpMode::Linear3d).unwrap();
        assert_eq!(off_plane[0], FILL_VALUE);
    }

    #[test]
    fn test_stencil_reuse_matches_one_shot() {
        let pts = lattice_3d(3);
        let interp = Interpolator::new(&pts, InterpMode::Linear3d).unwrap();
        assert_eq!(interp.mode(), InterpMode::Linear3d);
        assert!(interp.simplex_count() >= 8, "at least one tetrahedron per lattice cell");
        let queries: Vec<[f64; 3]> = (0..10).map(|i| [i as f64 / 9.0, 0.3, 0.5]).collect();
        let stencil = interp.stencil(&queries);
        assert_eq!(stencil.len(), 10);
        assert_eq!(stencil.inside_count(), 10);
        for frame in 0..3 {
            let values: Vec<f64> = pts.iter().map(|p| p[0] * frame as f64).collect();
            let a = stencil.apply(&values, FILL_VALUE).unwrap();
            let b = interpolate(&pts, &values, &queries, InterpMode::Linear3d).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_deterministic() {
        let pts: Vec<[f64; 3]> = (0..60)
            .map(|i| {
                let t = i as f64 * 0.61;
                [t.cos() * (i as f64).sqrt(), t.sin() * (i as f64).sqrt(), 0.0]
            })
            .collect();
        let values: Vec<f64> = (0..60).map(|i| (i as f64 * 0.3).sin()).collect();
        let queries: Vec<[f64; 3]> = (0..100)
            .map(|i| [(i % 10) as f64 - 5.0, (i / 10) as f64 - 5.0, 0.0])
            .collect();
        let a = interpolate(&pts, &values, &queries, InterpMode::Scattered2d).unwrap();
        let b = interpolate(&pts, &values, &queries, InterpMode::Scattered2d).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_errors() {
        let collinear = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        assert!(matches!(
            interpolate(&collinear, &[1.0; 3], &[[0.5, 0.0, 0.0]], InterpMode::Scattered2d),
            Err(InterpError::Degenerate(_))
        ));
        assert_eq!(
            interpolate(&SQUARE[..2], &[1.0; 2], &[], InterpMode::Scattered2d),
            Err(InterpError::TooFewPoints { needed: 3, got: 2 })
        );
        assert_eq!(
            interpolate(&SQUARE, &[1.0; 3], &[], InterpMode::Scattered2d),
            Err(InterpError::ValueCount { points: 4, values: 3 })
        );
    }

    #[test]
    fn test_non_finite_query_is_outside() {
        let out = interpolate(&SQUARE, &[1.0; 4], &[[f64::NAN, 0.5, 0.0]], InterpMode::Scattered2d).unwrap();
        assert_eq!(out[0], FILL_VALUE);
    }

    #[test]
    fn test_mode_defaults() {
        assert_eq!(InterpMode::Scattered2d.default_colormap(), ColorMap::Viridis);
        assert_eq!(InterpMode::Linear3d.name(), "linear-3d");
        assert!(!InterpMode::TriangulatedSurface.uses_grid());
    }
}
