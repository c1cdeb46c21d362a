use crate::error::GridError;

/// Fraction of each axis range added on both sides of the bounding box.
pub const PADDING: f64 = 0.05;

/// Axis-aligned box `[min, max]` per axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn of(points: &[[f64; 3]]) -> Result<Self, GridError> {
        if points.is_empty() {
            return Err(GridError::EmptyPoints);
        }
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for (i, p) in points.iter().enumerate() {
            if p.iter().any(|c| !c.is_finite()) {
                return Err(GridError::NonFinite(i));
            }
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Ok(Self { min, max })
    }

    /// Grow each axis by `fraction` of its range; a zero range stays zero.
    pub fn padded(&self, fraction: f64) -> Self {
        let mut out = *self;
        for axis in 0..3 {
            let pad = fraction * (self.max[axis] - self.min[axis]);
            out.min[axis] -= pad;
            out.max[axis] += pad;
        }
        out
    }

    pub fn span(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }
}

/// `n` evenly spaced samples from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Regular sampling lattice shared by every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RegularGrid {
    pub resolution: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// `resolution / 2` levels for slicing.
    pub z: Vec<f64>,
    /// Padded bounds the nodes span.
    pub bounds: Bounds,
}

impl RegularGrid {
    /// Number of (x, y) nodes.
    pub fn len(&self) -> usize {
        self.x.len() * self.y.len()
    }

    /// Node `(i, j)`: column `i` along x, row `j` along y.
    pub fn node(&self, i: usize, j: usize) -> [f64; 2] {
        [self.x[i], self.y[j]]
    }

    /// All (x, y) nodes in row-major order (rows of constant y).
    pub fn nodes(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        (0..self.y.len()).flat_map(move |j| (0..self.x.len()).map(move |i| self.node(i, j)))
    }

    /// Query points on the plane `z`.
    pub fn plane(&self, z: f64) -> Vec<[f64; 3]> {
        self.nodes().map(|[x, y]| [x, y, z]).collect()
    }
}

/// Build the sampling grid from the reference point cloud.
pub fn build_grid(points: &[[f64; 3]], resolution: usize) -> Result<RegularGrid, GridError> {
    if resolution < 2 {
        return Err(GridError::Resolution(resolution));
    }
    let bounds = Bounds::of(points)?.padded(PADDING);
    let axis = |a: usize, n: usize| linspace(bounds.min[a], bounds.max[a], n);
    Ok(RegularGrid {
        resolution,
        x: axis(0, resolution),
        y: axis(1, resolution),
        z: axis(2, resolution / 2),
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud() -> Vec<[f64; 3]> {
        vec![
            [0.0, 0.0, -1.0],
            [2.0, 0.5, 1.0],
            [1.0, 1.0, 0.0],
            [0.5, 0.25, 0.5],
        ]
    }

    #[test]
    fn test_grid_shape() {
        for res in [2, 3, 7, 10, 150] {
            let grid = build_grid(&cloud(), res).unwrap();
            assert_eq!(grid.x.len(), res);
            assert_eq!(grid.y.len(), res);
            assert_eq!(grid.z.len(), res / 2);
            assert_eq!(grid.len(), res * res);
            assert_eq!(grid.nodes().count(), res * res);
        }
    }

    #[test]
    fn test_grid_padding() {
        let grid = build_grid(&cloud(), 11).unwrap();
        assert_relative_eq!(grid.x[0], -0.1);
        assert_relative_eq!(grid.x[10], 2.1);
        assert_relative_eq!(grid.y[0], -0.05);
        assert_relative_eq!(grid.y[10], 1.05);
        assert_relative_eq!(grid.z[0], -1.1);
        assert_relative_eq!(grid.z[4], 1.1);
    }

    #[test]
    fn test_nodes_inside_padded_bounds() {
        let grid = build_grid(&cloud(), 9).unwrap();
        for [x, y] in grid.nodes() {
            assert!(x >= grid.bounds.min[0] && x <= grid.bounds.max[0]);
            assert!(y >= grid.bounds.min[1] && y <= grid.bounds.max[1]);
        }
        for &z in &grid.z {
            assert!(z >= grid.bounds.min[2] && z <= grid.bounds.max[2]);
        }
    }

    #[test]
    fn test_nodes_row_major() {
        let grid = build_grid(&cloud(), 3).unwrap();
        let nodes: Vec<[f64; 2]> = grid.nodes().collect();
        assert_eq!(nodes[1], grid.node(1, 0));
        assert_eq!(nodes[3], grid.node(0, 1));
    }

    #[test]
    fn test_build_grid_idempotent() {
        let a = build_grid(&cloud(), 25).unwrap();
        let b = build_grid(&cloud(), 25).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flat_axis_has_zero_padding() {
        let flat = vec![[0.0, 0.0, 3.0], [1.0, 0.0, 3.0], [0.0, 1.0, 3.0]];
        let grid = build_grid(&flat, 4).unwrap();
        assert_eq!(grid.z, vec![3.0, 3.0]);
        assert!(grid.z.iter().all(|z| z.is_finite()));
    }

    #[test]
    fn test_single_z_level() {
        let grid = build_grid(&cloud(), 2).unwrap();
        assert_eq!(grid.z.len(), 1);
        assert_relative_eq!(grid.z[0], -1.1);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(build_grid(&[], 10), Err(GridError::EmptyPoints));
        assert_eq!(build_grid(&cloud(), 1), Err(GridError::Resolution(1)));
        let bad = vec![[0.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0]];
        assert_eq!(build_grid(&bad, 10), Err(GridError::NonFinite(1)));
    }

    #[test]
    fn test_linspace_endpoints_exact() {
        let v = linspace(-0.1, 2.1, 11);
        assert_eq!(v[0], -0.1);
        assert_eq!(v[10], 2.1);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
