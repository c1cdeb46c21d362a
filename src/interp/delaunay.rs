//! Bowyer–Watson Delaunay triangulation (2D) and tetrahedralization (3D).
//!
//! Input points are translated and uniformly scaled into the unit box before
//! insertion, and each vertex is nudged by a deterministic offset far below
//! mesh spacing so that co-circular (co-spherical) configurations, common on
//! structured meshes, resolve consistently.

use std::collections::{BTreeMap, HashMap};

use crate::error::InterpError;

/// Half-width of the enclosing super-simplex, in normalized units.
const SUPER_SCALE: f64 = 100.0;
/// Magnitude of the tie-breaking offset, in normalized units.
const JOGGLE: f64 = 1e-11;
/// Relative volume below which a simplex is treated as flat.
const FLAT_EPS: f64 = 1e-14;

/// A Delaunay decomposition of `D`-dimensional points into simplices of
/// `K = D + 1` vertices.
#[derive(Debug, Clone)]
pub struct Delaunay<const D: usize, const K: usize> {
    /// Normalized coordinates of the distinct input points.
    pub vertices: Vec<[f64; D]>,
    /// Input index each vertex was taken from (first occurrence of duplicates).
    pub source: Vec<usize>,
    pub simplices: Vec<[usize; K]>,
    origin: [f64; D],
    scale: f64,
}

pub type Triangulation = Delaunay<2, 3>;
pub type Tetrahedralization = Delaunay<3, 4>;

impl<const D: usize, const K: usize> Delaunay<D, K> {
    /// Map an input-space point into the normalized frame of `vertices`.
    pub fn normalize(&self, p: [f64; D]) -> [f64; D] {
        std::array::from_fn(|a| (p[a] - self.origin[a]) / self.scale)
    }

    /// Input-space extent used for normalization.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Simplex vertex coordinates (normalized).
    pub fn corners(&self, simplex: usize) -> [[f64; D]; K] {
        self.simplices[simplex].map(|v| self.vertices[v])
    }

    /// Axis-aligned bounds of a simplex in the first two (normalized) axes.
    pub fn xy_bounds(&self, simplex: usize) -> ([f64; 2], [f64; 2]) {
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for p in self.corners(simplex) {
            for a in 0..2 {
                lo[a] = lo[a].min(p[a]);
                hi[a] = hi[a].max(p[a]);
            }
        }
        (lo, hi)
    }
}

impl Triangulation {
    pub fn new(points: &[[f64; 2]]) -> Result<Self, InterpError> {
        let c = 0.5;
        let d = SUPER_SCALE;
        let super_triangle = [[c - d, c - d], [c + d, c - d], [c, c + d]];
        let tri = build(points, super_triangle, circumcircle, triangle_area)?;
        if tri.simplices.is_empty() {
            return Err(InterpError::Degenerate("all points are collinear"));
        }
        Ok(tri)
    }

    /// Barycentric coordinates of normalized `q` in triangle `t`, or `None`
    /// for a flat triangle.
    pub fn barycentric(&self, t: usize, q: [f64; 2]) -> Option<[f64; 3]> {
        let [a, b, c] = self.corners(t);
        let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
        if det.abs() <= FLAT_EPS {
            return None;
        }
        let l1 = ((b[1] - c[1]) * (q[0] - c[0]) + (c[0] - b[0]) * (q[1] - c[1])) / det;
        let l2 = ((c[1] - a[1]) * (q[0] - c[0]) + (a[0] - c[0]) * (q[1] - c[1])) / det;
        Some([l1, l2, 1.0 - l1 - l2])
    }
}

impl Tetrahedralization {
    pub fn new(points: &[[f64; 3]]) -> Result<Self, InterpError> {
        // Vertices (a,a,a), (b,a,a), (a,b,a), (a,a,b) enclose the unit cube
        // with a wide margin.
        let a = -SUPER_SCALE;
        let b = 3.0 * SUPER_SCALE + 1.0;
        let super_tet = [[a, a, a], [b, a, a], [a, b, a], [a, a, b]];
        let tet = build(points, super_tet, circumsphere, tetra_volume)?;
        if tet.simplices.is_empty() {
            return Err(InterpError::Degenerate("all points are coplanar"));
        }
        Ok(tet)
    }

    pub fn barycentric(&self, t: usize, q: [f64; 3]) -> Option<[f64; 4]> {
        let [a, b, c, d] = self.corners(t);
        let (ad, bd, cd, qd) = (sub(a, d), sub(b, d), sub(c, d), sub(q, d));
        let det = dot(ad, cross(bd, cd));
        if det.abs() <= FLAT_EPS {
            return None;
        }
        let l1 = dot(qd, cross(bd, cd)) / det;
        let l2 = dot(ad, cross(qd, cd)) / det;
        let l3 = dot(ad, cross(bd, qd)) / det;
        Some([l1, l2, l3, 1.0 - l1 - l2 - l3])
    }
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dist2<const D: usize>(a: [f64; D], b: [f64; D]) -> f64 {
    (0..D).map(|k| (a[k] - b[k]) * (a[k] - b[k])).sum()
}

fn triangle_area(p: &[[f64; 2]; 3]) -> f64 {
    let (bx, by) = (p[1][0] - p[0][0], p[1][1] - p[0][1]);
    let (cx, cy) = (p[2][0] - p[0][0], p[2][1] - p[0][1]);
    0.5 * (bx * cy - by * cx).abs()
}

fn tetra_volume(p: &[[f64; 3]; 4]) -> f64 {
    dot(sub(p[1], p[0]), cross(sub(p[2], p[0]), sub(p[3], p[0]))).abs() / 6.0
}

fn circumcircle(p: &[[f64; 2]; 3]) -> Option<([f64; 2], f64)> {
    let [ax, ay] = p[0];
    let (bx, by) = (p[1][0] - ax, p[1][1] - ay);
    let (cx, cy) = (p[2][0] - ax, p[2][1] - ay);
    let d = 2.0 * (bx * cy - by * cx);
    if d == 0.0 {
        return None;
    }
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    let r2 = ux * ux + uy * uy;
    r2.is_finite().then_some(([ax + ux, ay + uy], r2))
}

fn circumsphere(p: &[[f64; 3]; 4]) -> Option<([f64; 3], f64)> {
    let a = p[0];
    let (u, v, w) = (sub(p[1], a), sub(p[2], a), sub(p[3], a));
    let (vw, wu, uv) = (cross(v, w), cross(w, u), cross(u, v));
    let det = 2.0 * dot(u, vw);
    if det == 0.0 {
        return None;
    }
    let (uu, vv, ww) = (dot(u, u), dot(v, v), dot(w, w));
    let off: [f64; 3] = std::array::from_fn(|k| (uu * vw[k] + vv * wu[k] + ww * uv[k]) / det);
    let r2 = dot(off, off);
    r2.is_finite()
        .then_some(([a[0] + off[0], a[1] + off[1], a[2] + off[2]], r2))
}

struct Simplex<const D: usize, const K: usize> {
    v: [usize; K],
    center: [f64; D],
    r2: f64,
}

/// Sorted face of `v` without vertex slot `omit`; the last slot is unused.
fn face_key<const K: usize>(v: [usize; K], omit: usize) -> [usize; K] {
    let mut key = [usize::MAX; K];
    let mut j = 0;
    for (k, &idx) in v.iter().enumerate() {
        if k != omit {
            key[j] = idx;
            j += 1;
        }
    }
    key[..K - 1].sort_unstable();
    key
}

/// Deterministic offsets in [-JOGGLE, JOGGLE), one per vertex and axis.
fn joggle<const D: usize>(count: usize) -> Vec<[f64; D]> {
    let mut rng: u64 = 0x5EED_DE1A_A11E_0001;
    let mut next = || {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (rng >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..count)
        .map(|_| std::array::from_fn(|_| (2.0 * next() - 1.0) * JOGGLE))
        .collect()
}

fn build<const D: usize, const K: usize>(
    points: &[[f64; D]],
    super_vertices: [[f64; D]; K],
    circum: fn(&[[f64; D]; K]) -> Option<([f64; D], f64)>,
    measure: fn(&[[f64; D]; K]) -> f64,
) -> Result<Delaunay<D, K>, InterpError> {
    // Merge exact duplicates, keeping the first occurrence.
    let mut seen: HashMap<[u64; D], usize> = HashMap::with_capacity(points.len());
    let mut unique: Vec<[f64; D]> = Vec::with_capacity(points.len());
    let mut source = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        // -0.0 and 0.0 are the same location.
        let key = p.map(|c| if c == 0.0 { 0u64 } else { c.to_bits() });
        if let std::collections::hash_map::Entry::Vacant(e) = seen.entry(key) {
            e.insert(unique.len());
            unique.push(*p);
            source.push(i);
        }
    }
    if unique.len() < K {
        return Err(InterpError::TooFewPoints {
            needed: K,
            got: unique.len(),
        });
    }

    let mut origin = [f64::INFINITY; D];
    let mut upper = [f64::NEG_INFINITY; D];
    for p in &unique {
        for a in 0..D {
            origin[a] = origin[a].min(p[a]);
            upper[a] = upper[a].max(p[a]);
        }
    }
    let scale = (0..D).map(|a| upper[a] - origin[a]).fold(0.0_f64, f64::max);
    if !(scale.is_finite() && scale > 0.0) {
        return Err(InterpError::Degenerate("points have no spatial extent"));
    }
    let vertices: Vec<[f64; D]> = unique
        .iter()
        .map(|p| std::array::from_fn(|a| (p[a] - origin[a]) / scale))
        .collect();

    // Insertion runs on jittered copies; the stored vertices stay exact.
    let n = vertices.len();
    let mut work: Vec<[f64; D]> = vertices
        .iter()
        .zip(joggle::<D>(n))
        .map(|(p, j)| std::array::from_fn(|a| p[a] + j[a]))
        .collect();
    work.extend(super_vertices);

    let make = |work: &[[f64; D]], v: [usize; K]| {
        let corners = v.map(|i| work[i]);
        match circum(&corners) {
            Some((center, r2)) => Simplex { v, center, r2 },
            None => Simplex {
                v,
                center: corners[0],
                r2: f64::INFINITY,
            },
        }
    };

    let mut simplices = vec![make(&work, std::array::from_fn(|k| n + k))];
    let mut bad: Vec<usize> = Vec::new();
    let mut faces: BTreeMap<[usize; K], u32> = BTreeMap::new();
    for i in 0..n {
        let p = work[i];
        bad.clear();
        bad.extend(
            simplices
                .iter()
                .enumerate()
                .filter(|(_, s)| dist2(p, s.center) < s.r2)
                .map(|(k, _)| k),
        );
        if bad.is_empty() {
            log::debug!("delaunay: vertex {i} fell outside every circumsphere and was skipped");
            continue;
        }

        faces.clear();
        for &k in bad.iter().rev() {
            let removed = simplices.swap_remove(k);
            for omit in 0..K {
                *faces.entry(face_key(removed.v, omit)).or_insert(0) += 1;
            }
        }
        for (face, &count) in &faces {
            if count == 1 {
                let mut v = *face;
                v[K - 1] = i;
                simplices.push(make(&work, v));
            }
        }
    }

    let simplices: Vec<[usize; K]> = simplices
        .into_iter()
        .map(|s| s.v)
        .filter(|v| v.iter().all(|&k| k < n))
        .filter(|v| measure(&v.map(|k| vertices[k])) > FLAT_EPS)
        .collect();
    log::debug!(
        "delaunay: {} vertices ({} duplicates merged), {} simplices",
        n,
        points.len() - n,
        simplices.len()
    );

    Ok(Delaunay {
        vertices,
        source,
        simplices,
        origin,
        scale,
    })
}
