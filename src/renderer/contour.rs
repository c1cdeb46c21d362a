// Filled-band quantization and marching-squares iso-lines on a lattice.

/// Band index of `v` among `levels` equal bands spanning [vmin, vmax].
pub fn band(v: f64, vmin: f64, vmax: f64, levels: usize) -> usize {
    let levels = levels.max(1);
    let span = vmax - vmin;
    if !(span > 0.0) || !v.is_finite() {
        return 0;
    }
    let t = ((v - vmin) / span).clamp(0.0, 1.0);
    ((t * levels as f64) as usize).min(levels - 1)
}

/// Color-map position of a band: first band 0.0, last band 1.0.
pub fn band_position(band: usize, levels: usize) -> f64 {
    if levels <= 1 {
        0.0
    } else {
        band as f64 / (levels - 1) as f64
    }
}

/// `n` iso-levels evenly spaced strictly inside (vmin, vmax).
pub fn line_levels(vmin: f64, vmax: f64, n: usize) -> Vec<f64> {
    if !(vmax > vmin) {
        return Vec::new();
    }
    (1..=n)
        .map(|k| vmin + (vmax - vmin) * k as f64 / (n + 1) as f64)
        .collect()
}

/// Segments of the iso-line `level` through a row-major `nx` x `ny` lattice,
/// in fractional (i, j) index coordinates.
pub fn isolines(values: &[f64], nx: usize, ny: usize, level: f64) -> Vec<[[f64; 2]; 2]> {
    let mut segments = Vec::new();
    if nx < 2 || ny < 2 || values.len() < nx * ny {
        return segments;
    }
    let at = |i: usize, j: usize| values[j * nx + i];

    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let v00 = at(i, j);
            let v10 = at(i + 1, j);
            let v11 = at(i + 1, j + 1);
            let v01 = at(i, j + 1);
            if [v00, v10, v11, v01].iter().any(|v| !v.is_finite()) {
                continue;
            }
            let case = (v00 >= level) as u8
                | ((v10 >= level) as u8) << 1
                | ((v11 >= level) as u8) << 2
                | ((v01 >= level) as u8) << 3;
            if case == 0 || case == 15 {
                continue;
            }

            let (fi, fj) = (i as f64, j as f64);
            let cross = |a: f64, b: f64| (level - a) / (b - a);
            // Bottom, right, top, left.
            let edge = |e: u8| -> [f64; 2] {
                match e {
                    0 => [fi + cross(v00, v10), fj],
                    1 => [fi + 1.0, fj + cross(v10, v11)],
                    2 => [fi + cross(v01, v11), fj + 1.0],
                    _ => [fi, fj + cross(v00, v01)],
                }
            };
            let centre_high = (v00 + v10 + v11 + v01) / 4.0 >= level;
            let pairs: &[(u8, u8)] = match case {
                1 | 14 => &[(3, 0)],
                2 | 13 => &[(0, 1)],
                3 | 12 => &[(3, 1)],
                4 | 11 => &[(1, 2)],
                6 | 9 => &[(0, 2)],
                7 | 8 => &[(3, 2)],
                5 if centre_high => &[(0, 1), (2, 3)],
                5 => &[(3, 0), (1, 2)],
                10 if centre_high => &[(3, 0), (1, 2)],
                _ => &[(0, 1), (2, 3)],
            };
            for &(a, b) in pairs {
                segments.push([edge(a), edge(b)]);
            }
        }
    }
    segments
}
