use serde::Deserialize;

/// Selects which color palette to use for field rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// Perceptually uniform: deep purple -> teal -> yellow.
    Viridis,
    /// Indigo -> magenta -> orange -> yellow.
    Plasma,
    /// Black -> purple -> red -> pale yellow.
    Inferno,
}

impl ColorMap {
    pub fn name(self) -> &'static str {
        match self {
            ColorMap::Viridis => "viridis",
            ColorMap::Plasma => "plasma",
            ColorMap::Inferno => "inferno",
        }
    }
}

/// Viridis sampled at eighths of the unit interval.
pub(crate) const VIRIDIS_STOPS: [(f64, f64, f64); 9] = [
    (68.0, 1.0, 84.0),    // #440154 (0.000)
    (72.0, 40.0, 120.0),  // #482878 (0.125)
    (62.0, 73.0, 137.0),  // #3e4989 (0.250)
    (49.0, 104.0, 142.0), // #31688e (0.375)
    (38.0, 130.0, 142.0), // #26828e (0.500)
    (31.0, 158.0, 137.0), // #1f9e89 (0.625)
    (53.0, 183.0, 121.0), // #35b779 (0.750)
    (110.0, 206.0, 88.0), // #6ece58 (0.875)
    (253.0, 231.0, 37.0), // #fde725 (1.000)
];

pub(crate) const PLASMA_STOPS: [(f64, f64, f64); 9] = [
    (13.0, 8.0, 135.0),   // #0d0887
    (75.0, 3.0, 161.0),   // #4b03a1
    (125.0, 3.0, 168.0),  // #7d03a8
    (168.0, 34.0, 150.0), // #a82296
    (203.0, 70.0, 121.0), // #cb4679
    (229.0, 107.0, 93.0), // #e56b5d
    (248.0, 148.0, 65.0), // #f89441
    (253.0, 195.0, 40.0), // #fdc328
    (240.0, 249.0, 33.0), // #f0f921
];

pub(crate) const INFERNO_STOPS: [(f64, f64, f64); 9] = [
    (0.0, 0.0, 4.0),       // #000004
    (27.0, 12.0, 65.0),    // #1b0c41
    (74.0, 12.0, 107.0),   // #4a0c6b
    (120.0, 28.0, 109.0),  // #781c6d
    (165.0, 44.0, 96.0),   // #a52c60
    (207.0, 68.0, 70.0),   // #cf4446
    (237.0, 105.0, 37.0),  // #ed6925
    (251.0, 155.0, 6.0),   // #fb9b06
    (252.0, 255.0, 164.0), // #fcffa4
];

/// Convert a [0.0, 1.0] value to RGBA using the specified color map.
pub fn map_to_rgba(t: f64, colormap: ColorMap) -> [u8; 4] {
    let stops: &[(f64, f64, f64)] = match colormap {
        ColorMap::Viridis => &VIRIDIS_STOPS,
        ColorMap::Plasma => &PLASMA_STOPS,
        ColorMap::Inferno => &INFERNO_STOPS,
    };

    let segments = stops.len() - 1;
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let seg = t * segments as f64;
    let i = (seg as usize).min(segments - 1);
    let s = seg - i as f64;

    let (r0, g0, b0) = stops[i];
    let (r1, g1, b1) = stops[i + 1];

    [
        (r0 + s * (r1 - r0)).round() as u8,
        (g0 + s * (g1 - g0)).round() as u8,
        (b0 + s * (b1 - b0)).round() as u8,
        255,
    ]
}

/// Color bar layout constants, in unscaled pixels.
pub(crate) const BAR_GAP: usize = 8;
pub(crate) const BAR_WIDTH: usize = 14;
pub(crate) const TICK_LEN: usize = 3;
pub(crate) const LABEL_GAP: usize = 2;
/// Room for a label such as `1.23e-04`.
pub(crate) const LABEL_WIDTH: usize = 50;
pub(crate) const BAR_TOTAL: usize = BAR_GAP + BAR_WIDTH + TICK_LEN + LABEL_GAP + LABEL_WIDTH;

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ColorMap; 3] = [ColorMap::Viridis, ColorMap::Plasma, ColorMap::Inferno];

    #[test]
    fn test_viridis_endpoints() {
        assert_eq!(map_to_rgba(0.0, ColorMap::Viridis), [68, 1, 84, 255]);
        assert_eq!(map_to_rgba(1.0, ColorMap::Viridis), [253, 231, 37, 255]);
        assert_eq!(map_to_rgba(0.5, ColorMap::Viridis), [38, 130, 142, 255]);
    }

    #[test]
    fn test_inferno_starts_black() {
        let rgba = map_to_rgba(0.0, ColorMap::Inferno);
        assert_eq!(rgba, [0, 0, 4, 255], "inferno should start near black");
        let hot = map_to_rgba(1.0, ColorMap::Inferno);
        assert_eq!(hot[0], 252, "R");
        assert_eq!(hot[1], 255, "G");
    }

    #[test]
    fn test_plasma_midpoint() {
        let rgba = map_to_rgba(0.5, ColorMap::Plasma);
        assert_eq!(rgba, [203, 70, 121, 255]);
    }

    #[test]
    fn test_color_clamp() {
        for cmap in ALL {
            assert_eq!(map_to_rgba(-1.0, cmap), map_to_rgba(0.0, cmap));
            assert_eq!(map_to_rgba(2.0, cmap), map_to_rgba(1.0, cmap));
            assert_eq!(map_to_rgba(f64::NAN, cmap), map_to_rgba(0.0, cmap));
        }
    }

    #[test]
    fn test_gradient_continuity() {
        let steps = 256;
        for cmap in ALL {
            for i in 1..steps {
                let t0 = (i - 1) as f64 / (steps - 1) as f64;
                let t1 = i as f64 / (steps - 1) as f64;
                let c0 = map_to_rgba(t0, cmap);
                let c1 = map_to_rgba(t1, cmap);
                for ch in 0..3 {
                    let diff = (c1[ch] as i32 - c0[ch] as i32).abs();
                    assert!(
                        diff <= 6,
                        "{} channel {} jumped by {} between t={} and t={}",
                        cmap.name(), ch, diff, t0, t1
                    );
                }
            }
        }
    }

    #[test]
    fn test_deserialize_lowercase() {
        let cmap: ColorMap = serde_yaml::from_str("inferno").unwrap();
        assert_eq!(cmap, ColorMap::Inferno);
        assert!(serde_yaml::from_str::<ColorMap>("jet").is_err());
    }
}
