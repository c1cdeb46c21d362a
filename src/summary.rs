use serde::Serialize;
use std::fmt;

use crate::loader::Frame;
use crate::renderer::format_sci;

/// Range, mean and population standard deviation of a pooled sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

impl Stats {
    /// Single pass (Welford) over every value.
    pub fn of<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            count += 1;
            let delta = v - mean;
            mean += delta / count as f64;
            m2 += delta * (v - mean);
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self { min: 0.0, max: 0.0, mean: 0.0, std: 0.0, count };
        }
        Self {
            min,
            max,
            mean,
            std: (m2 / count as f64).sqrt(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub stats: Stats,
}

/// Descriptive statistics of the loaded sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub frames: usize,
    pub points: usize,
    pub dt: f64,
    pub total_time: f64,
    pub components: Vec<ComponentSummary>,
    pub magnitude: Stats,
}

/// Pool each component, and the velocity magnitude, across all frames and points.
pub fn summarize(frames: &[Frame], components: &[String], dt: f64) -> Summary {
    let pooled = |key: &str| Stats::of(frames.iter().filter_map(|f| f.component(key)).flatten());

    let magnitudes: Vec<f64> = frames
        .iter()
        .flat_map(|f| {
            (0..f.point_count()).map(move |i| {
                components
                    .iter()
                    .filter_map(|key| f.component(key).and_then(|c| c.get(i)))
                    .map(|v| v * v)
                    .sum::<f64>()
                    .sqrt()
            })
        })
        .collect();

    Summary {
        frames: frames.len(),
        points: frames.first().map_or(0, Frame::point_count),
        dt,
        total_time: frames.len().saturating_sub(1) as f64 * dt,
        components: components
            .iter()
            .map(|name| ComponentSummary {
                name: name.clone(),
                stats: pooled(name),
            })
            .collect(),
        magnitude: Stats::of(&magnitudes),
    }
}

fn write_stats(f: &mut fmt::Formatter<'_>, heading: &str, s: &Stats) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{heading}:")?;
    writeln!(f, "  Range: [{}, {}]", format_sci(s.min, 2), format_sci(s.max, 2))?;
    writeln!(f, "  Mean: {}", format_sci(s.mean, 2))?;
    writeln!(f, "  Std: {}", format_sci(s.std, 2))
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "DATA SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Number of frames: {}", self.frames)?;
        writeln!(f, "Number of points: {}", self.points)?;
        writeln!(f, "Time step: {} s", format_sci(self.dt, 2))?;
        writeln!(f, "Total time: {} s", format_sci(self.total_time, 2))?;
        for c in &self.components {
            write_stats(f, &format!("{} component", c.name.to_uppercase()), &c.stats)?;
        }
        write_stats(f, "Velocity Magnitude", &self.magnitude)?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn frame(index: usize, u: &[f64], v: &[f64], w: &[f64]) -> Frame {
        let mut fields = BTreeMap::new();
        fields.insert("u".to_string(), u.to_vec());
        fields.insert("v".to_string(), v.to_vec());
        fields.insert("w".to_string(), w.to_vec());
        Frame {
            index,
            name: format!("{index}_0.vtu"),
            points: vec![[0.0; 3]; u.len()],
            fields,
        }
    }

    fn uvw() -> Vec<String> {
        vec!["u".into(), "v".into(), "w".into()]
    }

    #[test]
    fn test_stats_population_std() {
        let s = Stats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.std, 2.0, epsilon = 1e-12);
        assert_eq!(s.count, 8);
    }

    #[test]
    fn test_stats_empty() {
        let s = Stats::of(&[] as &[f64]);
        assert_eq!(s.count, 0);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn test_summarize_pools_frames() {
        let frames = vec![
            frame(0, &[3.0, 0.0], &[4.0, 0.0], &[0.0, 0.0]),
            frame(1, &[1.0, 1.0], &[0.0, 0.0], &[0.0, 0.0]),
        ];
        let s = summarize(&frames, &uvw(), 1e-12);
        assert_eq!(s.frames, 2);
        assert_eq!(s.points, 2);
        assert_relative_eq!(s.total_time, 1e-12);
        assert_eq!(s.components[0].name, "u");
        assert_eq!(s.components[0].stats.max, 3.0);
        assert_relative_eq!(s.components[0].stats.mean, 1.25);
        assert_eq!(s.magnitude.max, 5.0);
        assert_eq!(s.magnitude.min, 0.0);
        assert_eq!(s.magnitude.count, 4);
    }

    #[test]
    fn test_display_matches_report_layout() {
        let frames = vec![frame(0, &[1.0], &[0.0], &[0.0])];
        let text = summarize(&frames, &uvw(), 1e-12).to_string();
        assert!(text.starts_with(&"=".repeat(50)));
        assert!(text.contains("DATA SUMMARY"));
        assert!(text.contains("Number of frames: 1"));
        assert!(text.contains("Time step: 1.00e-12 s"));
        assert!(text.contains("Total time: 0.00e+00 s"));
        assert!(text.contains("U component:\n  Range: [1.00e+00, 1.00e+00]"));
        assert!(text.contains("Velocity Magnitude:\n  Range: [1.00e+00, 1.00e+00]"));
        assert!(text.contains("  Std: 0.00e+00"));
    }

    #[test]
    fn test_summary_json() {
        let frames = vec![frame(0, &[1.0, 3.0], &[0.0, 0.0], &[0.0, 0.0])];
        let json = serde_json::to_value(summarize(&frames, &uvw(), 2e-9)).unwrap();
        assert_eq!(json["frames"], 1);
        assert_eq!(json["components"][0]["name"], "u");
        assert_eq!(json["components"][0]["stats"]["mean"], 2.0);
        assert_eq!(json["magnitude"]["max"], 3.0);
    }
}
