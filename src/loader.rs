// Frame discovery, ordering and piece merging.

use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{FrameError, LoadError};
use crate::vtu::{self, PieceData};

/// How frames are laid out in the data directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Manifest layout if any manifest file is present, single-file otherwise.
    Auto,
    /// One `.vtu` per frame, selected by filename suffix.
    Single,
    /// One `.pvtu` manifest per frame referencing piece files.
    Manifest,
}

/// One time sample: merged points and per-point field arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position in the loaded sequence (skipped files leave no gap).
    pub index: usize,
    pub name: String,
    pub points: Vec<[f64; 3]>,
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn timestamp(&self, dt: f64) -> f64 {
        self.index as f64 * dt
    }

    pub fn component(&self, key: &str) -> Option<&[f64]> {
        self.fields.get(key).map(Vec::as_slice)
    }
}

/// The loaded sequence and how many frame files were found for it.
#[derive(Debug)]
pub struct FrameSet {
    pub frames: Vec<Frame>,
    pub discovered: usize,
    /// Manifest pieces that could not be read, across all loaded frames.
    pub skipped_pieces: usize,
}

impl FrameSet {
    /// First successfully loaded frame; its points define the spatial setup.
    pub fn reference(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn skipped(&self) -> usize {
        self.discovered - self.frames.len()
    }
}

/// List frame descriptors in `dir` and decide the layout.
pub fn discover(
    dir: &Path,
    layout: Layout,
    frame_suffix: &str,
    manifest_extension: &str,
) -> Result<(Layout, Vec<String>), LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    let manifest_suffix = format!(".{manifest_extension}");
    let resolved = match layout {
        Layout::Auto if names.iter().any(|n| n.ends_with(&manifest_suffix)) => Layout::Manifest,
        Layout::Auto => Layout::Single,
        other => other,
    };
    let suffix = match resolved {
        Layout::Manifest => manifest_suffix.as_str(),
        _ => frame_suffix,
    };
    names.retain(|n| n.ends_with(suffix));
    Ok((resolved, order_frame_names(names, suffix)))
}

/// Numeric ordering key: the leading `_`-separated segment of the stem if it
/// is an integer, otherwise the trailing one.
fn frame_key(name: &str, suffix: &str) -> Option<u64> {
    let stem = name.strip_suffix(suffix).unwrap_or(name);
    let mut segments = stem.split('_');
    let leading = segments.next()?;
    leading
        .parse()
        .ok()
        .or_else(|| stem.rsplit('_').next()?.parse().ok())
}

/// Sort numerically when every name carries a key, lexicographically otherwise.
pub fn order_frame_names(mut names: Vec<String>, suffix: &str) -> Vec<String> {
    let keys: Option<Vec<u64>> = names.iter().map(|n| frame_key(n, suffix)).collect();
    match keys {
        Some(keys) => {
            let mut keyed: Vec<(u64, String)> = keys.into_iter().zip(names).collect();
            keyed.sort();
            keyed.into_iter().map(|(_, name)| name).collect()
        }
        None => {
            names.sort();
            names
        }
    }
}

/// Read every piece a manifest lists; unreadable pieces are skipped and
/// counted.
fn load_manifest_frame(path: &Path) -> Result<(PieceData, usize), FrameError> {
    let sources = vtu::read_manifest(path)?;
    let mut merged = PieceData::default();
    let mut loaded = 0usize;
    for source in &sources {
        match vtu::read_vtu(source) {
            Ok(piece) => {
                merged.append(piece);
                loaded += 1;
            }
            Err(e) => warn!("Skipping piece {} of {}: {e}", source.display(), path.display()),
        }
    }
    if loaded == 0 {
        return Err(FrameError::NoPieces(sources.len()));
    }
    let n = merged.point_count();
    for (key, values) in &merged.fields {
        if values.len() != n {
            warn!(
                "{}: field '{key}' has {} values for {n} merged points (missing from some pieces)",
                path.display(),
                values.len()
            );
        }
    }
    Ok((merged, sources.len() - loaded))
}

fn validate(
    data: &PieceData,
    components: &[String],
    reference_points: Option<usize>,
) -> Result<(), FrameError> {
    let n = data.point_count();
    if n == 0 {
        return Err(FrameError::Empty);
    }
    if let Some(expected) = reference_points {
        if n != expected {
            return Err(FrameError::PointCount { expected, got: n });
        }
    }
    for component in components {
        let len = data.fields.get(component).map_or(0, Vec::len);
        if len != n {
            return Err(FrameError::Component {
                component: component.clone(),
                len,
                points: n,
            });
        }
    }
    Ok(())
}

/// Discover, order and load every frame. Frames that fail to load are logged
/// and left out; only an empty result is an error.
pub fn load_frames(cfg: &Config) -> Result<FrameSet, LoadError> {
    let dir = cfg.data_dir.as_path();
    let (layout, names) = discover(dir, cfg.layout, &cfg.frame_suffix, &cfg.manifest_extension)?;
    let total = names.len();
    info!("Found {total} frames in {} ({layout:?} layout)", dir.display());

    let mut frames: Vec<Frame> = Vec::with_capacity(total);
    let mut skipped_pieces = 0usize;
    for (i, name) in names.iter().enumerate() {
        let path: PathBuf = dir.join(name);
        let data = match layout {
            Layout::Manifest => load_manifest_frame(&path),
            _ => vtu::read_vtu(&path).map(|d| (d, 0)).map_err(FrameError::from),
        };
        let reference_points = frames.first().map(Frame::point_count);
        let result = data.and_then(|d| validate(&d.0, &cfg.components, reference_points).map(|_| d));
        match result {
            Ok((data, missing)) => {
                skipped_pieces += missing;
                frames.push(Frame {
                    index: frames.len(),
                    name: name.clone(),
                    points: data.points,
                    fields: data.fields,
                });
                info!("Loaded frame {}/{total}: {name}", i + 1);
            }
            Err(e) => warn!("Skipping frame {}/{total} ({name}): {e}", i + 1),
        }
    }

    if frames.is_empty() {
        return Err(LoadError::NoFrames {
            path: dir.to_path_buf(),
            discovered: total,
        });
    }
    if frames.len() < total {
        warn!(
            "Loaded {} of {total} discovered frames; the animation covers a partial sequence",
            frames.len()
        );
    }
    Ok(FrameSet {
        frames,
        discovered: total,
        skipped_pieces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, UNIT_SQUARE};

    fn config_for(dir: &Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_order_numeric_leading_segment() {
        let ordered = order_frame_names(names(&["10_0.vtu", "2_0.vtu", "1_0.vtu"]), "_0.vtu");
        assert_eq!(ordered, names(&["1_0.vtu", "2_0.vtu", "10_0.vtu"]));
    }

    #[test]
    fn test_order_numeric_trailing_segment() {
        let ordered = order_frame_names(
            names(&["out_0010.pvtu", "out_0002.pvtu", "out_0001.pvtu"]),
            ".pvtu",
        );
        assert_eq!(ordered, names(&["out_0001.pvtu", "out_0002.pvtu", "out_0010.pvtu"]));
    }

    #[test]
    fn test_order_falls_back_to_lexicographic() {
        // "final" has no numeric segment, so the whole set sorts as strings.
        let ordered = order_frame_names(names(&["10_0.vtu", "9_0.vtu", "final_0.vtu"]), "_0.vtu");
        assert_eq!(ordered, names(&["10_0.vtu", "9_0.vtu", "final_0.vtu"]));
    }

    #[test]
    fn test_order_ties_resolved_by_name() {
        let ordered = order_frame_names(names(&["b_1_0.vtu", "a_1_0.vtu", "0_0.vtu"]), "_0.vtu");
        assert_eq!(ordered, names(&["0_0.vtu", "a_1_0.vtu", "b_1_0.vtu"]));
    }

    #[test]
    fn test_discover_single_layout_filters_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["3_0.vtu", "1_0.vtu", "1_1.vtu", "notes.txt"] {
            fixtures::write(dir.path(), name, "");
        }
        let (layout, found) = discover(dir.path(), Layout::Auto, "_0.vtu", "pvtu").unwrap();
        assert_eq!(layout, Layout::Single);
        assert_eq!(found, names(&["1_0.vtu", "3_0.vtu"]));
    }

    #[test]
    fn test_discover_auto_prefers_manifests() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["out_1.pvtu", "out_1_0.vtu", "out_1_1.vtu"] {
            fixtures::write(dir.path(), name, "");
        }
        let (layout, found) = discover(dir.path(), Layout::Auto, "_0.vtu", "pvtu").unwrap();
        assert_eq!(layout, Layout::Manifest);
        assert_eq!(found, names(&["out_1.pvtu"]));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("absent"), Layout::Auto, "_0.vtu", "pvtu").unwrap_err();
        assert!(matches!(err, LoadError::Directory { .. }));
    }

    #[test]
    fn test_load_frames_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for (k, name) in ["2_0.vtu", "0_0.vtu", "1_0.vtu"].iter().enumerate() {
            fixtures::write_frame(dir.path(), name, &UNIT_SQUARE, [k as f64, 0.0, 0.0]);
        }
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.discovered, 3);
        let order: Vec<&str> = set.frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, vec!["0_0.vtu", "1_0.vtu", "2_0.vtu"]);
        assert_eq!(set.frames[2].index, 2);
        assert_eq!(set.frames[2].component("u"), Some(&[0.0; 4][..]));
        assert_eq!(set.frames[0].component("u"), Some(&[2.0; 4][..]));
    }

    #[test]
    fn test_corrupt_frame_is_skipped_and_indices_close_up() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "0_0.vtu", &UNIT_SQUARE, [1.0, 0.0, 0.0]);
        fixtures::write(dir.path(), "1_0.vtu", "<VTKFile type=\"UnstructuredGrid\"><Unst");
        fixtures::write_frame(dir.path(), "2_0.vtu", &UNIT_SQUARE, [2.0, 0.0, 0.0]);
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.frames.len(), 2);
        assert_eq!(set.skipped(), 1);
        assert_eq!(set.frames[1].name, "2_0.vtu");
        assert_eq!(set.frames[1].index, 1);
        assert_eq!(set.frames[1].timestamp(0.5), 0.5);
    }

    #[test]
    fn test_frame_with_oversized_binary_header_is_skipped() {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "0_0.vtu", &UNIT_SQUARE, [1.0, 0.0, 0.0]);
        let header = STANDARD.encode((u64::MAX - 2).to_le_bytes());
        let corrupt = fixtures::vtu_ascii(&UNIT_SQUARE, &[("v", &[0.0; 4]), ("w", &[0.0; 4])])
            .replace("header_type=\"UInt32\"", "header_type=\"UInt64\"")
            .replace(
                "<PointData>\n",
                &format!("<PointData>\n<DataArray type=\"Float64\" Name=\"u\" format=\"binary\">{header}</DataArray>\n"),
            );
        fixtures::write(dir.path(), "1_0.vtu", &corrupt);

        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.frames.len(), 1);
        assert_eq!(set.skipped(), 1);
    }

    #[test]
    fn test_frame_with_different_point_count_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "0_0.vtu", &UNIT_SQUARE, [1.0, 0.0, 0.0]);
        fixtures::write_frame(dir.path(), "1_0.vtu", &UNIT_SQUARE[..3], [1.0, 0.0, 0.0]);
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.frames.len(), 1);
        assert_eq!(set.reference().name, "0_0.vtu");
    }

    #[test]
    fn test_frame_missing_component_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "0_0.vtu", &UNIT_SQUARE, [1.0, 0.0, 0.0]);
        let only_u = fixtures::vtu_ascii(&UNIT_SQUARE, &[("u", &[1.0; 4])]);
        fixtures::write(dir.path(), "1_0.vtu", &only_u);
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.frames.len(), 1);
    }

    #[test]
    fn test_manifest_frame_skips_failed_piece() {
        let dir = tempfile::tempdir().unwrap();
        let left = [[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 1.0, 0.0]];
        fixtures::write_frame(dir.path(), "out_1_0.vtu", &left, [1.0, 0.0, 0.0]);
        // The second piece is referenced but never written.
        fixtures::write(
            dir.path(),
            "out_1.pvtu",
            &fixtures::pvtu(&["out_1_0.vtu", "out_1_1.vtu"]),
        );
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.frames.len(), 1);
        assert_eq!(set.skipped(), 0);
        assert_eq!(set.skipped_pieces, 1);
        assert_eq!(set.reference().point_count(), left.len());
        assert_eq!(set.reference().component("u").map(<[f64]>::len), Some(3));
    }

    #[test]
    fn test_manifest_pieces_concatenate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "p_a.vtu", &UNIT_SQUARE[..2], [1.0, 0.0, 0.0]);
        fixtures::write_frame(dir.path(), "p_b.vtu", &UNIT_SQUARE[2..], [2.0, 0.0, 0.0]);
        fixtures::write(dir.path(), "run_7.pvtu", &fixtures::pvtu(&["p_b.vtu", "p_a.vtu"]));
        let set = load_frames(&config_for(dir.path())).unwrap();
        assert_eq!(set.skipped_pieces, 0);
        let frame = set.reference();
        assert_eq!(frame.points[0], UNIT_SQUARE[2]);
        assert_eq!(frame.component("u"), Some(&[2.0, 2.0, 1.0, 1.0][..]));
    }

    #[test]
    fn test_manifest_key_missing_from_a_piece_yields_short_array() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_frame(dir.path(), "p_a.vtu", &UNIT_SQUARE[..2], [1.0, 0.0, 0.0]);
        let without_extra = fixtures::vtu_ascii(
            &UNIT_SQUARE[2..],
            &[("u", &[1.0, 1.0]), ("v", &[0.0, 0.0]), ("w", &[0.0, 0.0]), ("p", &[5.0, 6.0])],
        );
        fixtures::write(dir.path(), "p_b.vtu", &without_extra);
        fixtures::write(dir.path(), "run_1.pvtu", &fixtures::pvtu(&["p_a.vtu", "p_b.vtu"]));
        let set = load_frames(&config_for(dir.path())).unwrap();
        let frame = set.reference();
        assert_eq!(frame.point_count(), 4);
        assert_eq!(frame.component("p"), Some(&[5.0, 6.0][..]));
    }

    #[test]
    fn test_all_frames_failing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write(dir.path(), "0_0.vtu", "garbage");
        fixtures::write(dir.path(), "1_0.vtu", "");
        let err = load_frames(&config_for(dir.path())).unwrap_err();
        match err {
            LoadError::NoFrames { discovered, .. } => assert_eq!(discovered, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
