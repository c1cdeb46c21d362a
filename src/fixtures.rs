// Test fixtures: small ascii VTU/PVTU files written to temporary directories.

use std::fs;
use std::path::{Path, PathBuf};

pub const UNIT_SQUARE: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn join(values: impl Iterator<Item = f64>) -> String {
    values.map(|v| format!("{v:e}")).collect::<Vec<_>>().join(" ")
}

pub fn vtu_ascii(points: &[[f64; 3]], fields: &[(&str, &[f64])]) -> String {
    let arrays: String = fields
        .iter()
        .map(|(name, values)| {
            format!(
                "        <DataArray type=\"Float64\" Name=\"{name}\" format=\"ascii\">{}</DataArray>\n",
                join(values.iter().copied())
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<VTKFile type="UnstructuredGrid" version="1.0" byte_order="LittleEndian" header_type="UInt32">
  <UnstructuredGrid>
    <Piece NumberOfPoints="{}" NumberOfCells="0">
      <PointData>
{arrays}      </PointData>
      <Points>
        <DataArray type="Float64" NumberOfComponents="3" format="ascii">{}</DataArray>
      </Points>
    </Piece>
  </UnstructuredGrid>
</VTKFile>
"#,
        points.len(),
        join(points.iter().flatten().copied())
    )
}

/// A frame with the same (u, v, w) at every point.
pub fn write_frame(dir: &Path, name: &str, points: &[[f64; 3]], uvw: [f64; 3]) -> PathBuf {
    let n = points.len();
    let u = vec![uvw[0]; n];
    let v = vec![uvw[1]; n];
    let w = vec![uvw[2]; n];
    write(dir, name, &vtu_ascii(points, &[("u", &u), ("v", &v), ("w", &w)]))
}

/// A frame with explicit per-point components.
pub fn write_frame_fields(dir: &Path, name: &str, points: &[[f64; 3]], u: &[f64], v: &[f64], w: &[f64]) -> PathBuf {
    write(dir, name, &vtu_ascii(points, &[("u", u), ("v", v), ("w", w)]))
}

pub fn pvtu(sources: &[&str]) -> String {
    let pieces: String = sources
        .iter()
        .map(|s| format!("    <Piece Source=\"{s}\"/>\n"))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<VTKFile type="PUnstructuredGrid" version="1.0" byte_order="LittleEndian">
  <PUnstructuredGrid GhostLevel="0">
    <PPointData>
      <PDataArray type="Float64" Name="u"/>
      <PDataArray type="Float64" Name="v"/>
      <PDataArray type="Float64" Name="w"/>
    </PPointData>
    <PPoints>
      <PDataArray type="Float64" NumberOfComponents="3"/>
    </PPoints>
{pieces}  </PUnstructuredGrid>
</VTKFile>
"#
    )
}
