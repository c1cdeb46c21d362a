//! Error taxonomy for the pipeline stages.
//!
//! Reader and piece failures (`VtuError`) are recoverable: the loader logs them
//! and skips the unit. Everything wrapped by `PipelineError` aborts the run.

use std::path::PathBuf;

/// Failure while decoding a single VTK XML file.
#[derive(thiserror::Error, Debug)]
pub enum VtuError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },
    #[error("{path}: {message}")]
    Format { path: PathBuf, message: String },
    #[error("{path}: unsupported {what} '{value}'")]
    Unsupported {
        path: PathBuf,
        what: &'static str,
        value: String,
    },
}

/// Why a single frame was excluded from the sequence (recoverable).
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Read(#[from] VtuError),
    #[error("none of the {0} referenced pieces could be read")]
    NoPieces(usize),
    #[error("frame has no points")]
    Empty,
    #[error("component '{component}' has {len} values for {points} points")]
    Component {
        component: String,
        len: usize,
        points: usize,
    },
    #[error("frame has {got} points but the reference frame has {expected}")]
    PointCount { expected: usize, got: usize },
}

/// Fatal failures of the loading stage.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("cannot list data directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no frames loaded from {path} ({discovered} frame files discovered)")]
    NoFrames { path: PathBuf, discovered: usize },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GridError {
    #[error("reference point cloud is empty")]
    EmptyPoints,
    #[error("reference point cloud has a non-finite coordinate at point {0}")]
    NonFinite(usize),
    #[error("grid resolution must be at least 2, got {0}")]
    Resolution(usize),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum InterpError {
    #[error("need at least {needed} distinct points to triangulate, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("point set is degenerate ({0}); cannot triangulate")]
    Degenerate(&'static str),
    #[error("value count {values} does not match point count {points}")]
    ValueCount { points: usize, values: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("no frames to render")]
    NoFrames,
    #[error("output backend rejected parameters: {0}")]
    UnsupportedOutput(String),
    #[error("frame {frame}: field component '{component}' is missing or has the wrong length")]
    Component { frame: usize, component: String },
    #[error("interpolation failed: {0}")]
    Interp(#[from] InterpError),
    #[error("GIF encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A fatal error tagged with the stage that produced it.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("loading stage failed: {0}")]
    Load(#[from] LoadError),
    #[error("grid stage failed: {0}")]
    Grid(#[from] GridError),
    #[error("rendering stage failed: {0}")]
    Render(#[from] RenderError),
}
