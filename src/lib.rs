//! Render animated velocity-magnitude contour plots from a time series of
//! VTK XML unstructured-grid files (`.vtu`, or `.pvtu` with pieces).
//!
//! The run is a three stage pipeline, see [`pipeline`]: load and validate the
//! frames, build the sampling grid from the reference frame, then interpolate
//! and render every frame into one GIF.

pub mod animation;
pub mod config;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod grid;
pub mod interp;
pub mod loader;
pub mod pipeline;
pub mod renderer;
pub mod sequence;
pub mod summary;
pub mod vtu;
