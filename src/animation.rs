//! Animated GIF serialization for RGBA frame buffers.
//!
//! The whole animation is encoded in memory and written with a single call,
//! so a failed run never leaves a truncated artifact behind.

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use std::fs;
use std::path::Path;

use crate::error::RenderError;

/// Number of channels in RGBA8 format.
const RGBA8_CHANNELS: usize = 4;
pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 65535;
pub const MAX_FPS: u32 = 100;
/// NeuQuant sampling speed: 1 is best quality, 30 fastest.
const QUANTIZER_SPEED: i32 = 10;

/// Frame size in whole pixels for a figure of `pixels` (width, height).
pub fn frame_size(pixels: (f64, f64)) -> Result<(u32, u32), RenderError> {
    let check = |v: f64, axis: &str| {
        let px = v.round();
        if px.is_finite() && px >= MIN_DIMENSION as f64 && px <= MAX_DIMENSION as f64 {
            Ok(px as u32)
        } else {
            Err(RenderError::UnsupportedOutput(format!(
                "figure {axis} of {v} px is outside {MIN_DIMENSION}..={MAX_DIMENSION}"
            )))
        }
    };
    Ok((check(pixels.0, "width")?, check(pixels.1, "height")?))
}

/// Reject parameters the GIF backend cannot honour before any work is done.
pub fn validate_output(path: &Path, fps: u32) -> Result<(), RenderError> {
    if !(1..=MAX_FPS).contains(&fps) {
        return Err(RenderError::UnsupportedOutput(format!(
            "fps {fps} is outside 1..={MAX_FPS}"
        )));
    }
    let is_gif = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
    if !is_gif {
        return Err(RenderError::UnsupportedOutput(format!(
            "{} is not a .gif path",
            path.display()
        )));
    }
    Ok(())
}

/// Encode tightly packed RGBA8 frames into an infinitely looping GIF with
/// `1000 / fps` ms per frame.
pub fn encode_gif<I>(frames: I, width: u32, height: u32, fps: u32) -> Result<Vec<u8>, RenderError>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(RGBA8_CHANNELS))
        .ok_or_else(|| RenderError::UnsupportedOutput("frame dimensions overflow".to_string()))?;

    let mut bytes = Vec::new();
    let mut count = 0usize;
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, QUANTIZER_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        for rgba in frames {
            if rgba.len() != expected {
                return Err(RenderError::UnsupportedOutput(format!(
                    "frame {count} has {} bytes, expected {expected}",
                    rgba.len()
                )));
            }
            let image = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
                RenderError::UnsupportedOutput(format!("frame {count} does not fit {width}x{height}"))
            })?;
            let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
            encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
            count += 1;
        }
    }
    if count == 0 {
        return Err(RenderError::NoFrames);
    }
    Ok(bytes)
}

/// Write the finished artifact, creating the parent directory if needed.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let io_err = |source| RenderError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height).flat_map(|_| [rgb[0], rgb[1], rgb[2], 255]).collect()
    }

    #[test]
    fn test_encode_gif_header_and_loop() {
        let frames = vec![solid(64, 64, [255, 0, 0]), solid(64, 64, [0, 0, 255])];
        let bytes = encode_gif(frames, 64, 64, 25).unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
        // NETSCAPE2.0 application extension marks a looping animation.
        assert!(bytes.windows(11).any(|w| w == b"NETSCAPE2.0"));
        assert_eq!(bytes.last(), Some(&0x3B), "GIF trailer");
    }

    #[test]
    fn test_encode_gif_frame_delay() {
        let bytes = encode_gif(vec![solid(64, 64, [0, 0, 0])], 64, 64, 25).unwrap();
        // Graphic control extension: 21 F9 04 <flags> <delay lo> <delay hi>, in 1/100 s.
        let gce = bytes
            .windows(3)
            .position(|w| w == [0x21, 0xF9, 0x04])
            .unwrap();
        let delay = u16::from_le_bytes([bytes[gce + 4], bytes[gce + 5]]);
        assert_eq!(delay, 4, "1000/25 ms = 4 centiseconds");
    }

    #[test]
    fn test_encode_gif_rejects_wrong_buffer() {
        let err = encode_gif(vec![vec![0u8; 10]], 64, 64, 25).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedOutput(_)));
        let err = encode_gif(Vec::new(), 64, 64, 25).unwrap_err();
        assert!(matches!(err, RenderError::NoFrames));
    }

    #[test]
    fn test_validate_output() {
        assert!(validate_output(Path::new("out.gif"), 25).is_ok());
        assert!(validate_output(Path::new("dir/OUT.GIF"), 1).is_ok());
        for (path, fps) in [("out.gif", 0), ("out.gif", 101), ("out.mp4", 25), ("out", 25)] {
            assert!(
                matches!(validate_output(Path::new(path), fps), Err(RenderError::UnsupportedOutput(_))),
                "{path} at {fps} fps should be rejected"
            );
        }
    }

    #[test]
    fn test_frame_size_bounds() {
        assert_eq!(frame_size((1200.0, 960.0)).unwrap(), (1200, 960));
        assert!(frame_size((63.0, 960.0)).is_err());
        assert!(frame_size((1200.0, 70000.0)).is_err());
        assert!(frame_size((f64::NAN, 100.0)).is_err());
    }

    #[test]
    fn test_write_artifact_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/anim.gif");
        write_artifact(&path, b"GIF89a").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"GIF89a");
    }
}
