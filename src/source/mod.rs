//! Frame providers
//!
//! Stand-ins for the emulator core: anything that can hand over one
//! RGB565 frame per call.

pub mod pattern;
pub mod raw;

use thiserror::Error;

use crate::video::layout::{GameGeometry, ImageLayout, LayoutError};

pub use pattern::TestPattern;
pub use raw::RawFrames;

/// Errors produced by frame sources
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short frame: expected {expected} bytes, got {got}")]
    ShortFrame { expected: usize, got: usize },

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Invalid geometry: {0}")]
    Layout(#[from] LayoutError),
}

/// Producer of emulator frames
pub trait FrameSource {
    /// Visible screen the frames describe
    fn geometry(&self) -> GameGeometry;

    /// Fill `buf` with the next frame (image pitch x image height bytes)
    ///
    /// With `redraw` set the current frame is emitted again without
    /// advancing. Returns `Ok(false)` at end of stream.
    fn run_frame(&mut self, redraw: bool, buf: &mut [u8]) -> Result<bool, SourceError>;
}

/// Layout of `geometry`, rejecting sizes that cannot produce a frame
pub(crate) fn check_geometry(geometry: &GameGeometry) -> Result<ImageLayout, SourceError> {
    Ok(ImageLayout::new(geometry)?)
}

/// Make sure `buf` can hold a whole frame
pub(crate) fn check_buffer(buf: &[u8], frame_bytes: usize) -> Result<(), SourceError> {
    if buf.len() < frame_bytes {
        return Err(SourceError::Geometry(format!(
            "frame buffer holds {} bytes, frame needs {}",
            buf.len(),
            frame_bytes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::layout::Orientation;

    #[test]
    fn test_zero_geometry_rejected() {
        let geometry = GameGeometry {
            width: 0,
            height: 224,
            orientation: Orientation::empty(),
            aspect: (4, 3),
        };
        assert!(matches!(
            check_geometry(&geometry),
            Err(SourceError::Layout(LayoutError::Empty { .. }))
        ));
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        let geometry = GameGeometry {
            width: 3_000_000_000,
            height: 224,
            orientation: Orientation::empty(),
            aspect: (4, 3),
        };
        let err = check_geometry(&geometry).unwrap_err();
        assert!(matches!(err, SourceError::Layout(LayoutError::TooLarge { .. })));
        assert!(err.to_string().starts_with("Invalid geometry: 3000000000px side"));
    }

    #[test]
    fn test_short_frame_message() {
        let err = SourceError::ShortFrame {
            expected: 100,
            got: 40,
        };
        assert_eq!(err.to_string(), "Short frame: expected 100 bytes, got 40");
    }
}
