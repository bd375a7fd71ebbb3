//! Colour bar test pattern

use super::{check_buffer, check_geometry, FrameSource, SourceError};
use crate::constants::BYTES_PER_PIXEL;
use crate::video::layout::{GameGeometry, ImageLayout};

/// SMPTE-style bars in RGB565: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [u16; 8] = [0xFFFF, 0xFFE0, 0x07FF, 0x07E0, 0xF81F, 0xF800, 0x001F, 0x0000];

/// Vertical colour bars with a marker line scrolling one row per frame
pub struct TestPattern {
    geometry: GameGeometry,
    layout: ImageLayout,
    frame: u64,
}

impl TestPattern {
    pub fn new(geometry: GameGeometry) -> Result<Self, SourceError> {
        Ok(Self {
            geometry,
            layout: check_geometry(&geometry)?,
            frame: 0,
        })
    }

    /// Frames advanced so far
    #[allow(dead_code)]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Row currently carrying the marker
    pub fn marker_row(&self) -> usize {
        (self.frame % self.layout.image_height as u64) as usize
    }

    fn pixel(&self, x: usize, y: usize) -> u16 {
        let width = self.layout.image_width as usize;
        let bar = BARS[(x * BARS.len() / width).min(BARS.len() - 1)];
        if y == self.marker_row() {
            !bar
        } else {
            bar
        }
    }

    fn render(&self, buf: &mut [u8]) {
        let pitch = self.layout.image_pitch;
        for (y, row) in buf
            .chunks_exact_mut(pitch)
            .take(self.layout.image_height as usize)
            .enumerate()
        {
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                px.copy_from_slice(&self.pixel(x, y).to_ne_bytes());
            }
        }
    }
}

impl FrameSource for TestPattern {
    fn geometry(&self) -> GameGeometry {
        self.geometry
    }

    fn run_frame(&mut self, redraw: bool, buf: &mut [u8]) -> Result<bool, SourceError> {
        check_buffer(buf, self.layout.frame_bytes())?;
        if !redraw {
            self.frame += 1;
        }
        self.render(buf);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::layout::Orientation;

    fn pattern(width: u32, height: u32) -> TestPattern {
        TestPattern::new(GameGeometry {
            width,
            height,
            orientation: Orientation::empty(),
            aspect: (4, 3),
        })
        .unwrap()
    }

    fn pixel_at(buf: &[u8], pitch: usize, x: usize, y: usize) -> u16 {
        let i = y * pitch + x * 2;
        u16::from_ne_bytes([buf[i], buf[i + 1]])
    }

    #[test]
    fn test_bars_span_width() {
        let mut p = pattern(16, 4);
        let mut buf = vec![0u8; 16 * 2 * 4];
        assert!(p.run_frame(false, &mut buf).unwrap());
        // marker is on row 1 after the first frame
        assert_eq!(pixel_at(&buf, 32, 0, 0), 0xFFFF);
        assert_eq!(pixel_at(&buf, 32, 15, 0), 0x0000);
        assert_eq!(pixel_at(&buf, 32, 0, 1), 0x0000);
    }

    #[test]
    fn test_marker_scrolls_and_redraw_holds() {
        let mut p = pattern(8, 3);
        let mut buf = vec![0u8; 8 * 2 * 3];
        p.run_frame(false, &mut buf).unwrap();
        assert_eq!(p.marker_row(), 1);
        p.run_frame(true, &mut buf).unwrap();
        assert_eq!(p.marker_row(), 1);
        p.run_frame(false, &mut buf).unwrap();
        p.run_frame(false, &mut buf).unwrap();
        assert_eq!(p.marker_row(), 0);
        assert_eq!(p.frame_count(), 3);
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut p = pattern(8, 8);
        let mut buf = vec![0u8; 10];
        assert!(matches!(
            p.run_frame(false, &mut buf),
            Err(SourceError::Geometry(_))
        ));
    }

    #[test]
    fn test_geometry_past_texture_limit_rejected() {
        let result = TestPattern::new(GameGeometry {
            width: 3_000_000_000,
            height: 224,
            orientation: Orientation::empty(),
            aspect: (4, 3),
        });
        assert!(matches!(result, Err(SourceError::Layout(_))));
    }

    #[test]
    fn test_vertical_uses_image_layout() {
        let mut p = TestPattern::new(GameGeometry {
            width: 4,
            height: 8,
            orientation: Orientation::VERTICAL,
            aspect: (3, 4),
        })
        .unwrap();
        // image is 8 wide, 4 tall
        let mut buf = vec![0u8; 8 * 2 * 4];
        assert!(p.run_frame(false, &mut buf).unwrap());
        assert_eq!(pixel_at(&buf, 16, 7, 0), 0x0000);
    }
}
