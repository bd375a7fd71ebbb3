//! Game screen geometry and projection
//!
//! Everything here is pure math: texture sizing, aspect zoom and the
//! view/projection matrix for the blit quad. The handheld panel is a
//! portrait 320x480 scanned sideways, so landscape games are rotated
//! a quarter turn to fill it.

use bitflags::bitflags;
use log::warn;
use thiserror::Error;

use crate::constants::{BYTES_PER_PIXEL, MAX_TEXTURE_SIZE};
use crate::gpu::matrix::Mat4;

bitflags! {
    /// Screen orientation reported by the emulated driver
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Orientation: u32 {
        /// Vertical (tate) game; image width and height are swapped
        const VERTICAL = 0x1;
        /// Game is mounted upside down
        const FLIPPED = 0x2;
    }
}

/// Visible game screen as reported by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameGeometry {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    /// Display aspect ratio (x, y)
    pub aspect: (u32, u32),
}

impl GameGeometry {
    pub fn is_rotated(&self) -> bool {
        self.orientation.contains(Orientation::VERTICAL)
    }

    pub fn is_flipped(&self) -> bool {
        self.orientation.contains(Orientation::FLIPPED)
    }
}

/// Geometry that cannot be mapped onto a texture
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{width}x{height} has no pixels")]
    Empty { width: u32, height: u32 },

    #[error("{side}px side needs a texture larger than {max}px")]
    TooLarge { side: u32, max: u32 },
}

/// Sizes of the emulator image, the CPU bitmap and the GL texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub image_width: u32,
    pub image_height: u32,
    /// Bytes per image row (RGB565)
    pub image_pitch: usize,
    /// Unswapped visible size; drives the aspect zoom
    pub buffer_width: u32,
    pub buffer_height: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub texture_pitch: usize,
}

impl ImageLayout {
    pub fn new(geometry: &GameGeometry) -> Result<Self, LayoutError> {
        if geometry.width == 0 || geometry.height == 0 {
            return Err(LayoutError::Empty {
                width: geometry.width,
                height: geometry.height,
            });
        }

        let (image_width, image_height) = if geometry.is_rotated() {
            (geometry.height, geometry.width)
        } else {
            (geometry.width, geometry.height)
        };

        let texture_side = |side: u32| {
            next_power_of_two(side)
                .filter(|&t| t <= MAX_TEXTURE_SIZE)
                .ok_or(LayoutError::TooLarge {
                    side,
                    max: MAX_TEXTURE_SIZE,
                })
        };
        let texture_width = texture_side(image_width)?;
        let texture_height = texture_side(image_height)?;

        Ok(Self {
            image_width,
            image_height,
            image_pitch: image_width as usize * BYTES_PER_PIXEL,
            buffer_width: geometry.width,
            buffer_height: geometry.height,
            texture_width,
            texture_height,
            texture_pitch: texture_width as usize * BYTES_PER_PIXEL,
        })
    }

    /// Size of one emulator frame in bytes
    pub fn frame_bytes(&self) -> usize {
        self.image_pitch * self.image_height as usize
    }

    /// Size of the texture upload bitmap in bytes
    pub fn texture_bytes(&self) -> usize {
        self.texture_pitch * self.texture_height as usize
    }

    /// Texture coordinates of the image inside the padded texture
    pub fn max_uv(&self) -> (f32, f32) {
        (
            self.image_width as f32 / self.texture_width as f32,
            self.image_height as f32 / self.texture_height as f32,
        )
    }
}

/// Smallest power of two >= n (0 and 1 give 1); `None` past 2^31
pub fn next_power_of_two(n: u32) -> Option<u32> {
    n.max(1).checked_next_power_of_two()
}

/// UVs for the quad corners, in vertex order
pub fn quad_uvs(layout: &ImageLayout) -> [f32; 8] {
    let (max_u, max_v) = layout.max_uv();
    let (min_u, min_v) = (0.0, 0.0);
    [
        min_u, min_v, //
        max_u, min_v, //
        max_u, max_v, //
        min_u, max_v,
    ]
}

/// Options that shape the projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// Scale 1:1 on the long axis instead of stretching to the panel
    pub maintain_aspect: bool,
    /// Always rotate for the landscape mount, ignoring VERTICAL
    pub auto_rotate: bool,
}

/// Zoom factors that keep the game's pixel aspect on the rotated panel
///
/// The panel is mounted sideways, so screen height pairs with buffer
/// width and screen width with buffer height.
pub fn aspect_zoom(screen_w: u32, screen_h: u32, buffer_w: u32, buffer_h: u32) -> (f32, f32) {
    let (sw, sh) = (screen_w as f32, screen_h as f32);
    let (bw, bh) = (buffer_w as f32, buffer_h as f32);

    let ratio_screen = sh / sw;
    let ratio_buffer = bw / bh;

    let mut zoom_width = 1.0;
    let mut zoom_height = 1.0;

    if ratio_screen > ratio_buffer {
        if screen_w >= buffer_h {
            let scale_height = sw / bh;
            zoom_height = scale_height * bw / sh;
        } else {
            warn!(
                "Screen width {} is smaller than buffer height {}, stretching",
                screen_w, buffer_h
            );
        }
    } else {
        let scale_width = sh / bw;
        zoom_width = scale_width * bh / sw;
    }

    (zoom_width, zoom_height)
}

/// Quad rotation in degrees for the given orientation
pub fn rotation_degrees(orientation: Orientation, auto_rotate: bool) -> f32 {
    let flipped = orientation.contains(Orientation::FLIPPED);
    if auto_rotate || !orientation.contains(Orientation::VERTICAL) {
        if flipped {
            270.0
        } else {
            90.0
        }
    } else if flipped {
        0.0
    } else {
        180.0
    }
}

/// View/projection matrix for the blit quad
pub fn projection(
    screen_w: u32,
    screen_h: u32,
    layout: &ImageLayout,
    orientation: Orientation,
    options: ProjectionOptions,
) -> Mat4 {
    let m = Mat4::identity()
        .rotate_z(rotation_degrees(orientation, options.auto_rotate))
        .ortho(-0.5, 0.5, 0.5, -0.5, -1.0, 1.0);

    if options.maintain_aspect {
        let (zw, zh) = aspect_zoom(
            screen_w,
            screen_h,
            layout.buffer_width,
            layout.buffer_height,
        );
        m.scale(zw, zh, 0.0)
    } else {
        m.scale(1.0, 1.0, 0.0)
    }
}

/// Copy `rows` image rows into a wider texture bitmap
///
/// Returns the number of rows actually copied; rows that do not fit in
/// either buffer are skipped.
pub fn copy_rows(src: &[u8], src_pitch: usize, rows: usize, dst: &mut [u8], dst_pitch: usize) -> usize {
    if src_pitch == 0 || src_pitch > dst_pitch {
        return 0;
    }
    src.chunks_exact(src_pitch)
        .zip(dst.chunks_mut(dst_pitch))
        .take(rows)
        .map(|(s, d)| d[..src_pitch].copy_from_slice(s))
        .count()
}
