//! Global constants for ogavid
//!
//! Consolidates device, pixel format and timing constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Device Constants
// ============================================================================

/// Highest /dev/dri/cardN probed when no device is configured
pub const MAX_DRM_CARDS: u32 = 8;

/// DRM fourcc 'XR24', the GBM surface format and EGL native visual
pub const FOURCC_XRGB8888: u32 = u32::from_le_bytes(*b"XR24");

/// Panel size assumed by --test (ODROID-GO Advance, portrait scanout)
pub const TEST_SCREEN_WIDTH: u32 = 320;
pub const TEST_SCREEN_HEIGHT: u32 = 480;

// ============================================================================
// Pixel Format Constants
// ============================================================================

/// Bytes per RGB565 pixel
pub const BYTES_PER_PIXEL: usize = 2;

/// Largest texture side accepted (GL_MAX_TEXTURE_SIZE on Mali-G31)
pub const MAX_TEXTURE_SIZE: u32 = 4096;

// ============================================================================
// Timing Constants
// ============================================================================

/// Default frame rate (CPS2/Neo Geo run close to 60Hz)
pub const DEFAULT_FPS: u32 = 60;

/// Upper bound accepted for the fps setting
pub const MAX_FPS: u32 = 240;

// ============================================================================
// Game Defaults
// ============================================================================

/// Default game width when nothing is configured
pub const DEFAULT_GAME_WIDTH: u32 = 320;

/// Default game height when nothing is configured
pub const DEFAULT_GAME_HEIGHT: u32 = 240;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrgb8888_fourcc() {
        assert_eq!(FOURCC_XRGB8888, 0x3432_5258);
    }
}
