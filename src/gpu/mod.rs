//! GPU rendering with OpenGL ES
//!
//! Handles:
//! - GBM device/surface creation
//! - EGL context creation (GBM platform)
//! - Frame blit with an optional scanline shader

pub mod blitter;
pub mod context;
pub mod matrix;
pub mod shader;

pub use blitter::Blitter;
pub use context::{EglContext, EglDisplay, GbmDevice, GbmSurface, GlRenderer};
pub use shader::ShaderKind;
