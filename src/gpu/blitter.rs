//! Game frame blitter
//!
//! Uploads an RGB565 frame into a power-of-two texture and draws it as a
//! single rotated, scaled quad.

use anyhow::{anyhow, Result};
use glow::HasContext;
use log::{debug, info};

use super::matrix::Mat4;
use super::shader::{BlitShader, ShaderKind};
use crate::video::layout::{copy_rows, quad_uvs, ImageLayout};

/// Quad corners (x, y, z), unit square centred on the origin
#[rustfmt::skip]
const QUAD_POSITIONS: [f32; 12] = [
    -0.5, -0.5, 0.0,
     0.5, -0.5, 0.0,
     0.5,  0.5, 0.0,
    -0.5,  0.5, 0.0,
];

/// Two triangles sharing the 0-2 diagonal
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Textured-quad renderer for emulator frames
pub struct Blitter {
    shader: BlitShader,
    texture: glow::Texture,
    position_vbo: glow::Buffer,
    texcoord_vbo: glow::Buffer,
    ebo: glow::Buffer,
    layout: ImageLayout,
    projection: Mat4,
    /// CPU copy of the texture, image rows padded to texture pitch
    bitmap: Vec<u8>,
}

impl Blitter {
    pub fn new(gl: &glow::Context, kind: ShaderKind, layout: &ImageLayout) -> Result<Self> {
        let shader = BlitShader::new(gl, kind)?;

        unsafe {
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::DITHER);

            let texture = gl
                .create_texture()
                .map_err(|e| anyhow!("Failed to create texture: {}", e))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));

            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 2);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGB as i32,
                layout.texture_width as i32,
                layout.texture_height as i32,
                0,
                glow::RGB,
                glow::UNSIGNED_SHORT_5_6_5,
                None,
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);

            let position_vbo = gl
                .create_buffer()
                .map_err(|e| anyhow!("Failed to create position VBO: {}", e))?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(position_vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck_cast_slice(&QUAD_POSITIONS),
                glow::STATIC_DRAW,
            );

            let texcoord_vbo = gl
                .create_buffer()
                .map_err(|e| anyhow!("Failed to create texcoord VBO: {}", e))?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(texcoord_vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck_cast_slice(&quad_uvs(layout)),
                glow::STATIC_DRAW,
            );

            let ebo = gl
                .create_buffer()
                .map_err(|e| anyhow!("Failed to create EBO: {}", e))?;
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck_cast_slice(&QUAD_INDICES),
                glow::STATIC_DRAW,
            );

            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);

            info!(
                "Blitter initialized: image {}x{}, texture {}x{}",
                layout.image_width, layout.image_height, layout.texture_width, layout.texture_height
            );

            Ok(Self {
                shader,
                texture,
                position_vbo,
                texcoord_vbo,
                ebo,
                layout: *layout,
                projection: Mat4::identity(),
                bitmap: vec![0u8; layout.texture_bytes()],
            })
        }
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Swap the fragment shader, keeping texture and geometry
    pub fn set_shader(&mut self, gl: &glow::Context, kind: ShaderKind) -> Result<()> {
        if self.shader.kind() == kind {
            return Ok(());
        }
        let shader = BlitShader::new(gl, kind)?;
        self.shader.destroy(gl);
        self.shader = shader;
        debug!("Blit shader switched to {}", kind.name());
        Ok(())
    }

    /// Clear the screen and draw `frame` (RGB565, image pitch)
    ///
    /// A short frame only updates the rows it contains.
    pub fn draw(&mut self, gl: &glow::Context, viewport: (u32, u32), frame: &[u8]) {
        let copied = copy_rows(
            frame,
            self.layout.image_pitch,
            self.layout.image_height as usize,
            &mut self.bitmap,
            self.layout.texture_pitch,
        );
        if copied < self.layout.image_height as usize {
            debug!(
                "Short frame: {} of {} rows",
                copied, self.layout.image_height
            );
        }

        unsafe {
            gl.clear(glow::COLOR_BUFFER_BIT);
            gl.viewport(0, 0, viewport.0 as i32, viewport.1 as i32);
            gl.disable(glow::BLEND);

            self.shader.bind(gl);
            self.shader.set_projection(gl, &self.projection);

            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                self.layout.texture_width as i32,
                self.layout.texture_height as i32,
                glow::RGB,
                glow::UNSIGNED_SHORT_5_6_5,
                glow::PixelUnpackData::Slice(&self.bitmap),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.position_vbo));
            gl.enable_vertex_attrib_array(self.shader.a_position);
            gl.vertex_attrib_pointer_f32(self.shader.a_position, 3, glow::FLOAT, false, 0, 0);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.texcoord_vbo));
            gl.enable_vertex_attrib_array(self.shader.a_texcoord);
            gl.vertex_attrib_pointer_f32(self.shader.a_texcoord, 2, glow::FLOAT, false, 0, 0);

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
            gl.draw_elements(
                glow::TRIANGLES,
                QUAD_INDICES.len() as i32,
                glow::UNSIGNED_SHORT,
                0,
            );

            gl.disable_vertex_attrib_array(self.shader.a_position);
            gl.disable_vertex_attrib_array(self.shader.a_texcoord);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    /// Release resources
    pub fn destroy(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_buffer(self.position_vbo);
            gl.delete_buffer(self.texcoord_vbo);
            gl.delete_buffer(self.ebo);
            gl.delete_texture(self.texture);
        }
        self.shader.destroy(gl);
    }
}

fn bytemuck_cast_slice<T>(slice: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            slice.as_ptr() as *const u8,
            std::mem::size_of_val(slice),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_indices_in_range() {
        let corners = QUAD_POSITIONS.len() / 3;
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < corners));
    }

    #[test]
    fn test_cast_slice_length() {
        assert_eq!(bytemuck_cast_slice(&QUAD_POSITIONS).len(), 48);
        assert_eq!(bytemuck_cast_slice(&QUAD_INDICES).len(), 12);
    }
}
