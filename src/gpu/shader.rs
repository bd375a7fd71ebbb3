//! Shader management
//!
//! GLSL ES 1.00 blit shaders: a plain textured quad and a
//! scanline variant that darkens every other output line.

use anyhow::{anyhow, Result};
use glow::HasContext;
use log::info;

use super::matrix::Mat4;

/// Blit vertex shader (GLSL ES 1.00)
///
/// Input:
///   a_position: Quad corner (unit square centred on the origin)
///   a_texcoord: Texture coordinates
/// Uniform:
///   u_vp_matrix: Rotation, orthographic projection and aspect zoom
const BLIT_VERTEX_SHADER: &str = r#"
uniform mat4 u_vp_matrix;

attribute vec4 a_position;
attribute vec2 a_texcoord;

varying mediump vec2 v_texcoord;

void main() {
    v_texcoord = a_texcoord;
    gl_Position = u_vp_matrix * a_position;
}
"#;

/// Plain fragment shader
const PLAIN_FRAGMENT_SHADER: &str = r#"
precision mediump float;

varying mediump vec2 v_texcoord;

uniform sampler2D u_texture;

void main() {
    gl_FragColor = texture2D(u_texture, v_texcoord);
}
"#;

/// Scanline fragment shader
///
/// Odd output lines keep a brightened copy of the pixel, even lines
/// fall back to a dimmed intensity curve.
const SCANLINE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

varying mediump vec2 v_texcoord;

uniform sampler2D u_texture;

void main() {
    vec3 rgb = texture2D(u_texture, v_texcoord).rgb;
    vec3 intens;

    if (fract(gl_FragCoord.y * (0.5 * 4.0 / 3.0)) > 0.5) {
        intens = vec3(0.0);
    } else {
        intens = smoothstep(0.2, 0.8, rgb) + normalize(rgb);
    }

    float level = 4.0 * 0.19;
    gl_FragColor = vec4(intens * (0.5 - level) + rgb * 1.1, 1.0);
}
"#;

/// Available blit shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderKind {
    #[default]
    Plain,
    Scanline,
}

impl ShaderKind {
    pub fn from_scanlines(scanlines: bool) -> Self {
        if scanlines {
            ShaderKind::Scanline
        } else {
            ShaderKind::Plain
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            ShaderKind::Plain => PLAIN_FRAGMENT_SHADER,
            ShaderKind::Scanline => SCANLINE_FRAGMENT_SHADER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderKind::Plain => "none",
            ShaderKind::Scanline => "scanline",
        }
    }
}

/// Compiled blit program with its attribute and uniform locations
pub struct BlitShader {
    program: glow::Program,
    kind: ShaderKind,
    pub a_position: u32,
    pub a_texcoord: u32,
    pub u_vp_matrix: glow::UniformLocation,
    pub u_texture: glow::UniformLocation,
}

impl BlitShader {
    pub fn new(gl: &glow::Context, kind: ShaderKind) -> Result<Self> {
        let program = compile_program(gl, BLIT_VERTEX_SHADER, kind.fragment_source())?;

        let lookup = || -> Result<(u32, u32, glow::UniformLocation, glow::UniformLocation)> {
            unsafe {
                let a_position = gl
                    .get_attrib_location(program, "a_position")
                    .ok_or_else(|| anyhow!("a_position attribute not found"))?;
                let a_texcoord = gl
                    .get_attrib_location(program, "a_texcoord")
                    .ok_or_else(|| anyhow!("a_texcoord attribute not found"))?;
                let u_vp_matrix = gl
                    .get_uniform_location(program, "u_vp_matrix")
                    .ok_or_else(|| anyhow!("u_vp_matrix uniform not found"))?;
                let u_texture = gl
                    .get_uniform_location(program, "u_texture")
                    .ok_or_else(|| anyhow!("u_texture uniform not found"))?;
                Ok((a_position, a_texcoord, u_vp_matrix, u_texture))
            }
        };

        let (a_position, a_texcoord, u_vp_matrix, u_texture) = match lookup() {
            Ok(locations) => locations,
            Err(e) => {
                unsafe { gl.delete_program(program) };
                return Err(e);
            }
        };

        info!("Blit shader compiled ({})", kind.name());
        Ok(Self {
            program,
            kind,
            a_position,
            a_texcoord,
            u_vp_matrix,
            u_texture,
        })
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// Activate the shader and point the sampler at texture unit 0
    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.use_program(Some(self.program));
            gl.uniform_1_i32(Some(&self.u_texture), 0);
        }
    }

    pub fn set_projection(&self, gl: &glow::Context, matrix: &Mat4) {
        unsafe {
            gl.uniform_matrix_4_f32_slice(Some(&self.u_vp_matrix), false, matrix.as_array());
        }
    }

    /// Release resources
    pub fn destroy(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_program(self.program);
        }
    }
}

/// Compile and link a program from vertex/fragment sources
pub fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program> {
    unsafe {
        let vs = compile_shader(gl, glow::VERTEX_SHADER, vertex_src)?;
        let fs = match compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src) {
            Ok(fs) => fs,
            Err(e) => {
                gl.delete_shader(vs);
                return Err(e);
            }
        };

        let program = gl
            .create_program()
            .map_err(|e| anyhow!("Failed to create program: {}", e))?;

        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(anyhow!("Shader link failed: {}", log));
        }

        gl.delete_shader(vs);
        gl.delete_shader(fs);

        Ok(program)
    }
}

fn compile_shader(gl: &glow::Context, shader_type: u32, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = gl
            .create_shader(shader_type)
            .map_err(|e| anyhow!("Failed to create shader: {}", e))?;

        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            let type_name = match shader_type {
                glow::VERTEX_SHADER => "vertex",
                glow::FRAGMENT_SHADER => "fragment",
                _ => "unknown",
            };
            return Err(anyhow!("{} shader compile failed: {}", type_name, log));
        }

        Ok(shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_kind_from_config() {
        assert_eq!(ShaderKind::from_scanlines(true), ShaderKind::Scanline);
        assert_eq!(ShaderKind::from_scanlines(false), ShaderKind::Plain);
        assert_eq!(ShaderKind::default(), ShaderKind::Plain);
    }

    #[test]
    fn test_fragment_shaders_declare_precision() {
        for kind in [ShaderKind::Plain, ShaderKind::Scanline] {
            let src = kind.fragment_source();
            assert!(src.contains("precision mediump float;"), "{}", kind.name());
            assert!(src.contains("uniform sampler2D u_texture;"));
        }
    }

    #[test]
    fn test_vertex_shader_names_match_lookups() {
        for name in ["u_vp_matrix", "a_position", "a_texcoord", "v_texcoord"] {
            assert!(BLIT_VERTEX_SHADER.contains(name), "missing {}", name);
        }
    }
}
