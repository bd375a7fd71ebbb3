//! GPU context management
//!
//! GBM + EGL + OpenGL ES 2 setup

use anyhow::{anyhow, Context, Result};
use gbm::AsRaw;
use glow::HasContext;
use khronos_egl as egl;
use log::{debug, info};
use std::ffi::c_void;

// EGL_PLATFORM_GBM_KHR (EGL extension)
const EGL_PLATFORM_GBM_KHR: egl::Enum = 0x31D7;

/// GBM device
pub struct GbmDevice {
    device: gbm::Device<std::fs::File>,
}

impl GbmDevice {
    /// Create GBM device from DRM file descriptor
    pub fn new(drm_file: std::fs::File) -> Result<Self> {
        let device = gbm::Device::new(drm_file)
            .map_err(|e| anyhow!("Failed to create GBM device: {:?}", e))?;
        info!("GBM device created");
        Ok(Self { device })
    }

    /// Reference to internal device
    pub fn device(&self) -> &gbm::Device<std::fs::File> {
        &self.device
    }
}

/// GBM surface used as the EGL window
pub struct GbmSurface {
    surface: gbm::Surface<std::fs::File>,
}

impl GbmSurface {
    /// Create a scanout-capable GBM surface
    ///
    /// `fourcc` must be the native visual id of the EGL config that will
    /// render into it.
    pub fn new(
        device: &gbm::Device<std::fs::File>,
        width: u32,
        height: u32,
        fourcc: u32,
    ) -> Result<Self> {
        let format = gbm::Format::try_from(fourcc)
            .map_err(|_| anyhow!("Unknown GBM format 0x{:08x}", fourcc))?;

        let surface = device
            .create_surface::<std::fs::File>(
                width,
                height,
                format,
                gbm::BufferObjectFlags::SCANOUT | gbm::BufferObjectFlags::RENDERING,
            )
            .map_err(|e| anyhow!("Failed to create GBM surface: {:?}", e))?;

        info!("GBM surface created: {}x{} ({:?})", width, height, format);
        Ok(Self { surface })
    }

    /// Reference to internal surface
    pub fn surface(&self) -> &gbm::Surface<std::fs::File> {
        &self.surface
    }

    /// Lock front buffer and get buffer object
    ///
    /// Only valid right after a successful `swap_buffers`.
    pub fn lock_front_buffer(&self) -> Result<gbm::BufferObject<std::fs::File>> {
        unsafe {
            self.surface
                .lock_front_buffer()
                .map_err(|e| anyhow!("Failed to lock front buffer: {:?}", e))
        }
    }
}

/// EGL instance type (dynamic loading)
type EglInstance = egl::Instance<egl::Dynamic<libloading::Library, egl::EGL1_5>>;

/// Initialized EGL display on the GBM platform
///
/// Separate from `EglContext` because the GBM surface format comes from
/// the chosen EGL config, so the surface is created in between.
pub struct EglDisplay {
    instance: EglInstance,
    display: egl::Display,
}

impl EglDisplay {
    /// Load libEGL and initialize a display on the GBM device
    pub fn new(gbm_device: &gbm::Device<std::fs::File>) -> Result<Self> {
        let lib = unsafe {
            libloading::Library::new("libEGL.so.1")
                .or_else(|_| libloading::Library::new("libEGL.so"))
                .context("Failed to load EGL library")?
        };

        let instance: EglInstance = unsafe {
            egl::DynamicInstance::<egl::EGL1_5>::load_required_from(lib)
                .context("Failed to create EGL instance")?
        };

        let display = unsafe {
            instance
                .get_platform_display(
                    EGL_PLATFORM_GBM_KHR,
                    gbm_device.as_raw() as *mut c_void,
                    &[egl::ATTRIB_NONE],
                )
                .context("eglGetPlatformDisplay failed")?
        };

        let (major, minor) = instance
            .initialize(display)
            .context("eglInitialize failed")?;
        info!("EGL: major={}, minor={}", major, minor);

        for (label, name) in [
            ("Vendor", egl::VENDOR),
            ("Version", egl::VERSION),
            ("ClientAPIs", egl::CLIENT_APIS),
        ] {
            if let Ok(value) = instance.query_string(Some(display), name) {
                info!("EGL {}: {}", label, value.to_string_lossy());
            }
        }
        if let Ok(ext) = instance.query_string(Some(display), egl::EXTENSIONS) {
            debug!("EGL Extensions: {}", ext.to_string_lossy());
        }

        Ok(Self { instance, display })
    }

    /// Choose a window config whose native visual matches `visual_id`
    ///
    /// Asks for RGB888 without alpha, then walks the candidates until one
    /// reports the requested GBM fourcc as its native visual.
    pub fn choose_config(&self, visual_id: u32) -> Result<egl::Config> {
        let attribs = [
            egl::SURFACE_TYPE,
            egl::WINDOW_BIT,
            egl::RED_SIZE,
            8,
            egl::GREEN_SIZE,
            8,
            egl::BLUE_SIZE,
            8,
            egl::ALPHA_SIZE,
            0,
            egl::NONE,
        ];

        let count = self
            .instance
            .matching_config_count(self.display, &attribs)
            .context("eglChooseConfig failed")?;
        let mut configs = Vec::with_capacity(count);
        self.instance
            .choose_config(self.display, &attribs, &mut configs)
            .context("eglChooseConfig failed")?;
        debug!("EGL configs matching RGB888: {}", configs.len());

        for (i, &config) in configs.iter().enumerate() {
            match self.native_visual_id(config) {
                Ok(id) if id == visual_id => {
                    debug!("EGL config {} matches visual 0x{:08x}", i, visual_id);
                    return Ok(config);
                }
                Ok(id) => debug!("EGL config {}: visual 0x{:08x}", i, id),
                Err(e) => debug!("EGL config {}: {}", i, e),
            }
        }

        Err(anyhow!("No suitable config match"))
    }

    /// Native visual id (a DRM fourcc on the GBM platform)
    pub fn native_visual_id(&self, config: egl::Config) -> Result<u32> {
        let id = self
            .instance
            .get_config_attrib(self.display, config, egl::NATIVE_VISUAL_ID)
            .context("eglGetConfigAttrib(NATIVE_VISUAL_ID) failed")?;
        Ok(id as u32)
    }
}

impl Drop for EglDisplay {
    fn drop(&mut self) {
        let _ = self.instance.terminate(self.display);
        debug!("EGL display terminated");
    }
}

/// EGL context with a window surface on a GBM surface
pub struct EglContext {
    context: egl::Context,
    surface: egl::Surface,
    // Dropped after the surface and context
    egl_display: EglDisplay,
}

impl EglContext {
    /// Create the window surface and an ES2 context, and make it current
    pub fn new(
        egl_display: EglDisplay,
        config: egl::Config,
        gbm_surface: &gbm::Surface<std::fs::File>,
    ) -> Result<Self> {
        let instance = &egl_display.instance;
        let display = egl_display.display;

        let surface = unsafe {
            instance
                .create_window_surface(
                    display,
                    config,
                    gbm_surface.as_raw() as egl::NativeWindowType,
                    None,
                )
                .context("eglCreateWindowSurface failed")?
        };

        if let Err(e) = instance.bind_api(egl::OPENGL_ES_API) {
            let _ = instance.destroy_surface(display, surface);
            return Err(anyhow!("eglBindAPI failed: {}", e));
        }

        let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let context = match instance.create_context(display, config, None, &context_attribs) {
            Ok(context) => context,
            Err(e) => {
                let _ = instance.destroy_surface(display, surface);
                return Err(anyhow!("eglCreateContext failed: {}", e));
            }
        };

        let this = Self {
            context,
            surface,
            egl_display,
        };

        this.instance()
            .make_current(display, Some(surface), Some(surface), Some(context))
            .context("eglMakeCurrent failed")?;

        info!("EGL context created (GLES 2)");
        Ok(this)
    }

    fn instance(&self) -> &EglInstance {
        &self.egl_display.instance
    }

    /// Swap buffers
    pub fn swap_buffers(&self) -> Result<()> {
        self.instance()
            .swap_buffers(self.egl_display.display, self.surface)
            .context("eglSwapBuffers failed")?;
        Ok(())
    }

    /// Load GL function pointers
    pub fn get_proc_address(&self, name: &str) -> *const c_void {
        self.instance()
            .get_proc_address(name)
            .map(|f| f as *const c_void)
            .unwrap_or(std::ptr::null())
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        let instance = &self.egl_display.instance;
        let display = self.egl_display.display;
        let _ = instance.make_current(display, None, None, None);
        let _ = instance.destroy_surface(display, self.surface);
        let _ = instance.destroy_context(display, self.context);
        debug!("EGL surface and context destroyed");
    }
}

/// OpenGL ES renderer
pub struct GlRenderer {
    gl: glow::Context,
}

impl GlRenderer {
    /// Initialize OpenGL ES from EGL context
    pub fn new(egl: &EglContext) -> Result<Self> {
        let gl = unsafe { glow::Context::from_loader_function(|name| egl.get_proc_address(name)) };

        unsafe {
            info!("OpenGL ES: {}", gl.get_parameter_string(glow::VERSION));
            info!("Renderer: {}", gl.get_parameter_string(glow::RENDERER));
            info!("Vendor: {}", gl.get_parameter_string(glow::VENDOR));
        }

        Ok(Self { gl })
    }

    /// Reference to glow context
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}
