//! Video output pipeline
//!
//! Owns the whole DRM -> GBM -> EGL -> GLES chain for one panel and turns
//! emulator frames into scanned-out framebuffers.

pub mod layout;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};

use crate::config::Config;
use crate::constants::FOURCC_XRGB8888;
use crate::drm::{find_drm_device, set_crtc, Device, DisplayConfig, DrmFramebuffer, SavedCrtc};
use crate::gpu::{Blitter, EglContext, EglDisplay, GbmDevice, GbmSurface, GlRenderer, ShaderKind};

use layout::{projection, GameGeometry, ImageLayout, ProjectionOptions};

/// Display pipeline for emulator frames
///
/// Field order is teardown order after `Drop::drop` has restored the CRTC
/// and released the last scanout buffer.
pub struct VideoOutput {
    blitter: Option<Blitter>,
    geometry: Option<GameGeometry>,
    options: ProjectionOptions,
    prev_fb: Option<DrmFramebuffer>,
    prev_bo: Option<gbm::BufferObject<std::fs::File>>,
    saved_crtc: Option<SavedCrtc>,
    gl: GlRenderer,
    egl: EglContext,
    gbm_surface: GbmSurface,
    /// Outlives the surface and EGL display built on it
    _gbm_device: GbmDevice,
    display: DisplayConfig,
    device: Device,
}

impl VideoOutput {
    /// Open the panel and bring up an ES2 context on it
    pub fn new(config: &Config) -> Result<Self> {
        let path = find_drm_device(&config.display.device)?;
        let device = Device::open(&path)?;

        if let Err(e) = device.set_master() {
            warn!("{}", e);
        }

        let display = DisplayConfig::auto_detect(&device)?;

        let gbm_device = GbmDevice::new(device.dup_fd()?)?;
        let egl_display = EglDisplay::new(gbm_device.device())?;
        let egl_config = egl_display.choose_config(FOURCC_XRGB8888)?;
        let visual_id = egl_display.native_visual_id(egl_config)?;

        let gbm_surface =
            GbmSurface::new(gbm_device.device(), display.width, display.height, visual_id)?;
        let egl = EglContext::new(egl_display, egl_config, gbm_surface.surface())?;
        let gl = GlRenderer::new(&egl)?;

        let saved_crtc = match SavedCrtc::save(&device, &display) {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!("Could not save CRTC state: {}", e);
                None
            }
        };

        info!(
            "Video output ready: {} ({}x{})",
            path.display(),
            display.width,
            display.height
        );

        Ok(Self {
            blitter: None,
            geometry: None,
            options: ProjectionOptions {
                maintain_aspect: config.video.maintain_aspect,
                auto_rotate: config.video.auto_rotate,
            },
            prev_fb: None,
            prev_bo: None,
            saved_crtc,
            gl,
            egl,
            gbm_surface,
            _gbm_device: gbm_device,
            display,
            device,
        })
    }

    /// Panel size in pixels
    pub fn screen_size(&self) -> (u32, u32) {
        (self.display.width, self.display.height)
    }

    /// (Re)build texture, quad and projection for a game screen
    pub fn configure(
        &mut self,
        geometry: GameGeometry,
        options: ProjectionOptions,
        kind: ShaderKind,
    ) -> Result<()> {
        self.reinit_textures(geometry, options, kind)
    }

    fn reinit_textures(
        &mut self,
        geometry: GameGeometry,
        options: ProjectionOptions,
        kind: ShaderKind,
    ) -> Result<()> {
        if let Some(old) = self.blitter.take() {
            old.destroy(self.gl.gl());
        }

        let layout = ImageLayout::new(&geometry)
            .with_context(|| format!("Cannot lay out {}x{} game screen", geometry.width, geometry.height))?;
        let mut blitter = Blitter::new(self.gl.gl(), kind, &layout)
            .context("Failed to set up frame blitter")?;
        blitter.set_projection(projection(
            self.display.width,
            self.display.height,
            &layout,
            geometry.orientation,
            options,
        ));

        info!(
            "Game screen size: {}x{} (vertical: {}, flipped: {}, aspect {}:{})",
            geometry.width,
            geometry.height,
            geometry.is_rotated(),
            geometry.is_flipped(),
            geometry.aspect.0,
            geometry.aspect.1
        );

        self.blitter = Some(blitter);
        self.geometry = Some(geometry);
        self.options = options;
        Ok(())
    }

    /// Apply new projection options and shader without rebuilding the texture
    pub fn update_options(&mut self, options: ProjectionOptions, kind: ShaderKind) -> Result<()> {
        let (Some(blitter), Some(geometry)) = (self.blitter.as_mut(), self.geometry) else {
            self.options = options;
            return Ok(());
        };

        blitter.set_shader(self.gl.gl(), kind)?;
        let layout = *blitter.layout();
        blitter.set_projection(projection(
            self.display.width,
            self.display.height,
            &layout,
            geometry.orientation,
            options,
        ));
        self.options = options;
        info!(
            "Video options updated: shader={}, maintain_aspect={}, auto_rotate={}",
            kind.name(),
            options.maintain_aspect,
            options.auto_rotate
        );
        Ok(())
    }

    /// Draw one emulator frame and put it on screen
    pub fn paint(&mut self, frame: &[u8]) -> Result<()> {
        let viewport = self.screen_size();
        let blitter = self
            .blitter
            .as_mut()
            .ok_or_else(|| anyhow!("Video output is not configured"))?;
        blitter.draw(self.gl.gl(), viewport, frame);
        self.present();
        Ok(())
    }

    /// Swap, scan out the new front buffer and recycle the previous one
    fn present(&mut self) {
        if let Err(e) = self.egl.swap_buffers() {
            warn!("{}", e);
            return;
        }

        let Ok(bo) = self.gbm_surface.lock_front_buffer() else {
            return;
        };

        let fb = match DrmFramebuffer::from_bo(&self.device, &bo, self.screen_size()) {
            Ok(fb) => fb,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        if let Err(e) = set_crtc(&self.device, &self.display, &fb) {
            warn!("{:#}", e);
        }

        // Framebuffer goes before the buffer object it points at
        self.prev_fb = None;
        self.prev_bo = None;

        debug!("Presented framebuffer {:?}", fb.handle());
        self.prev_fb = Some(fb);
        self.prev_bo = Some(bo);
    }
}

impl Drop for VideoOutput {
    fn drop(&mut self) {
        if let Some(blitter) = self.blitter.take() {
            blitter.destroy(self.gl.gl());
        }

        if let Some(saved) = self.saved_crtc.take() {
            match saved.restore(&self.device, self.display.crtc_handle) {
                Ok(()) => info!("Restored previous CRTC configuration"),
                Err(e) => warn!("{:#}", e),
            }
        }

        self.prev_fb = None;
        self.prev_bo = None;

        info!("Video output shut down");
    }
}
