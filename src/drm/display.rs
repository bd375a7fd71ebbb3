//! DRM display management
//!
//! Mode selection and legacy SetCrtc scanout

use anyhow::{anyhow, Context, Result};
use drm::control::{connector, crtc, framebuffer, Device as ControlDevice, Mode, ModeTypeFlags};
use log::{debug, info, warn};

use super::device::Device;

/// Display configuration
pub struct DisplayConfig {
    pub connector_handle: connector::Handle,
    pub crtc_handle: crtc::Handle,
    pub mode: Mode,
    pub width: u32,
    pub height: u32,
}

impl DisplayConfig {
    /// Auto-detect connected display and get configuration
    pub fn auto_detect(device: &Device) -> Result<Self> {
        let (connector_handle, connector_info) = device.find_connected_connector()?;

        info!(
            "Connector: {:?}, type: {:?}",
            connector_handle,
            connector_info.interface()
        );

        let (crtc_handle, _crtc_info) = device.find_crtc_for_connector(&connector_info)?;
        info!("CRTC: {:?}", crtc_handle);

        let mode = select_mode(connector_info.modes(), |m| {
            m.mode_type().contains(ModeTypeFlags::PREFERRED)
        })
        .copied()
        .ok_or_else(|| anyhow!("No available display modes"))?;

        let (width, height) = mode.size();
        info!(
            "Display mode: {}x{} @ {}Hz",
            width,
            height,
            mode.vrefresh()
        );

        Ok(Self {
            connector_handle,
            crtc_handle,
            mode,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Pick the preferred mode, or the first one when none is flagged
pub fn select_mode<T, F>(modes: &[T], is_preferred: F) -> Option<&T>
where
    F: Fn(&T) -> bool,
{
    modes
        .iter()
        .find(|m| is_preferred(m))
        .or_else(|| modes.first())
}

/// DRM framebuffer wrapping a locked GBM buffer object
pub struct DrmFramebuffer {
    device_fd: std::os::unix::io::RawFd,
    fb: framebuffer::Handle,
}

impl DrmFramebuffer {
    /// Register a GBM BO as a mode-sized XRGB8888 framebuffer
    ///
    /// `size` is the mode the CRTC scans out, which the GBM surface was
    /// created with.
    pub fn from_bo<T>(device: &Device, bo: &gbm::BufferObject<T>, size: (u32, u32)) -> Result<Self> {
        let raw_handle = bo
            .handle()
            .map_err(|e| anyhow!("Failed to get BO handle: {:?}", e))?;
        let handle = unsafe { raw_handle.u32_ };
        let stride = bo.stride().map_err(|e| anyhow!("BO stride: {:?}", e))?;

        let mut fb_cmd = drm_mode_fb_cmd::xrgb8888(size, stride, handle);
        let ret = unsafe {
            libc::ioctl(
                device.as_raw_fd(),
                DRM_IOCTL_MODE_ADDFB,
                &mut fb_cmd as *mut drm_mode_fb_cmd,
            )
        };
        if ret < 0 {
            return Err(anyhow!(
                "ADDFB {}x{} (pitch {}, bo {}) failed: {}",
                size.0,
                size.1,
                stride,
                handle,
                std::io::Error::last_os_error()
            ));
        }

        let fb: framebuffer::Handle = drm::control::from_u32(fb_cmd.fb_id)
            .ok_or_else(|| anyhow!("ADDFB returned framebuffer id 0"))?;
        debug!("Framebuffer {} for bo {}", fb_cmd.fb_id, handle);

        Ok(Self {
            device_fd: device.as_raw_fd(),
            fb,
        })
    }

    pub fn handle(&self) -> framebuffer::Handle {
        self.fb
    }
}

impl Drop for DrmFramebuffer {
    fn drop(&mut self) {
        let mut fb_id: u32 = self.fb.into();
        let ret = unsafe {
            libc::ioctl(self.device_fd, DRM_IOCTL_MODE_RMFB, &mut fb_id as *mut u32)
        };
        if ret < 0 {
            warn!(
                "RMFB {} failed: {}",
                fb_id,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Point the CRTC at `fb` with the configured mode
pub fn set_crtc(device: &Device, config: &DisplayConfig, fb: &DrmFramebuffer) -> Result<()> {
    device
        .set_crtc(
            config.crtc_handle,
            Some(fb.handle()),
            (0, 0),
            &[config.connector_handle],
            Some(config.mode),
        )
        .context("Failed to set display mode")?;
    Ok(())
}

/// CRTC state from before the first modeset
pub struct SavedCrtc {
    info: crtc::Info,
    connector: connector::Handle,
}

impl SavedCrtc {
    pub fn save(device: &Device, config: &DisplayConfig) -> Result<Self> {
        let info = device.get_crtc(config.crtc_handle)?;
        Ok(Self {
            info,
            connector: config.connector_handle,
        })
    }

    /// Put the saved framebuffer and mode back; a CRTC that was off stays as is
    pub fn restore(self, device: &Device, crtc_handle: crtc::Handle) -> Result<()> {
        let Some(fb) = self.info.framebuffer() else {
            return Ok(());
        };
        device
            .set_crtc(
                crtc_handle,
                Some(fb),
                self.info.position(),
                &[self.connector],
                self.info.mode(),
            )
            .with_context(|| format!("Failed to restore CRTC {:?}", crtc_handle))
    }
}

// DRM ioctl structures (include/uapi/drm/drm_mode.h)
#[repr(C)]
#[allow(non_camel_case_types)]
struct drm_mode_fb_cmd {
    fb_id: u32,
    width: u32,
    height: u32,
    pitch: u32,
    bpp: u32,
    depth: u32,
    handle: u32,
}

impl drm_mode_fb_cmd {
    /// Legacy ADDFB request: depth 24 in 32 bits per pixel
    fn xrgb8888((width, height): (u32, u32), pitch: u32, handle: u32) -> Self {
        Self {
            fb_id: 0,
            width,
            height,
            pitch,
            bpp: 32,
            depth: 24,
            handle,
        }
    }
}

const DRM_IOCTL_MODE_ADDFB: libc::c_ulong =
    nix::request_code_readwrite!(0x64, 0xAE, std::mem::size_of::<drm_mode_fb_cmd>())
        as libc::c_ulong;

const DRM_IOCTL_MODE_RMFB: libc::c_ulong =
    nix::request_code_readwrite!(0x64, 0xAF, std::mem::size_of::<u32>()) as libc::c_ulong;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_mode_prefers_flagged() {
        let modes = [(640, false), (320, true), (800, true)];
        let mode = select_mode(&modes, |m| m.1).unwrap();
        assert_eq!(mode.0, 320);
    }

    #[test]
    fn test_select_mode_falls_back_to_first() {
        let modes = [(480, false), (720, false)];
        assert_eq!(select_mode(&modes, |m| m.1).unwrap().0, 480);
    }

    #[test]
    fn test_select_mode_empty() {
        let modes: [(u32, bool); 0] = [];
        assert!(select_mode(&modes, |m| m.1).is_none());
    }

    #[test]
    fn test_addfb_struct_layout() {
        assert_eq!(std::mem::size_of::<drm_mode_fb_cmd>(), 28);
    }

    #[test]
    fn test_addfb_request_uses_mode_size() {
        let cmd = drm_mode_fb_cmd::xrgb8888((320, 480), 1280, 7);
        assert_eq!((cmd.width, cmd.height), (320, 480));
        assert_eq!(cmd.pitch, 1280);
        assert_eq!((cmd.depth, cmd.bpp), (24, 32));
        assert_eq!((cmd.fb_id, cmd.handle), (0, 7));
    }
}
