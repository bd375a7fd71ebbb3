//! DRM device management
//!
//! Opens the DRM device (/dev/dri/card*) and walks its
//! connectors, encoders and CRTCs.

use anyhow::{anyhow, Context, Result};
use drm::control::{connector, crtc, encoder, Device as ControlDevice, ResourceHandles};
use drm::Device as BasicDevice;
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::MAX_DRM_CARDS;

/// Set by SIGTERM/SIGINT/SIGHUP
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown was requested (SIGTERM, SIGINT, or SIGHUP)
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Set up signal handlers for graceful shutdown (call once at startup)
///
/// The frame loop polls `shutdown_requested()` so the display is torn
/// down in order and the previous CRTC comes back.
pub fn setup_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGHUP,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
    }
}

extern "C" fn shutdown_signal_handler(_signo: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// Locate a DRM card node
///
/// An explicit path wins; otherwise the first existing /dev/dri/cardN.
pub fn find_drm_device(configured: &str) -> Result<PathBuf> {
    if !configured.is_empty() {
        let path = PathBuf::from(configured);
        if path.exists() {
            return Ok(path);
        }
        return Err(anyhow!("Configured DRM device {} does not exist", configured));
    }

    (0..MAX_DRM_CARDS)
        .map(|i| PathBuf::from(format!("/dev/dri/card{}", i)))
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("/dev/dri/card* not found"))
}

/// DRM device wrapper
pub struct Device {
    file: File,
    resources: ResourceHandles,
}

impl AsFd for Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for Device {}
impl ControlDevice for Device {}

impl Device {
    /// Open DRM device
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/dri/card0")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening DRM device: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Cannot open DRM device {}", path.display()))?;

        // Resources have to be read before Self exists
        struct Probe<'a>(&'a File);
        impl AsFd for Probe<'_> {
            fn as_fd(&self) -> BorrowedFd<'_> {
                self.0.as_fd()
            }
        }
        impl BasicDevice for Probe<'_> {}
        impl ControlDevice for Probe<'_> {}

        let resources = Probe(&file)
            .resource_handles()
            .context("Failed to get DRM resources")?;

        info!(
            "DRM resources: connectors={}, crtcs={}, encoders={}, framebuffers={}",
            resources.connectors().len(),
            resources.crtcs().len(),
            resources.encoders().len(),
            resources.framebuffers().len()
        );

        Ok(Self { file, resources })
    }

    /// Get connector info
    pub fn get_connector(&self, handle: connector::Handle) -> Result<connector::Info> {
        ControlDevice::get_connector(self, handle, false)
            .with_context(|| format!("Failed to get connector {:?} info", handle))
    }

    /// Get encoder info
    pub fn get_encoder(&self, handle: encoder::Handle) -> Result<encoder::Info> {
        ControlDevice::get_encoder(self, handle)
            .with_context(|| format!("Failed to get encoder {:?} info", handle))
    }

    /// Get CRTC info
    pub fn get_crtc(&self, handle: crtc::Handle) -> Result<crtc::Info> {
        ControlDevice::get_crtc(self, handle)
            .with_context(|| format!("Failed to get CRTC {:?} info", handle))
    }

    /// Get RawFd (needed for the ADDFB/RMFB ioctls)
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Duplicate fd and return as File (for GBM device)
    pub fn dup_fd(&self) -> Result<File> {
        let fd = unsafe { libc::dup(self.file.as_raw_fd()) };
        if fd < 0 {
            return Err(anyhow!(
                "fd dup failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    /// Find the first connected connector
    pub fn find_connected_connector(&self) -> Result<(connector::Handle, connector::Info)> {
        for &handle in self.resources.connectors() {
            let info = self.get_connector(handle)?;
            if info.state() == connector::State::Connected {
                debug!(
                    "Found connected connector: {:?} ({:?})",
                    handle,
                    info.interface()
                );
                return Ok((handle, info));
            }
        }
        Err(anyhow!("No connected connector found"))
    }

    /// Find CRTC for connector
    ///
    /// The CRTC already driven by the connector's current encoder is
    /// preferred; after that any CRTC one of its encoders can reach.
    pub fn find_crtc_for_connector(
        &self,
        connector: &connector::Info,
    ) -> Result<(crtc::Handle, crtc::Info)> {
        let active = match connector.current_encoder() {
            Some(handle) => self.get_encoder(handle)?.crtc(),
            None => None,
        };
        let crtc_handle = match active {
            Some(handle) => handle,
            None => self
                .reachable_crtc(connector.encoders())?
                .ok_or_else(|| anyhow!("No CRTC can drive connector {:?}", connector.handle()))?,
        };
        debug!("Connector {:?} -> CRTC {:?}", connector.handle(), crtc_handle);
        Ok((crtc_handle, self.get_crtc(crtc_handle)?))
    }

    /// First CRTC in any of `encoders`' possible set
    fn reachable_crtc(&self, encoders: &[encoder::Handle]) -> Result<Option<crtc::Handle>> {
        for &handle in encoders {
            let possible = self.get_encoder(handle)?.possible_crtcs();
            if let Some(&crtc) = self.resources.filter_crtcs(possible).first() {
                return Ok(Some(crtc));
            }
        }
        Ok(None)
    }

    /// Drop DRM master privileges
    pub fn drop_master(&self) -> Result<()> {
        self.master_ioctl(drm_ioctl::DRM_IOCTL_DROP_MASTER, "DROP_MASTER")?;
        info!("DRM master dropped");
        Ok(())
    }

    /// Acquire DRM master privileges (required for SetCrtc)
    pub fn set_master(&self) -> Result<()> {
        self.master_ioctl(drm_ioctl::DRM_IOCTL_SET_MASTER, "SET_MASTER")?;
        info!("DRM master acquired");
        Ok(())
    }

    fn master_ioctl(&self, request: libc::c_ulong, name: &str) -> Result<()> {
        if unsafe { libc::ioctl(self.file.as_raw_fd(), request) } < 0 {
            return Err(anyhow!("{} failed: {}", name, std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.drop_master() {
            debug!("{}", e);
        }
    }
}

mod drm_ioctl {
    // include/uapi/drm/drm.h: _IO('d', 0x1e) / _IO('d', 0x1f)
    const DRM_IOCTL_BASE: u64 = 0x64;
    pub const DRM_IOCTL_SET_MASTER: libc::c_ulong =
        nix::request_code_none!(DRM_IOCTL_BASE, 0x1e) as libc::c_ulong;
    pub const DRM_IOCTL_DROP_MASTER: libc::c_ulong =
        nix::request_code_none!(DRM_IOCTL_BASE, 0x1f) as libc::c_ulong;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_device_must_exist() {
        let err = find_drm_device("/nonexistent/dri/card9").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dri/card9"));
    }

    #[test]
    fn test_shutdown_flag_starts_clear() {
        assert!(!shutdown_requested());
    }
}
