//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/ogavid/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::path::Path;
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::constants::{DEFAULT_FPS, DEFAULT_GAME_HEIGHT, DEFAULT_GAME_WIDTH, MAX_FPS};
use crate::gpu::ShaderKind;
use crate::video::layout::{GameGeometry, Orientation, ProjectionOptions};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display settings
    pub display: DisplayOutputConfig,
    /// Video output settings (hot-reloadable)
    pub video: VideoConfig,
    /// Game screen settings
    pub game: GameConfig,
    /// Frame source settings
    pub source: SourceConfig,
}

/// Display settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOutputConfig {
    /// DRM device path (empty = first /dev/dri/cardN)
    pub device: String,
}

/// Video output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Darken alternate lines with the scanline shader
    pub scanlines: bool,
    /// Keep the game's aspect ratio instead of stretching to the panel
    pub maintain_aspect: bool,
    /// Always rotate for the sideways panel, even for vertical games
    pub auto_rotate: bool,
    /// Frame rate limit (0 = unlimited)
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            scanlines: false,
            maintain_aspect: true,
            auto_rotate: false,
            fps: DEFAULT_FPS,
        }
    }
}

impl VideoConfig {
    pub fn shader_kind(&self) -> ShaderKind {
        ShaderKind::from_scanlines(self.scanlines)
    }

    pub fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions {
            maintain_aspect: self.maintain_aspect,
            auto_rotate: self.auto_rotate,
        }
    }

    /// Frame rate clamped to the supported range
    pub fn effective_fps(&self) -> u32 {
        if self.fps > MAX_FPS {
            warn!("fps {} exceeds {}, clamping", self.fps, MAX_FPS);
            MAX_FPS
        } else {
            self.fps
        }
    }
}

/// Game screen settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Visible width in pixels
    pub width: u32,
    /// Visible height in pixels
    pub height: u32,
    /// Vertical (tate) game
    pub vertical: bool,
    /// Upside-down cabinet
    pub flipped: bool,
    /// Display aspect ratio
    pub aspect_x: u32,
    pub aspect_y: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_GAME_WIDTH,
            height: DEFAULT_GAME_HEIGHT,
            vertical: false,
            flipped: false,
            aspect_x: 4,
            aspect_y: 3,
        }
    }
}

impl GameConfig {
    pub fn geometry(&self) -> GameGeometry {
        let mut orientation = Orientation::empty();
        orientation.set(Orientation::VERTICAL, self.vertical);
        orientation.set(Orientation::FLIPPED, self.flipped);
        GameGeometry {
            width: self.width,
            height: self.height,
            orientation,
            aspect: (self.aspect_x, self.aspect_y),
        }
    }
}

/// Frame source kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Built-in colour bars
    #[default]
    Pattern,
    /// Raw RGB565 frames from `path`
    Raw,
}

/// Frame source settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Raw frame file, or "-" for stdin
    pub path: String,
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/ogavid/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. OGAVID_CONFIG environment variable
        if let Ok(path) = std::env::var("OGAVID_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/ogavid/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. OGAVID_CONFIG environment variable
    /// 2. ~/.config/ogavid/config.toml (user config)
    /// 3. /etc/ogavid/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Commented template holding the default settings
    pub fn default_template() -> Result<String> {
        let body = toml::to_string_pretty(&Self::default())?;
        Ok(format!(
            r#"# ogavid configuration
#
# Lookup order: $OGAVID_CONFIG, ~/.config/ogavid/config.toml,
# /etc/ogavid/config.toml. Changes to [video] apply while running.
#
# [display] device    DRM card path, empty picks the first /dev/dri/cardN
# [video] fps         0 disables frame pacing
# [source] kind       "pattern" (colour bars) or "raw" (RGB565 dump at path, "-" = stdin)

{}"#,
            body
        ))
    }

    /// Write default config to the user config path
    pub fn write_default_config() -> Result<PathBuf> {
        let config_path =
            default_config_path().ok_or_else(|| anyhow::anyhow!("Config directory not found"))?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        std::fs::write(&config_path, Self::default_template()?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(config_path)
    }
}

/// Config file change watcher (Linux only)
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // Editors often save by writing a temp file then renaming it
                use notify::EventKind;
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant && ours {
                    let _ = tx.send(());
                }
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        info!("Watching config: {}", config_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking)
    ///
    /// Drains queued events so one save triggers one reload.
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Settings last read from the config file, tracked across hot reloads
///
/// Command line overrides are not part of this; it only mirrors the file
/// so edits are compared against what the file said before.
pub struct ConfigReload {
    path: PathBuf,
    file: Config,
}

impl ConfigReload {
    pub fn new(path: PathBuf, file: Config) -> Self {
        Self { path, file }
    }

    /// `[video]` currently in effect from the file
    pub fn video(&self) -> &VideoConfig {
        &self.file.video
    }

    /// Re-read the file and push `[video]` changes through `apply_video`
    ///
    /// A file that fails to read or parse leaves everything as it was.
    /// The new `[video]` is only recorded once `apply_video` accepts it.
    /// Returns true when new video settings took effect.
    pub fn reload<F>(&mut self, apply_video: F) -> bool
    where
        F: FnOnce(&VideoConfig) -> Result<()>,
    {
        let new = match Config::load_from_file(&self.path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping current settings: {:#}", e);
                return false;
            }
        };

        if new.display != self.file.display
            || new.game != self.file.game
            || new.source != self.file.source
        {
            warn!("[display], [game] and [source] changes apply on restart");
            self.file.display = new.display;
            self.file.game = new.game;
            self.file.source = new.source;
        }

        if new.video == self.file.video {
            return false;
        }
        match apply_video(&new.video) {
            Ok(()) => {
                info!("Reloaded [video] from {}", self.path.display());
                self.file.video = new.video;
                true
            }
            Err(e) => {
                warn!("Failed to apply video settings: {:#}", e);
                false
            }
        }
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ogavid").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.display.device.is_empty());
        assert!(config.video.maintain_aspect);
        assert!(!config.video.scanlines);
        assert_eq!(config.video.fps, DEFAULT_FPS);
        assert_eq!(config.source.kind, SourceKind::Pattern);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[video]
scanlines = true

[game]
width = 224
height = 256
vertical = true
"#,
        )
        .unwrap();
        assert!(config.video.scanlines);
        assert!(config.video.maintain_aspect);
        assert_eq!(config.video.shader_kind(), ShaderKind::Scanline);

        let geometry = config.game.geometry();
        assert_eq!((geometry.width, geometry.height), (224, 256));
        assert!(geometry.is_rotated());
        assert!(!geometry.is_flipped());
        assert_eq!(geometry.aspect, (4, 3));
    }

    #[test]
    fn test_source_kind_parse() {
        let config = Config::from_toml("[source]\nkind = \"raw\"\npath = \"-\"\n").unwrap();
        assert_eq!(config.source.kind, SourceKind::Raw);
        assert_eq!(config.source.path, "-");
        assert!(Config::from_toml("[source]\nkind = \"camera\"\n").is_err());
    }

    #[test]
    fn test_template_round_trips_to_defaults() {
        let template = Config::default_template().unwrap();
        assert!(template.starts_with("# ogavid configuration"));
        assert_eq!(Config::from_toml(&template).unwrap(), Config::default());
    }

    #[test]
    fn test_fps_clamped() {
        let video = VideoConfig {
            fps: 1000,
            ..VideoConfig::default()
        };
        assert_eq!(video.effective_fps(), MAX_FPS);
        let unlimited = VideoConfig {
            fps: 0,
            ..VideoConfig::default()
        };
        assert_eq!(unlimited.effective_fps(), 0);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from_file(std::path::Path::new("/nonexistent/ogavid.toml"));
        assert!(err.is_err());
    }

    fn reload_fixture(name: &str, content: &str) -> (PathBuf, ConfigReload) {
        let path = std::env::temp_dir().join(format!("ogavid-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        let file = Config::load_from_file(&path).unwrap();
        (path.clone(), ConfigReload::new(path, file))
    }

    #[test]
    fn test_reload_keeps_settings_on_parse_error() {
        let (path, mut reload) = reload_fixture("broken", "[video]\nscanlines = true\n");
        assert!(reload.video().scanlines);

        std::fs::write(&path, "[video]\nscanlines = tru\n").unwrap();
        let mut applied = false;
        assert!(!reload.reload(|_| {
            applied = true;
            Ok(())
        }));
        assert!(!applied);
        assert!(reload.video().scanlines);
        assert_eq!(reload.video().shader_kind(), ShaderKind::Scanline);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reload_applies_video_change() {
        let (path, mut reload) = reload_fixture("video", "[video]\nfps = 60\n");

        std::fs::write(&path, "[video]\nfps = 30\n").unwrap();
        let mut seen = None;
        assert!(reload.reload(|video| {
            seen = Some(video.fps);
            Ok(())
        }));
        assert_eq!(seen, Some(30));
        assert_eq!(reload.video().effective_fps(), 30);

        // Same contents again: nothing to apply
        assert!(!reload.reload(|_| panic!("unchanged video reapplied")));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reload_rejected_video_is_retried() {
        let (path, mut reload) = reload_fixture("rejected", "[video]\nscanlines = false\n");

        std::fs::write(&path, "[video]\nscanlines = true\nfps = 30\n").unwrap();
        assert!(!reload.reload(|_| Err(anyhow::anyhow!("shader failed to link"))));
        assert!(!reload.video().scanlines);
        assert_eq!(reload.video().effective_fps(), DEFAULT_FPS);

        assert!(reload.reload(|_| Ok(())));
        assert!(reload.video().scanlines);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reload_compares_against_file_not_overrides() {
        let (path, mut reload) = reload_fixture("baseline", "[source]\nkind = \"pattern\"\n");
        let mut live = reload.file.clone();
        live.source.kind = SourceKind::Raw;
        live.source.path = "dump.raw".to_string();

        // Only [video] changes; the overridden source must not count as edited
        std::fs::write(&path, "[source]\nkind = \"pattern\"\n[video]\nfps = 50\n").unwrap();
        assert!(reload.reload(|_| Ok(())));
        assert_eq!(reload.file.source, Config::default().source);
        assert_ne!(reload.file.source, live.source);

        // A real [game] edit is recorded, so it is reported once
        std::fs::write(&path, "[video]\nfps = 50\n[game]\nwidth = 384\n").unwrap();
        assert!(!reload.reload(|_| panic!("video did not change")));
        assert_eq!(reload.file.game.width, 384);

        std::fs::remove_file(&path).unwrap();
    }
}
