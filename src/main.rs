//! ogavid - emulator video output for DRM/KMS handhelds
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Frame Loop                  │
//! ├──────────────────────────────────────────┤
//! │  FrameSource (RGB565)                    │
//! │          ↓                               │
//! │  Blitter (GLES2 texture + quad)          │
//! │          ↓                               │
//! │  EGL/GBM front buffer → DRM SetCrtc      │
//! └──────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod drm;
mod gpu;
mod source;
mod video;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::time::{Duration, Instant};

use config::{Config, SourceKind};
use constants::{TEST_SCREEN_HEIGHT, TEST_SCREEN_WIDTH};
use source::{FrameSource, RawFrames, TestPattern};
use video::layout::{aspect_zoom, projection, rotation_degrees, ImageLayout};
use video::VideoOutput;

/// Print help message
fn print_help() {
    println!(
        r#"ogavid {} - emulator video output for DRM/KMS handhelds

USAGE:
    ogavid [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -t, --test              Print layout and projection without DRM
    --init-config           Generate default config file
    -f, --force             Overwrite config file without confirmation
    --source PATH           Play raw RGB565 frames from PATH ("-" = stdin)
    --frames N              Exit after N frames

EXAMPLES:
    ogavid                            Show the colour bar test pattern
    ogavid --source dump.raw          Play a raw frame dump
    ogavid --test                     Check layout math for the configured game
    sudo ogavid                       Run with root privileges (required for DRM)

CONFIG FILE:
    ~/.config/ogavid/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Value of `--name VALUE` or `--name=VALUE`
fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    args.iter().enumerate().find_map(|(i, a)| {
        if a == name {
            args.get(i + 1).map(String::as_str)
        } else {
            a.strip_prefix(prefix.as_str())
        }
    })
}

/// Test mode: print layout math without touching DRM
fn test_mode(cfg: &Config) -> Result<()> {
    let geometry = cfg.game.geometry();
    let layout = ImageLayout::new(&geometry).context("Game screen is not drawable")?;
    let options = cfg.video.projection_options();
    let (zoom_w, zoom_h) = aspect_zoom(
        TEST_SCREEN_WIDTH,
        TEST_SCREEN_HEIGHT,
        layout.buffer_width,
        layout.buffer_height,
    );
    let (max_u, max_v) = layout.max_uv();

    eprintln!("=== Layout Test ===\n");
    eprintln!(
        "Screen:  {}x{} (assumed)",
        TEST_SCREEN_WIDTH, TEST_SCREEN_HEIGHT
    );
    eprintln!(
        "Game:    {}x{} vertical={} flipped={}",
        geometry.width,
        geometry.height,
        geometry.is_rotated(),
        geometry.is_flipped()
    );
    eprintln!(
        "Image:   {}x{} pitch={}",
        layout.image_width, layout.image_height, layout.image_pitch
    );
    eprintln!(
        "Texture: {}x{} pitch={} uv=({:.4}, {:.4})",
        layout.texture_width, layout.texture_height, layout.texture_pitch, max_u, max_v
    );
    eprintln!(
        "Rotate:  {} degrees",
        rotation_degrees(geometry.orientation, options.auto_rotate)
    );
    eprintln!(
        "Zoom:    {:.4} x {:.4} (maintain_aspect={})",
        zoom_w, zoom_h, options.maintain_aspect
    );

    let m = projection(
        TEST_SCREEN_WIDTH,
        TEST_SCREEN_HEIGHT,
        &layout,
        geometry.orientation,
        options,
    );
    eprintln!("Matrix:");
    for row in 0..4 {
        eprintln!(
            "    [{:>8.4} {:>8.4} {:>8.4} {:>8.4}]",
            m.get(row, 0),
            m.get(row, 1),
            m.get(row, 2),
            m.get(row, 3)
        );
    }
    eprintln!("\n[OK] layout computed");
    Ok(())
}

/// --init-config handling
fn init_config(force: bool) -> Result<()> {
    if let Some(config_path) = config::default_config_path() {
        if config_path.exists() && !force {
            println!("Config file already exists: {}", config_path.display());
            print!("Overwrite? [y/N]: ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            let input = input.trim().to_lowercase();

            if input != "y" && input != "yes" {
                println!("Aborted.");
                return Ok(());
            }
        }
    }

    match Config::write_default_config() {
        Ok(path) => {
            println!("Config file generated:");
            println!("  Path:   {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            Err(e)
        }
    }
}

/// Build the configured frame source
fn open_source(cfg: &Config) -> Result<Box<dyn FrameSource>> {
    let geometry = cfg.game.geometry();
    let source: Box<dyn FrameSource> = match cfg.source.kind {
        SourceKind::Pattern => {
            info!("Frame source: test pattern");
            Box::new(TestPattern::new(geometry)?)
        }
        SourceKind::Raw => {
            if cfg.source.path.is_empty() {
                return Err(anyhow!("source.kind = \"raw\" needs source.path"));
            }
            info!("Frame source: raw frames from {}", cfg.source.path);
            Box::new(
                RawFrames::open(&cfg.source.path, geometry)
                    .with_context(|| format!("Cannot open frame source {}", cfg.source.path))?,
            )
        }
    };
    Ok(source)
}

/// Sleep out the rest of the frame period
fn pace(frame_start: Instant, fps: u32) {
    if fps == 0 {
        return;
    }
    let period = Duration::from_secs_f64(1.0 / fps as f64);
    if let Some(remaining) = period.checked_sub(frame_start.elapsed()) {
        std::thread::sleep(remaining);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Check command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("ogavid {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--init-config") {
        let force = args.iter().any(|a| a == "--force" || a == "-f");
        return init_config(force);
    }

    info!("ogavid starting...");

    // Load config file; hot reload compares against this, not the overrides below
    let file_cfg = Config::load();
    let mut cfg = file_cfg.clone();

    if let Some(path) = arg_value(&args, "--source") {
        cfg.source.kind = SourceKind::Raw;
        cfg.source.path = path.to_string();
    }

    let max_frames = match arg_value(&args, "--frames") {
        Some(n) => Some(
            n.parse::<u64>()
                .with_context(|| format!("--frames expects a number, got {}", n))?,
        ),
        None => None,
    };

    if args.iter().any(|a| a == "--test" || a == "-t") {
        info!("Test mode: skipping DRM initialization");
        return test_mode(&cfg);
    }

    let mut source = open_source(&cfg)?;

    drm::setup_signal_handlers();

    let mut output = VideoOutput::new(&cfg)?;
    let geometry = source.geometry();
    output.configure(
        geometry,
        cfg.video.projection_options(),
        cfg.video.shader_kind(),
    )?;

    // Config file change watcher (Linux only)
    // Watch the actual loaded config path, not just the default path
    #[cfg(target_os = "linux")]
    let mut config_watcher = Config::config_path().and_then(|path| {
        let watcher = config::ConfigWatcher::new(&path)
            .map_err(|e| warn!("Config hot-reload unavailable: {}", e))
            .ok()?;
        Some((watcher, config::ConfigReload::new(path, file_cfg)))
    });

    let mut frame = vec![0u8; ImageLayout::new(&geometry)?.frame_bytes()];
    let mut fps = cfg.video.effective_fps();
    let mut frames: u64 = 0;
    let mut notified_ready = false;

    let result = loop {
        let frame_start = Instant::now();

        if drm::shutdown_requested() {
            info!("Shutdown requested, stopping...");
            break Ok(());
        }

        // Config hot-reload (Linux only)
        #[cfg(target_os = "linux")]
        if let Some((ref watcher, ref mut reload)) = config_watcher {
            if watcher.check_reload() {
                info!("Config file change detected, reloading...");
                let applied = reload.reload(|video| {
                    output.update_options(video.projection_options(), video.shader_kind())
                });
                if applied {
                    fps = reload.video().effective_fps();
                }
            }
        }

        match source.run_frame(false, &mut frame) {
            Ok(true) => {}
            Ok(false) => {
                info!("End of frame stream after {} frames", frames);
                break Ok(());
            }
            Err(e) => break Err(anyhow::Error::new(e).context("Frame source failed")),
        }

        if let Err(e) = output.paint(&frame) {
            break Err(e);
        }
        frames += 1;

        if !notified_ready {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
            notified_ready = true;
        }

        if max_frames.is_some_and(|max| frames >= max) {
            info!("Reached {} frames, stopping...", frames);
            break Ok(());
        }

        pace(frame_start, fps);
    };

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
    drop(output);
    result
}
