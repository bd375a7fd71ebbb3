#!/usr/bin/env rustc
//! Standalone test for the layout math
//! Runs anywhere (no Linux dependencies)
//!
//! Run: rustc tests/standalone_test.rs -o /tmp/ogavid_test && /tmp/ogavid_test

fn main() {
    test_next_power_of_two();
    test_aspect_zoom_cps2();
    test_aspect_zoom_neogeo();
    test_rotation_table();
    test_projection_corners();
    eprintln!("\n=== All tests passed ===");
}

// ========== Texture sizing ==========

fn next_power_of_two(n: u32) -> Option<u32> {
    n.max(1).checked_next_power_of_two()
}

fn test_next_power_of_two() {
    let cases = [(0, 1), (1, 1), (3, 4), (224, 256), (304, 512), (320, 512), (512, 512)];
    for (n, expected) in cases {
        assert_eq!(next_power_of_two(n), Some(expected), "n={}", n);
    }
    assert_eq!(next_power_of_two(3_000_000_000), None);
    eprintln!("[OK] next_power_of_two");
}

// ========== Aspect zoom ==========

fn aspect_zoom(sw: u32, sh: u32, bw: u32, bh: u32) -> (f32, f32) {
    let (fsw, fsh, fbw, fbh) = (sw as f32, sh as f32, bw as f32, bh as f32);
    if fsh / fsw > fbw / fbh {
        if sw >= bh {
            (1.0, (fsw / fbh) * fbw / fsh)
        } else {
            (1.0, 1.0)
        }
    } else {
        ((fsh / fbw) * fbh / fsw, 1.0)
    }
}

fn test_aspect_zoom_cps2() {
    // CPS2 384x224 on the 320x480 panel
    let (zw, zh) = aspect_zoom(320, 480, 384, 224);
    assert_eq!(zh, 1.0);
    assert!((zw - 0.875).abs() < 1e-5, "zw={}", zw);
    eprintln!("[OK] aspect_zoom CPS2");
}

fn test_aspect_zoom_neogeo() {
    // Neo Geo 304x224: narrower than the panel, height-limited
    let (zw, zh) = aspect_zoom(320, 480, 304, 224);
    assert_eq!(zw, 1.0);
    assert!(zh < 1.0 && zh > 0.85, "zh={}", zh);
    eprintln!("[OK] aspect_zoom Neo Geo");
}

// ========== Rotation ==========

fn rotation(vertical: bool, flipped: bool, auto_rotate: bool) -> f32 {
    match (auto_rotate || !vertical, flipped) {
        (true, false) => 90.0,
        (true, true) => 270.0,
        (false, false) => 180.0,
        (false, true) => 0.0,
    }
}

fn test_rotation_table() {
    assert_eq!(rotation(false, false, false), 90.0);
    assert_eq!(rotation(false, true, false), 270.0);
    assert_eq!(rotation(true, false, false), 180.0);
    assert_eq!(rotation(true, true, false), 0.0);
    assert_eq!(rotation(true, false, true), 90.0);
    eprintln!("[OK] rotation table");
}

// ========== Projection ==========

/// Rotate (ccw), then glOrtho(-0.5, 0.5, 0.5, -0.5), applied to a point
fn project(x: f32, y: f32, degrees: f32) -> (f32, f32) {
    // Matrix is R * O, so the ortho hits the vertex first
    let (ox, oy) = (2.0 * x, -2.0 * y);
    let (s, c) = degrees.to_radians().sin_cos();
    (c * ox - s * oy, s * ox + c * oy)
}

fn test_projection_corners() {
    // A quarter turn keeps the quad filling NDC
    let (x, y) = project(0.5, 0.5, 90.0);
    assert!((x - 1.0).abs() < 1e-5, "x={}", x);
    assert!((y - 1.0).abs() < 1e-5, "y={}", y);
    let (x, y) = project(-0.5, 0.5, 180.0);
    assert!((x - 1.0).abs() < 1e-5 && (y - 1.0).abs() < 1e-5);
    eprintln!("[OK] projection corners");
}
