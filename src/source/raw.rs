//! Raw RGB565 frame files
//!
//! Frames are stored back to back with no header, each one image pitch x
//! image height bytes. Regular files are memory-mapped; `-` reads stdin.

use log::{debug, info};
use memmap2::Mmap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::{check_buffer, check_geometry, FrameSource, SourceError};
use crate::video::layout::GameGeometry;

enum Input {
    Mapped { map: Mmap, offset: usize },
    Stream(Box<dyn Read>),
}

/// Frames read from a raw dump
pub struct RawFrames {
    geometry: GameGeometry,
    frame_bytes: usize,
    input: Input,
    /// Last frame handed out, for redraws
    current: Vec<u8>,
    frames_read: u64,
}

impl RawFrames {
    /// Open a dump file, or stdin for `-`
    pub fn open<P: AsRef<Path>>(path: P, geometry: GameGeometry) -> Result<Self, SourceError> {
        let path = path.as_ref();
        if path.as_os_str() == "-" {
            info!("Reading raw frames from stdin");
            return Self::from_reader(Box::new(std::io::stdin()), geometry);
        }

        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            info!("Raw frame file {} is empty", path.display());
            return Self::from_reader(Box::new(std::io::empty()), geometry);
        }

        // SAFETY: read-only mapping; the dump must not be truncated while open
        let map = unsafe { Mmap::map(&file)? };
        let layout = check_geometry(&geometry)?;
        info!(
            "Mapped {} ({} bytes, {} whole frames)",
            path.display(),
            map.len(),
            map.len() / layout.frame_bytes()
        );
        Self::with_input(Input::Mapped { map, offset: 0 }, geometry)
    }

    /// Stream frames from any reader
    pub fn from_reader(reader: Box<dyn Read>, geometry: GameGeometry) -> Result<Self, SourceError> {
        Self::with_input(Input::Stream(reader), geometry)
    }

    fn with_input(input: Input, geometry: GameGeometry) -> Result<Self, SourceError> {
        let frame_bytes = check_geometry(&geometry)?.frame_bytes();
        Ok(Self {
            geometry,
            frame_bytes,
            input,
            current: Vec::new(),
            frames_read: 0,
        })
    }

    #[allow(dead_code)]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next frame into `current`; false at a clean end of stream
    fn advance(&mut self) -> Result<bool, SourceError> {
        let expected = self.frame_bytes;
        match &mut self.input {
            Input::Mapped { map, offset } => {
                let remaining = map.len().saturating_sub(*offset);
                if remaining == 0 {
                    return Ok(false);
                }
                if remaining < expected {
                    return Err(SourceError::ShortFrame {
                        expected,
                        got: remaining,
                    });
                }
                self.current.clear();
                self.current
                    .extend_from_slice(&map[*offset..*offset + expected]);
                *offset += expected;
            }
            Input::Stream(reader) => {
                self.current.resize(expected, 0);
                let got = read_full(reader.as_mut(), &mut self.current)?;
                if got == 0 {
                    self.current.clear();
                    return Ok(false);
                }
                if got < expected {
                    return Err(SourceError::ShortFrame { expected, got });
                }
            }
        }
        self.frames_read += 1;
        Ok(true)
    }
}

/// Fill `buf` as far as the reader allows, returning the bytes read
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FrameSource for RawFrames {
    fn geometry(&self) -> GameGeometry {
        self.geometry
    }

    fn run_frame(&mut self, redraw: bool, buf: &mut [u8]) -> Result<bool, SourceError> {
        check_buffer(buf, self.frame_bytes)?;

        let reuse = redraw && !self.current.is_empty();
        if !reuse && !self.advance()? {
            debug!("Raw frames exhausted after {}", self.frames_read);
            return Ok(false);
        }

        buf[..self.frame_bytes].copy_from_slice(&self.current);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::layout::Orientation;
    use std::io::{Cursor, Write};

    fn geometry() -> GameGeometry {
        // 2x2 pixels, 8 bytes per frame
        GameGeometry {
            width: 2,
            height: 2,
            orientation: Orientation::empty(),
            aspect: (1, 1),
        }
    }

    fn reader(bytes: Vec<u8>) -> RawFrames {
        RawFrames::from_reader(Box::new(Cursor::new(bytes)), geometry()).unwrap()
    }

    #[test]
    fn test_stream_frames_then_end() {
        let data: Vec<u8> = (0..16).collect();
        let mut src = reader(data);
        let mut buf = [0u8; 8];
        assert!(src.run_frame(false, &mut buf).unwrap());
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(src.run_frame(false, &mut buf).unwrap());
        assert_eq!(buf[0], 8);
        assert!(!src.run_frame(false, &mut buf).unwrap());
        assert_eq!(src.frames_read(), 2);
    }

    #[test]
    fn test_redraw_repeats_current_frame() {
        let data: Vec<u8> = (0..16).collect();
        let mut src = reader(data);
        let mut buf = [0u8; 8];
        src.run_frame(false, &mut buf).unwrap();
        buf = [0xAA; 8];
        assert!(src.run_frame(true, &mut buf).unwrap());
        assert_eq!(buf[0], 0);
        assert_eq!(src.frames_read(), 1);
    }

    #[test]
    fn test_trailing_partial_frame() {
        let mut src = reader(vec![1u8; 11]);
        let mut buf = [0u8; 8];
        assert!(src.run_frame(false, &mut buf).unwrap());
        match src.run_frame(false, &mut buf) {
            Err(SourceError::ShortFrame { expected, got }) => {
                assert_eq!(expected, 8);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_stream_ends_cleanly() {
        let mut src = reader(Vec::new());
        let mut buf = [0u8; 8];
        assert!(!src.run_frame(false, &mut buf).unwrap());
    }

    #[test]
    fn test_mapped_file() {
        let path = std::env::temp_dir().join(format!("ogavid-raw-{}.bin", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&[7u8; 8]).unwrap();
            f.write_all(&[9u8; 4]).unwrap();
        }

        let mut src = RawFrames::open(&path, geometry()).unwrap();
        let mut buf = [0u8; 8];
        assert!(src.run_frame(false, &mut buf).unwrap());
        assert_eq!(buf, [7u8; 8]);
        assert!(matches!(
            src.run_frame(false, &mut buf),
            Err(SourceError::ShortFrame { got: 4, .. })
        ));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_file_ends_cleanly() {
        let path = std::env::temp_dir().join(format!("ogavid-empty-{}.bin", std::process::id()));
        File::create(&path).unwrap();
        let mut src = RawFrames::open(&path, geometry()).unwrap();
        let mut buf = [0u8; 8];
        assert!(!src.run_frame(false, &mut buf).unwrap());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        let huge = GameGeometry {
            width: u32::MAX,
            ..geometry()
        };
        let result = RawFrames::from_reader(Box::new(Cursor::new(Vec::new())), huge);
        assert!(matches!(result, Err(SourceError::Layout(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RawFrames::open("/nonexistent/ogavid.raw", geometry());
        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
