//! Decoded frame representation.
//!
//! Frames come out of the external decoder as tightly packed rows with no
//! padding, so the byte length is always `width * height * bpp`.

use std::time::Instant;

use bytes::Bytes;

use crate::h264::CodedDimensions;

// ── PixelFormat ──────────────────────────────────────────────────

/// Packed pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Blue, Green, Red.
    #[default]
    Bgr24,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb24,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra => 4,
        }
    }

    /// Name passed to the decoder's `-pix_fmt`.
    pub const fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgra => "bgra",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bgr24" => Some(PixelFormat::Bgr24),
            "rgb24" => Some(PixelFormat::Rgb24),
            "bgra" => Some(PixelFormat::Bgra),
            _ => None,
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One fully decoded picture.
///
/// `data` is reference counted, so clones handed to display consumers do
/// not copy pixels and cannot alias a buffer the decoder is still writing.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// `width * height * bpp` bytes, rows top to bottom.
    pub data: Bytes,
    /// Count of frames decoded before this one in the session.
    pub sequence: u64,
    /// When the last byte of the frame was read.
    pub decoded_at: Instant,
}

impl Frame {
    pub fn dimensions(&self) -> CodedDimensions {
        CodedDimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Bytes in one row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Row `y`, or `None` past the bottom or past the end of `data`.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride();
        self.data.get(start..start + self.stride())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        let size = (width * height * 3) as usize;
        Frame {
            width,
            height,
            format: PixelFormat::Bgr24,
            data: Bytes::from((0..size).map(|i| i as u8).collect::<Vec<_>>()),
            sequence: 0,
            decoded_at: Instant::now(),
        }
    }

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Bgr24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgra.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::default().ffmpeg_name(), "bgr24");
    }

    #[test]
    fn names_round_trip() {
        for f in [PixelFormat::Bgr24, PixelFormat::Rgb24, PixelFormat::Bgra] {
            assert_eq!(PixelFormat::from_name(f.ffmpeg_name()), Some(f));
        }
        assert_eq!(PixelFormat::from_name("BGR24"), Some(PixelFormat::Bgr24));
        assert_eq!(PixelFormat::from_name("yuv420p"), None);
    }

    #[test]
    fn row_addressing() {
        let f = frame(4, 2);
        assert_eq!(f.stride(), 12);
        assert_eq!(&f.row(1).unwrap()[3..6], &[15, 16, 17]);
        assert_eq!(f.row(2), None);
        assert_eq!(f.dimensions(), CodedDimensions { width: 4, height: 2 });
    }
}
