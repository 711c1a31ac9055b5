//! H.264 Annex-B stream inspection.
//!
//! Just enough of the bitstream to find NAL unit boundaries and learn the
//! coded picture size from the first SPS. Pixel reconstruction is left to
//! the external decoder.

pub mod bits;
pub mod nal;
pub mod sps;

use serde::Serialize;

pub use bits::BitReader;
pub use nal::{NalScanner, NalType, NalUnit};
pub use sps::{SpsInfo, parse_sps, parse_sps_nal};

/// Picture size recovered from the SPS, after cropping.
///
/// Set once per session; stream renegotiation is not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CodedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CodedDimensions {
    /// Byte size of one packed frame, or `None` if it is zero or would
    /// overflow.
    pub fn frame_size(&self, bytes_per_pixel: usize) -> Option<usize> {
        let size = (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(bytes_per_pixel)?;
        (size > 0).then_some(size)
    }
}

impl std::fmt::Display for CodedDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_bgr24() {
        let dims = CodedDimensions { width: 540, height: 960 };
        assert_eq!(dims.frame_size(3), Some(540 * 960 * 3));
        assert_eq!(dims.to_string(), "540x960");
    }

    #[test]
    fn zero_frame_size_is_none() {
        let dims = CodedDimensions { width: 0, height: 960 };
        assert_eq!(dims.frame_size(3), None);
    }
}
