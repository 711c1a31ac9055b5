//! Binary PPM (P6) export of a decoded frame.

use std::path::Path;

use scrcpy_ws_core::pipeline::{Frame, PixelFormat};

/// Encode `frame` as P6 with RGB samples.
pub fn encode_ppm(frame: &Frame) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", frame.width, frame.height);
    let pixels = frame.width as usize * frame.height as usize;
    let mut out = Vec::with_capacity(header.len() + pixels * 3);
    out.extend_from_slice(header.as_bytes());

    let bpp = frame.format.bytes_per_pixel();
    for row in (0..frame.height).map_while(|y| frame.row(y)) {
        for px in row.chunks_exact(bpp) {
            match frame.format {
                PixelFormat::Rgb24 => out.extend_from_slice(&px[..3]),
                PixelFormat::Bgr24 | PixelFormat::Bgra => {
                    out.extend_from_slice(&[px[2], px[1], px[0]])
                }
            }
        }
    }
    out
}

pub async fn write_ppm(frame: &Frame, path: &Path) -> std::io::Result<()> {
    tokio::fs::write(path, encode_ppm(frame)).await
}
