//! Uncompressed 32-bit Targa decoding. Rows are always flipped; the descriptor byte's origin bit is ignored.

use std::path::Path;
use color_eyre::Result;
use crate::renderer::error::RenderError;

const HEADER_LEN: usize = 18;

/// Decoded 32-bit Targa pixels, top row first, RGBA order
#[derive(Debug)]
pub struct TargaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub fn load(path: &Path) -> Result<TargaImage> {
    let bytes = std::fs::read(path)
        .map_err(|_| RenderError::FileNotFound(path.to_path_buf()))?;
    let image = decode(&bytes)?;
    log::info!("Loaded texture {} ({}x{})", path.display(), image.width, image.height);
    Ok(image)
}

/// Header layout: 12 ignored bytes, width and height as little-endian `u16`,
/// bits per pixel, one descriptor byte. Pixel rows follow bottom to top in BGRA.
pub fn decode(bytes: &[u8]) -> Result<TargaImage> {
    let header: &[u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| RenderError::invalid(format!(
            "targa header needs {} bytes, got {}",
            HEADER_LEN,
            bytes.len(),
        )))?;

    let width = u16::from_le_bytes([header[12], header[13]]) as u32;
    let height = u16::from_le_bytes([header[14], header[15]]) as u32;
    let bits_per_pixel = header[16];
    if bits_per_pixel != 32 {
        return Err(RenderError::UnsupportedFormat { bits_per_pixel }.into());
    }
    if width == 0 || height == 0 {
        return Err(RenderError::invalid(format!(
            "targa image has no pixels ({}x{})",
            width, height,
        )).into());
    }

    let row_len = width as usize * 4;
    let image_len = row_len * height as usize;
    let data = &bytes[HEADER_LEN..];
    if data.len() < image_len {
        return Err(RenderError::invalid(format!(
            "{}x{} targa needs {} bytes of pixel data, got {}",
            width, height, image_len, data.len(),
        )).into());
    }

    let mut pixels = Vec::with_capacity(image_len);
    for row in data[..image_len].chunks_exact(row_len).rev() {
        for bgra in row.chunks_exact(4) {
            pixels.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
        }
    }

    Ok(TargaImage {
        width,
        height,
        pixels,
    })
}
