//! Raster decoding for uploaded images and drawn canvases.
//!
//! The core only needs a grayscale intensity grid, so decoding sits behind the
//! [`ImageDecoder`] trait. [`RasterDecoder`] is the default: PNG and JPEG go
//! through the `image` crate, and the Netpbm family (PGM/PPM, ASCII and binary)
//! is handed to [`NetpbmDecoder`].
//!
//! Both decoders refuse rasters above [`MAX_PIXELS`] before allocating.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageReader, Limits};
use ndarray::Array2;

use crate::error::{HomogError, Result};

/// Grayscale image with intensities in `[0, 1]`, indexed `[row, col]`.
pub type GrayImage = Array2<f64>;

/// Turns raw bytes of some raster format into a grayscale grid.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<GrayImage>;
}

/// Largest raster (in pixels) either decoder accepts, 4096×4096.
pub const MAX_PIXELS: usize = 1 << 24;

fn pixel_count(width: usize, height: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(HomogError::decode("image", "image has zero size"));
    }
    match width.checked_mul(height) {
        Some(count) if count <= MAX_PIXELS => Ok(count),
        _ => Err(HomogError::decode(
            "image",
            format!("{width}x{height} exceeds the {MAX_PIXELS}-pixel limit"),
        )),
    }
}

/// Rec. 601 luma.
fn luma(r: f64, g: f64, b: f64) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Default decoder: PNG, JPEG and Netpbm.
///
/// Alpha is dropped, so transparent canvas pixels read as their colour channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl RasterDecoder {
    fn is_netpbm(bytes: &[u8]) -> bool {
        matches!(bytes, [b'P', b'2' | b'3' | b'5' | b'6', ..])
    }
}

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<GrayImage> {
        if Self::is_netpbm(bytes) {
            return NetpbmDecoder.decode(bytes);
        }
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| HomogError::decode("image", e.to_string()))?;
        if reader.format().is_none() {
            return Err(HomogError::decode(
                "image",
                "unrecognized format (expected PNG, JPEG or Netpbm)",
            ));
        }
        let mut limits = Limits::default();
        limits.max_image_width = Some(1 << 16);
        limits.max_image_height = Some(1 << 16);
        limits.max_alloc = Some((MAX_PIXELS * 8) as u64);
        reader.limits(limits);

        let rgb = reader
            .decode()
            .map_err(|e| HomogError::decode("image", e.to_string()))?
            .into_rgb16();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        pixel_count(width, height)?;
        let scale = 1.0 / f64::from(u16::MAX);
        Ok(GrayImage::from_shape_fn((height, width), |(i, j)| {
            let [r, g, b] = rgb.get_pixel(j as u32, i as u32).0;
            (luma(f64::from(r), f64::from(g), f64::from(b)) * scale).clamp(0.0, 1.0)
        }))
    }
}

/// Decoder for Netpbm P2/P3/P5/P6 images. Colour is reduced to Rec. 601 luma.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetpbmDecoder;

impl ImageDecoder for NetpbmDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<GrayImage> {
        let mut reader = HeaderReader { bytes, pos: 0 };
        let magic = reader.token()?;
        let (channels, binary) = match magic.as_str() {
            "P2" => (1, false),
            "P5" => (1, true),
            "P3" => (3, false),
            "P6" => (3, true),
            other => {
                return Err(HomogError::decode(
                    "image",
                    format!("unsupported format tag {other:?} (expected P2, P3, P5 or P6)"),
                ));
            }
        };
        let width = reader.number("width")?;
        let height = reader.number("height")?;
        let maxval = reader.number("maxval")?;
        let pixels = pixel_count(width, height)?;
        if maxval == 0 || maxval > 65535 {
            return Err(HomogError::decode(
                "image",
                format!("maxval {maxval} outside 1..=65535"),
            ));
        }

        let count = pixels * channels;
        let truncated = |needed: usize| {
            HomogError::decode(
                "image",
                format!("raster truncated: expected {needed} bytes after header"),
            )
        };
        let samples = if binary {
            // Exactly one whitespace byte separates the header from the raster.
            let start = reader.pos + 1;
            let wide = maxval > 255;
            let needed = count * if wide { 2 } else { 1 };
            let raster = bytes
                .get(start..start + needed)
                .ok_or_else(|| truncated(needed))?;
            if wide {
                raster
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
                    .collect::<Vec<_>>()
            } else {
                raster.iter().map(|&b| b as usize).collect()
            }
        } else {
            // Every ASCII sample takes at least one byte.
            if count > bytes.len().saturating_sub(reader.pos) {
                return Err(truncated(count));
            }
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(reader.number("sample")?);
            }
            values
        };

        let scale = 1.0 / maxval as f64;
        let mut img = GrayImage::zeros((height, width));
        for (k, px) in img.iter_mut().enumerate() {
            let value = if channels == 1 {
                samples[k] as f64
            } else {
                let rgb = &samples[3 * k..3 * k + 3];
                luma(rgb[0] as f64, rgb[1] as f64, rgb[2] as f64)
            };
            *px = (value * scale).clamp(0.0, 1.0);
        }
        Ok(img)
    }
}

struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl HeaderReader<'_> {
    fn token(&mut self) -> Result<String> {
        loop {
            match self.bytes.get(self.pos) {
                Some(b'#') => {
                    while let Some(&b) = self.bytes.get(self.pos) {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(_) => break,
                None => return Err(HomogError::decode("image", "unexpected end of header")),
            }
        }
        let start = self.pos;
        while let Some(b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .map(str::to_owned)
            .map_err(|_| HomogError::decode("image", "header is not ASCII"))
    }

    fn number(&mut self, what: &str) -> Result<usize> {
        let tok = self.token()?;
        tok.parse()
            .map_err(|_| HomogError::decode("image", format!("invalid {what} {tok:?}")))
    }
}

/// Decodes a canvas payload: base64 text, optionally prefixed with a
/// `data:<mime>;base64,` header as browsers produce.
pub fn decode_drawing_payload(payload: &str) -> Result<Vec<u8>> {
    let body = match payload.split_once(";base64,") {
        Some((head, body)) if head.starts_with("data:") => body,
        _ => payload,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HomogError::decode("drawing", "payload is empty"));
    }
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| HomogError::decode("drawing", format!("invalid base64: {e}")))
}
