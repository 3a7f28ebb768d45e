//! Chart image decoding
//!
//! Charts arrive pre-rendered. PNG is decoded, flattened onto white and
//! re-encoded as a Flate image stream; JPEG is embedded untouched.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::PdfError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static [u8] {
        match self {
            ColorSpace::Gray => b"DeviceGray",
            ColorSpace::Rgb => b"DeviceRGB",
            ColorSpace::Cmyk => b"DeviceCMYK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Flate,
    Dct,
}

impl ImageFilter {
    pub fn pdf_name(self) -> &'static [u8] {
        match self {
            ImageFilter::Flate => b"FlateDecode",
            ImageFilter::Dct => b"DCTDecode",
        }
    }
}

/// A chart image ready to be embedded as an image XObject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartImage {
    pub width_px: u32,
    pub height_px: u32,
    pub color_space: ColorSpace,
    pub filter: ImageFilter,
    /// Encoded stream data, already in `filter` form
    pub data: Vec<u8>,
}

impl ChartImage {
    /// Decode PNG or JPEG bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, PdfError> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            decode_png(bytes)
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            decode_jpeg(bytes)
        } else {
            Err(PdfError::ImageError("not a PNG or JPEG image".into()))
        }
    }

    /// Height divided by width
    pub fn aspect_ratio(&self) -> f64 {
        if self.width_px == 0 {
            return 1.0;
        }
        self.height_px as f64 / self.width_px as f64
    }
}

fn decode_png(bytes: &[u8]) -> Result<ChartImage, PdfError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| PdfError::ImageError(format!("PNG header: {}", e)))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| PdfError::ImageError(format!("PNG data: {}", e)))?;
    let pixels = &buf[..info.buffer_size()];

    let (color_space, raw) = match info.color_type {
        png::ColorType::Grayscale => (ColorSpace::Gray, pixels.to_vec()),
        png::ColorType::Rgb => (ColorSpace::Rgb, pixels.to_vec()),
        png::ColorType::GrayscaleAlpha => (ColorSpace::Gray, flatten_alpha(pixels, 1)),
        png::ColorType::Rgba => (ColorSpace::Rgb, flatten_alpha(pixels, 3)),
        png::ColorType::Indexed => {
            return Err(PdfError::ImageError("indexed PNG was not expanded".into()))
        }
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| PdfError::ImageError(e.to_string()))?;
    let data = encoder
        .finish()
        .map_err(|e| PdfError::ImageError(e.to_string()))?;

    Ok(ChartImage {
        width_px: info.width,
        height_px: info.height,
        color_space,
        filter: ImageFilter::Flate,
        data,
    })
}

/// Composite interleaved `channels + alpha` pixels onto a white background
fn flatten_alpha(pixels: &[u8], channels: usize) -> Vec<u8> {
    let stride = channels + 1;
    let mut out = Vec::with_capacity(pixels.len() / stride * channels);
    for px in pixels.chunks_exact(stride) {
        let alpha = px[channels] as u32;
        for &c in &px[..channels] {
            let blended = (c as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            out.push(blended as u8);
        }
    }
    out
}

fn decode_jpeg(bytes: &[u8]) -> Result<ChartImage, PdfError> {
    let (width_px, height_px, components) = jpeg_dimensions(bytes)
        .ok_or_else(|| PdfError::ImageError("JPEG without frame header".into()))?;
    let color_space = match components {
        1 => ColorSpace::Gray,
        3 => ColorSpace::Rgb,
        4 => ColorSpace::Cmyk,
        n => {
            return Err(PdfError::ImageError(format!(
                "JPEG with {} components",
                n
            )))
        }
    };

    Ok(ChartImage {
        width_px,
        height_px,
        color_space,
        filter: ImageFilter::Dct,
        data: bytes.to_vec(),
    })
}

/// Walk JPEG segments up to the first SOFn marker
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = bytes.get(pos + 4..pos + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return Some((width, height, seg[5]));
        }
        pos += 2 + len;
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode a solid-color RGB PNG
    pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    #[test]
    fn test_decode_png_dimensions() {
        let png = solid_png(40, 20, [255, 0, 0]);
        let image = ChartImage::decode(&png).unwrap();
        assert_eq!(image.width_px, 40);
        assert_eq!(image.height_px, 20);
        assert_eq!(image.color_space, ColorSpace::Rgb);
        assert_eq!(image.filter, ImageFilter::Flate);
        assert!((image.aspect_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ChartImage::decode(b"GIF89a....").unwrap_err();
        assert!(err.to_string().contains("not a PNG or JPEG"));
    }

    #[test]
    fn test_truncated_png_fails() {
        let png = solid_png(10, 10, [0, 0, 0]);
        assert!(ChartImage::decode(&png[..20]).is_err());
    }

    #[test]
    fn test_flatten_alpha_on_white() {
        // Fully transparent becomes white, opaque keeps its color
        let pixels = [0, 0, 0, 0, 10, 20, 30, 255];
        assert_eq!(flatten_alpha(&pixels, 3), vec![255, 255, 255, 10, 20, 30]);
    }

    #[test]
    fn test_jpeg_dimensions_from_sof() {
        let mut jpeg = vec![0xFF, 0xD8];
        // APP0 segment with 2 payload bytes
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        // SOF0: len 11, precision 8, height 300, width 400, 3 components
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x01, 0x2C, 0x01, 0x90, 0x03]);
        jpeg.extend_from_slice(&[0x01, 0x11, 0x00]);
        let image = ChartImage::decode(&jpeg).unwrap();
        assert_eq!((image.width_px, image.height_px), (400, 300));
        assert_eq!(image.color_space, ColorSpace::Rgb);
        assert_eq!(image.filter, ImageFilter::Dct);
    }
}
