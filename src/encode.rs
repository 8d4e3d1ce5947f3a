//! Output encoding, data URLs and size helpers

use crate::{Error, Result};
use base64::Engine as Base64Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// An encoded bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Encode `bitmap`. `quality` in `[0, 1]` only affects JPEG, as with a
/// canvas `toDataURL` call.
pub fn encode(bitmap: &RgbaImage, format: ImageFormat, quality: f32) -> Result<EncodedImage> {
    let (width, height) = bitmap.dimensions();
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut bytes).write_image(bitmap.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        }
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality))
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
    }
    Ok(EncodedImage { format, width, height, bytes })
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Decode a PNG or JPEG payload into RGBA.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Downscale to fit within `max_width × max_height`, keeping the aspect
/// ratio. Width is fitted first, then height. Images that already fit are
/// returned unchanged.
pub fn resize(bitmap: &RgbaImage, max_width: u32, max_height: u32) -> Result<RgbaImage> {
    if max_width == 0 || max_height == 0 {
        return Err(Error::InvalidConfig("resize bounds must be positive".into()));
    }
    let (w0, h0) = bitmap.dimensions();
    let (mut w, mut h) = (w0 as f64, h0 as f64);
    if w > max_width as f64 {
        h = h * max_width as f64 / w;
        w = max_width as f64;
    }
    if h > max_height as f64 {
        w = w * max_height as f64 / h;
        h = max_height as f64;
    }
    let (w, h) = ((w as u32).max(1), (h as u32).max(1));
    if (w, h) == (w0, h0) {
        return Ok(bitmap.clone());
    }
    Ok(image::imageops::resize(bitmap, w, h, FilterType::Triangle))
}

/// The 800×600 stand-in returned when a viewport capture fails.
pub fn placeholder() -> RgbaImage {
    let (w, h) = (800u32, 600u32);
    let border = Rgba([0xdd, 0xdd, 0xdd, 255]);
    let fill = Rgba([0xf5, 0xf5, 0xf5, 255]);
    RgbaImage::from_fn(w, h, |x, y| {
        if x < 2 || y < 2 || x >= w - 2 || y >= h - 2 {
            border
        } else {
            fill
        }
    })
}

/// Approximate decoded size of a base64 data URL, in bytes.
pub fn data_url_size(data_url: &str) -> usize {
    let payload = data_url.split(',').nth(1).unwrap_or("");
    ((payload.len() * 3) as f64 / 4.0).round() as usize
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `2.00 MB`.
pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
