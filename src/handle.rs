// src/handle.rs
//
// Image Handle: decoded pixels plus the metadata reports are built from.
// Handles are immutable; transforms always build a new one.

use crate::error::{ImageLabError, Result};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::hash::Hasher;
use std::sync::Arc;

/// Every mode this crate produces stores 8 bits per channel.
pub const BITS_PER_CHANNEL: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ColorMode {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBA")]
    Rgba,
    #[serde(rename = "GRAYSCALE")]
    Grayscale,
}

impl ColorMode {
    pub fn channels(self) -> u8 {
        match self {
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
            ColorMode::Grayscale => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Rgb => "RGB",
            ColorMode::Rgba => "RGBA",
            ColorMode::Grayscale => "GRAYSCALE",
        }
    }

    /// Mode of an already normalized image.
    fn of(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(_) => ColorMode::Grayscale,
            DynamicImage::ImageRgba8(_) => ColorMode::Rgba,
            _ => ColorMode::Rgb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Bmp,
    WebP,
}

impl SourceFormat {
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Bmp => "BMP",
            Self::WebP => "WEBP",
        }
    }
}

/// Collapse whatever the decoder produced into one of the three 8-bit modes.
pub fn normalize_pixels(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) | DynamicImage::ImageLuma8(_) => {
            img
        }
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// SipHash-2-4 with fixed keys: identical across processes and Rust versions.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = siphasher::sip::SipHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Prefix shared by all artifacts derived from `name`: `photo.png` -> `photo_png`.
///
/// Dots become `_`; a literal `_` or `-` is escaped behind a `-`, so distinct
/// names never share a key (`a.b.png` -> `a_b_png`, `a_b.png` -> `a-_b_png`).
pub fn source_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        match c {
            '.' => key.push('_'),
            '_' => key.push_str("-_"),
            '-' => key.push_str("--"),
            other => key.push(other),
        }
    }
    key
}

/// One decoded raster image.
#[derive(Clone, Debug)]
pub struct ImageHandle {
    name: String,
    pixels: Arc<DynamicImage>,
    mode: ColorMode,
    source_format: SourceFormat,
    byte_size: u64,
    content_hash: u64,
}

impl ImageHandle {
    /// Wrap decoded pixels together with the encoded form they came from.
    pub fn new(
        name: impl Into<String>,
        image: DynamicImage,
        source_format: SourceFormat,
        encoded: &[u8],
    ) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImageLabError::decode_failed(format!(
                "image has zero-sized dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }
        let image = normalize_pixels(image);
        Ok(Self {
            name: name.into(),
            mode: ColorMode::of(&image),
            pixels: Arc::new(image),
            source_format,
            byte_size: encoded.len() as u64,
            content_hash: content_hash(encoded),
        })
    }

    /// Same pixels, stored under another name and encoding.
    pub fn reencoded(
        &self,
        name: impl Into<String>,
        source_format: SourceFormat,
        encoded: &[u8],
    ) -> Self {
        Self {
            name: name.into(),
            pixels: Arc::clone(&self.pixels),
            mode: self.mode,
            source_format,
            byte_size: encoded.len() as u64,
            content_hash: content_hash(encoded),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_key(&self) -> String {
        source_key(&self.name)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn channels(&self) -> u8 {
        self.mode.channels()
    }

    pub fn bits_per_channel(&self) -> u8 {
        BITS_PER_CHANNEL
    }

    pub fn bits_per_pixel(&self) -> u16 {
        BITS_PER_CHANNEL as u16 * self.channels() as u16
    }

    pub fn source_format(&self) -> SourceFormat {
        self.source_format
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }
}
