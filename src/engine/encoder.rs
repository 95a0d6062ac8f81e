// src/engine/encoder.rs
//
// Encoder operations: PNG (image + oxipng) and WebP (libwebp) with quality settings

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::error::ImageLabError;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::borrow::Cow;
use std::io::Cursor;

/// Largest width or height libwebp can encode.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// oxipng preset used for PNG artifacts. Lossless; higher presets trade time
/// for a few more bytes.
const PNG_OPTIMIZATION_PRESET: u8 = 2;

/// Single source of truth for deriving libwebp settings from a 0-100 quality.
/// Bands:
/// - High (>=85): favor visual quality
/// - Balanced (70-84)
/// - Fast (<70)
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else {
            QualityBand::Fast
        }
    }

    // Method 4 with a single pass is the usual speed/size balance point.
    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast => 0,
        }
    }
}

/// Encode to PNG, optionally recompressed losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, optimize: bool) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ImageLabError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        if !optimize {
            return Ok(buf);
        }

        let mut options = oxipng::Options::from_preset(PNG_OPTIMIZATION_PRESET);
        options.strip = oxipng::StripChunks::Safe;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ImageLabError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode a chart (always RGB) to PNG.
pub fn encode_chart_png(chart: RgbImage, optimize: bool) -> EngineResult<Vec<u8>> {
    encode_png(&DynamicImage::ImageRgb8(chart), optimize)
}

/// Encode to lossy WebP. RGBA keeps its alpha plane; every other mode is
/// expanded to RGB, since WebP has no single-channel layout.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    let (w, h) = (img.width(), img.height());
    if w > WEBP_MAX_DIMENSION || h > WEBP_MAX_DIMENSION {
        return Err(ImageLabError::encode_failed(
            "webp",
            format!("{w}x{h} exceeds the WebP limit of {WEBP_MAX_DIMENSION} px per side"),
        ));
    }

    run_with_panic_policy("encode:webp", || {
        let settings = QualitySettings::new(quality);
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ImageLabError::internal_panic("failed to create WebPConfig"))?;
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = match img {
            DynamicImage::ImageRgba8(rgba) => {
                webp::Encoder::from_rgba(rgba, w, h).encode_advanced(&config)
            }
            _ => {
                let rgb: Cow<'_, RgbImage> = match img {
                    DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
                    other => Cow::Owned(other.to_rgb8()),
                };
                webp::Encoder::from_rgb(&rgb, w, h).encode_advanced(&config)
            }
        }
        .map_err(|e| ImageLabError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;

        Ok(mem.to_vec())
    })
}
