// src/engine/pipeline.rs
//
// Transform engine: reduce, webp, mirror and gray.
// Every transform is a pure function of an ImageHandle; nothing here touches
// the filesystem. Callers get the new handle plus its encoded bytes.

use crate::engine::common::EngineResult;
use crate::engine::encoder::{encode_png, encode_webp};
use crate::error::ImageLabError;
use crate::handle::{ImageHandle, SourceFormat};
use crate::ops::{Operation, Scale, DEFAULT_WEBP_QUALITY};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::time::Instant;
use tracing::debug;

/// Resampling filter used by `reduce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleFilter {
    Bilinear,
    CatmullRom,
    Mitchell,
    #[default]
    Lanczos3,
}

impl ResampleFilter {
    fn fir(self) -> fir::FilterType {
        match self {
            Self::Bilinear => fir::FilterType::Bilinear,
            Self::CatmullRom => fir::FilterType::CatmullRom,
            Self::Mitchell => fir::FilterType::Mitchell,
            Self::Lanczos3 => fir::FilterType::Lanczos3,
        }
    }

    // image has no Mitchell; CatmullRom is the nearest cubic it offers.
    fn fallback(self) -> imageops::FilterType {
        match self {
            Self::Bilinear => imageops::FilterType::Triangle,
            Self::CatmullRom | Self::Mitchell => imageops::FilterType::CatmullRom,
            Self::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Encoding and resampling knobs shared by all transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSettings {
    pub webp_quality: u8,
    pub resize_filter: ResampleFilter,
    /// Recompress PNG artifacts with oxipng.
    pub optimize_png: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            webp_quality: DEFAULT_WEBP_QUALITY,
            resize_filter: ResampleFilter::default(),
            optimize_png: true,
        }
    }
}

/// A derived image together with the bytes that will be stored for it.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub handle: ImageHandle,
    pub encoded: Vec<u8>,
}

/// Result of `convert_webp`: the output plus the size change it caused.
#[derive(Debug, Clone)]
pub struct WebpConversion {
    pub output: TransformOutput,
    pub size_before: u64,
    pub size_after: u64,
}

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_image_lab_error(self) -> ImageLabError {
        ImageLabError::internal_panic(format!(
            "resize {}x{} -> {}x{} failed: {}",
            self.source_dims.0,
            self.source_dims.1,
            self.target_dims.0,
            self.target_dims.1,
            self.reason
        ))
    }
}

/// `(round(w * scale), round(h * scale))`; a side that rounds to zero is rejected.
pub fn calc_scaled_dimensions(width: u32, height: u32, scale: Scale) -> EngineResult<(u32, u32)> {
    let factor = scale.value();
    let new_w = (width as f64 * factor).round() as u32;
    let new_h = (height as f64 * factor).round() as u32;
    if new_w == 0 || new_h == 0 {
        return Err(ImageLabError::invalid_parameter(
            "scale",
            scale.to_string(),
            format!("{width}x{height} would shrink to {new_w}x{new_h}"),
        ));
    }
    Ok((new_w, new_h))
}

/// Downscale by `scale`, keeping the color mode. Output is PNG.
pub fn reduce(
    image: &ImageHandle,
    scale: Scale,
    settings: &TransformSettings,
) -> EngineResult<TransformOutput> {
    let started = Instant::now();
    let (new_w, new_h) = calc_scaled_dimensions(image.width(), image.height(), scale)?;

    let resized = if (new_w, new_h) == image.dimensions() {
        image.image().clone()
    } else {
        fast_resize_owned(image.image().clone(), new_w, new_h, settings.resize_filter)
            .map_err(ResizeError::into_image_lab_error)?
    };
    debug!(
        file = image.name(),
        from_w = image.width(),
        from_h = image.height(),
        to_w = new_w,
        to_h = new_h,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "resized"
    );

    finish_png(image, Operation::Reduce { scale }, resized, settings)
}

/// Re-encode as WebP at the configured quality.
///
/// The returned handle keeps the source pixels, dimensions and mode; only the
/// stored encoding changes. `size_after` may exceed `size_before`.
pub fn convert_webp(
    image: &ImageHandle,
    settings: &TransformSettings,
) -> EngineResult<WebpConversion> {
    let started = Instant::now();
    let encoded = encode_webp(image.image(), settings.webp_quality)?;
    let name = output_name(image, Operation::Webp)?;
    let handle = image.reencoded(name, SourceFormat::WebP, &encoded);
    debug!(
        file = image.name(),
        quality = settings.webp_quality,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "encoded webp"
    );
    Ok(WebpConversion {
        size_before: image.byte_size(),
        size_after: encoded.len() as u64,
        output: TransformOutput { handle, encoded },
    })
}

/// Top/bottom flip.
pub fn mirror(image: &ImageHandle, settings: &TransformSettings) -> EngineResult<TransformOutput> {
    finish_png(image, Operation::Mirror, image.image().flipv(), settings)
}

/// BT.601 luma on 8-bit values, `(299R + 587G + 114B + 500) / 1000`.
#[inline]
pub fn luma_bt601(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Single-channel copy of `img`. Alpha is dropped, grayscale input is copied as is.
pub fn to_luma(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageRgb8(rgb) => luma_from_interleaved(rgb.width(), rgb.height(), rgb, 3),
        DynamicImage::ImageRgba8(rgba) => {
            luma_from_interleaved(rgba.width(), rgba.height(), rgba, 4)
        }
        other => {
            let rgb = other.to_rgb8();
            luma_from_interleaved(rgb.width(), rgb.height(), &rgb, 3)
        }
    }
}

fn luma_from_interleaved(width: u32, height: u32, raw: &[u8], stride: usize) -> GrayImage {
    let luma: Vec<u8> = raw
        .chunks_exact(stride)
        .map(|px| luma_bt601(px[0], px[1], px[2]))
        .collect();
    GrayImage::from_raw(width, height, luma).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Convert to a one-channel GRAYSCALE image.
pub fn grayscale(
    image: &ImageHandle,
    settings: &TransformSettings,
) -> EngineResult<TransformOutput> {
    let gray = DynamicImage::ImageLuma8(to_luma(image.image()));
    finish_png(image, Operation::Gray, gray, settings)
}

fn output_name(image: &ImageHandle, op: Operation) -> EngineResult<String> {
    op.artifact_name(&image.source_key())
        .ok_or_else(|| ImageLabError::internal_panic(format!("{} has no image artifact", op.name())))
}

fn finish_png(
    source: &ImageHandle,
    op: Operation,
    pixels: DynamicImage,
    settings: &TransformSettings,
) -> EngineResult<TransformOutput> {
    let started = Instant::now();
    let name = output_name(source, op)?;
    let encoded = encode_png(&pixels, settings.optimize_png)?;
    let handle = ImageHandle::new(name, pixels, SourceFormat::Png, &encoded)?;
    debug!(
        artifact = handle.name(),
        bytes = encoded.len(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "encoded png"
    );
    Ok(TransformOutput { handle, encoded })
}

/// Resize an owned image with fast_image_resize, falling back to the image
/// crate if fir rejects the buffer. Gray, RGB and RGBA keep their layout.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResampleFilter,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // into_raw() hands over the buffer without copying
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageLuma8(gray) => (PixelType::U8, gray.into_raw()),
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other if other.color().has_alpha() => (PixelType::U8x4, other.to_rgba8().into_raw()),
        other => (PixelType::U8x3, other.to_rgb8().into_raw()),
    };

    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(filter.fir()));
    resize_pixels(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height, options, filter,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

#[allow(clippy::too_many_arguments)]
fn resize_pixels(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
    filter: ResampleFilter,
) -> std::result::Result<DynamicImage, String> {
    let required_bytes = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|n| n.checked_mul(pixel_type.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned
                .buffer_mut()
                .copy_from_slice(&src_pixels[..required_bytes]);
            resize_with_source_image(aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary {
        Ok(img) => Ok(img),
        Err(err) => {
            debug!(error = %err, "fir resize failed, using image crate");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                pixel_type,
                dst_width,
                dst_height,
                filter,
            )
            .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    filter: ResampleFilter,
) -> std::result::Result<DynamicImage, String> {
    let filter = filter.fallback();
    match pixel_type {
        PixelType::U8 => {
            let gray = GrayImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build gray image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageLuma8(imageops::resize(
                &gray, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8/U8x3/U8x4 pixel types".to_string()),
    }
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Alpha must be premultiplied or transparent pixels bleed their color.
    let premultiply = pixel_type == PixelType::U8x4;
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    let built = match pixel_type {
        PixelType::U8 => {
            GrayImage::from_raw(dst_width, dst_height, dst_pixels).map(DynamicImage::ImageLuma8)
        }
        PixelType::U8x3 => {
            RgbImage::from_raw(dst_width, dst_height, dst_pixels).map(DynamicImage::ImageRgb8)
        }
        PixelType::U8x4 => {
            RgbaImage::from_raw(dst_width, dst_height, dst_pixels).map(DynamicImage::ImageRgba8)
        }
        _ => None,
    };
    built.ok_or_else(|| "failed to create image from resized data".to_string())
}
