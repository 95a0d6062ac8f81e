// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), WebP (libwebp), BMP (image crate)

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::firewall::UploadLimits;
use crate::error::ImageLabError;
use crate::handle::{ImageHandle, SourceFormat};
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use std::time::Instant;
use tracing::debug;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8], limits: &UploadLimits) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ImageLabError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ImageLabError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ImageLabError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width()).unwrap_or(u32::MAX);
        let height = u32::try_from(decompress.height()).unwrap_or(u32::MAX);
        limits.enforce_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ImageLabError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            ImageLabError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8], limits: &UploadLimits) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| ImageLabError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| ImageLabError::decode_failed("png: missing header info"))?;

        let width = info.width as u32;
        let height = info.height as u32;
        limits.enforce_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ImageLabError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ImageLabError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ImageLabError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| ImageLabError::decode_failed("png: failed to build RGBA image"))?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ImageLabError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    ImageLabError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(ImageLabError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode still WebP using libwebp. Animated WebP is rejected.
pub fn decode_webp_libwebp(data: &[u8], limits: &UploadLimits) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            ImageLabError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return Err(ImageLabError::decode_failed(
                "webp: animated images are not supported",
            ));
        }
        limits.enforce_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ImageLabError::decode_failed("webp: decode failed"))?;

        Ok(decoded.to_image())
    })
}

/// Decode remaining formats (BMP) with the image crate.
pub fn decode_with_image_crate(data: &[u8], format: ImageFormat) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory_with_format(data, format)
            .map_err(|e| ImageLabError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Inspect encoded bytes and reject oversized images before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8], limits: &UploadLimits) -> EngineResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return limits.enforce_dimensions(width, height);
        }
    }
    Ok(())
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes)
/// - Check header dimensions against the limits
/// - Route to the fastest decoder for the format
pub fn decode_image(
    bytes: &[u8],
    limits: &UploadLimits,
) -> EngineResult<(DynamicImage, SourceFormat)> {
    let detected = detect_format(bytes)
        .ok_or_else(|| ImageLabError::unsupported_format("unrecognized image data"))?;
    let source_format = SourceFormat::from_image_format(detected)
        .ok_or_else(|| ImageLabError::unsupported_format(format!("{detected:?}").to_lowercase()))?;

    ensure_dimensions_safe(bytes, limits)?;

    let img = match source_format {
        SourceFormat::Jpeg => decode_jpeg_mozjpeg(bytes, limits)?,
        SourceFormat::Png => decode_png_zune(bytes, limits)?,
        SourceFormat::WebP => decode_webp_libwebp(bytes, limits)?,
        SourceFormat::Bmp => decode_with_image_crate(bytes, detected)?,
    };
    Ok((img, source_format))
}

/// Decode `bytes` into an Image Handle named `name`.
pub fn decode_handle(name: &str, bytes: &[u8], limits: &UploadLimits) -> EngineResult<ImageHandle> {
    let started = Instant::now();
    let (img, source_format) = decode_image(bytes, limits)?;
    let handle = ImageHandle::new(name, img, source_format, bytes)?;
    debug!(
        file = name,
        format = source_format.as_str(),
        width = handle.width(),
        height = handle.height(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "decoded"
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ColorMode;
    use image::{GenericImageView, Luma, Rgb, Rgba};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]))),
            ImageFormat::Png,
        )
    }

    fn encode_webp(width: u32, height: u32) -> Vec<u8> {
        let rgb: Vec<u8> = std::iter::repeat([10u8, 20u8, 30u8])
            .take((width * height) as usize)
            .flatten()
            .collect();
        let encoder = webp::Encoder::from_rgb(&rgb, width, height);
        encoder.encode_lossless().to_vec()
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_png(64, 64);
        assert!(ensure_dimensions_safe(&data, &UploadLimits::default()).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let limits = UploadLimits {
            max_dimension: 32,
            ..UploadLimits::default()
        };
        let data = encode_png(33, 1);
        let err = ensure_dimensions_safe(&data, &limits).unwrap_err();
        assert!(matches!(err, ImageLabError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn test_detect_format_jpeg_and_png() {
        let png = encode_png(2, 2);
        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))),
            ImageFormat::Jpeg,
        );
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"definitely not an image"), None);
    }

    #[test]
    fn test_decode_png_keeps_rgb_pixels() {
        let png = encode_png(3, 1);
        let (img, fmt) = decode_image(&png, &UploadLimits::default()).unwrap();
        assert_eq!(fmt, SourceFormat::Png);
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_decode_png_grayscale_and_rgba() {
        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([77]))),
            ImageFormat::Png,
        );
        let handle = decode_handle("g.png", &gray, &UploadLimits::default()).unwrap();
        assert_eq!(handle.mode(), ColorMode::Grayscale);

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4]))),
            ImageFormat::Png,
        );
        let handle = decode_handle("a.png", &rgba, &UploadLimits::default()).unwrap();
        assert_eq!(handle.mode(), ColorMode::Rgba);
        assert_eq!(handle.byte_size(), rgba.len() as u64);
    }

    #[test]
    fn test_decode_jpeg_with_mozjpeg() {
        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([9, 8, 7]))),
            ImageFormat::Jpeg,
        );
        let (img, fmt) = decode_image(&jpeg, &UploadLimits::default()).unwrap();
        assert_eq!(fmt, SourceFormat::Jpeg);
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn test_decode_bmp_with_image_crate() {
        let bmp = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 4, Rgb([200, 100, 50]))),
            ImageFormat::Bmp,
        );
        let handle = decode_handle("b.bmp", &bmp, &UploadLimits::default()).unwrap();
        assert_eq!(handle.source_format(), SourceFormat::Bmp);
        assert_eq!(handle.dimensions(), (5, 4));
        assert_eq!(handle.image().to_rgb8().get_pixel(4, 3).0, [200, 100, 50]);
    }

    #[test]
    fn test_decode_webp_with_libwebp() {
        let webp = encode_webp(3, 2);
        let (img, fmt) = decode_image(&webp, &UploadLimits::default()).unwrap();
        assert_eq!(fmt, SourceFormat::WebP);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_rejects_garbage_and_truncated_data() {
        let err = decode_image(b"hello world, not pixels", &UploadLimits::default()).unwrap_err();
        assert!(matches!(err, ImageLabError::UnsupportedFormat { .. }));

        let png = encode_png(16, 16);
        let truncated = &png[..png.len() / 2];
        assert!(decode_image(truncated, &UploadLimits::default()).is_err());
    }
}
