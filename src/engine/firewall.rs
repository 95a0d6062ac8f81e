// src/engine/firewall.rs
//
// Upload firewall: file name sanitizing, extension allow-list and size limits.
// Everything here runs before a single pixel is decoded.

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::ImageLabError;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024; // 50MB, same cap as the web form

/// Extensions accepted for uploads (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub max_pixels: u64,
    pub max_dimension: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_pixels: MAX_PIXELS,
            max_dimension: MAX_DIMENSION,
        }
    }
}

impl UploadLimits {
    pub fn enforce_source_len(&self, len: usize) -> Result<(), ImageLabError> {
        let len = len as u64;
        if len == 0 {
            return Err(ImageLabError::decode_failed("uploaded file is empty"));
        }
        if len > self.max_bytes {
            return Err(ImageLabError::upload_too_large(len, self.max_bytes));
        }
        Ok(())
    }

    pub fn enforce_dimensions(&self, width: u32, height: u32) -> Result<(), ImageLabError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ImageLabError::dimension_exceeds_limit(
                width.max(height),
                self.max_dimension,
            ));
        }
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(ImageLabError::pixel_count_exceeds_limit(
                pixels,
                self.max_pixels,
            ));
        }
        Ok(())
    }
}

/// Reduce an uploaded file name to a safe, flat name.
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; whitespace becomes `_`;
/// runs of dots collapse to one; path components and leading dots/underscores
/// are dropped. The result always passes `is_flat_name`.
pub fn sanitize_filename(raw: &str) -> Result<String, ImageLabError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned = String::with_capacity(base.len());
    for c in base.split_whitespace().collect::<Vec<_>>().join("_").chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        if keep && !(c == '.' && cleaned.ends_with('.')) {
            cleaned.push(c);
        }
    }
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        return Err(ImageLabError::invalid_parameter(
            "filename",
            raw.to_string(),
            "no usable characters left after sanitizing",
        ));
    }
    Ok(cleaned)
}

/// Lowercased extension if it is on the allow-list.
pub fn check_extension(filename: &str) -> Result<String, ImageLabError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ImageLabError::unsupported_format(if ext.is_empty() {
            "<none>".to_string()
        } else {
            ext
        }))
    }
}

/// True when `name` can be joined onto a storage directory without escaping it.
pub fn is_flat_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}
