// src/engine.rs
//
// The image processing and analysis engine:
// 1. Decode and register uploads behind size limits
// 2. Run one named operation per request (reduce, webp, mirror, gray, analyse)
// 3. Publish the resulting artifacts atomically and cache them by fingerprint
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected before decoding to stop decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULES
// =============================================================================

mod api;
mod cache;
mod chart;
mod common;
mod decoder;
mod encoder;
mod firewall;
mod io;
mod pipeline;
mod pool;
mod report;
mod stats;

pub use api::{
    chart_artifact_name, AnalysisResult, Dispatcher, OperationMetadata, Report, ResultEnvelope,
    Session,
};
pub use cache::{Cached, Fingerprint, ResultCache};
pub use chart::{chart_title, render_histogram, ChartSettings, X_LABEL, Y_LABEL};
pub use common::{run_with_panic_policy, EngineResult};
pub use decoder::{decode_handle, decode_image, detect_format};
pub use encoder::{encode_png, encode_webp, QualitySettings, WEBP_MAX_DIMENSION};
pub use firewall::{
    check_extension, is_flat_name, sanitize_filename, UploadLimits, ALLOWED_EXTENSIONS,
};
pub use io::{ArtifactBatch, ArtifactStore};
pub use pipeline::{
    calc_scaled_dimensions, convert_webp, fast_resize_owned, grayscale, luma_bt601, mirror,
    reduce, to_luma, ResampleFilter, ResizeError, TransformOutput, TransformSettings,
    WebpConversion,
};
pub use pool::{configured_threads, ENV_THREADS};
pub use report::{compose, human_readable, report_artifact_name};
pub use stats::{
    analyse, channel_histograms, Channel, ChannelStats, Histogram, ImageStatistics,
    ImageStructure, BUCKETS,
};
