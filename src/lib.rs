// lib.rs
//
// imagelab: image processing and analysis pipeline
//
// Upload one raster image, run named operations on it (reduce, webp, mirror,
// gray, analyse) and get back stored artifacts, per-channel statistics and a
// plain-text report. HTTP routing stays outside; everything returned here
// serializes straight to the JSON a web layer sends.

pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod ops;
pub mod response;

pub use config::LabConfig;
pub use engine::{
    AnalysisResult, Channel, ChannelStats, Dispatcher, ImageStructure, OperationMetadata, Report,
    ResultEnvelope, Session,
};
pub use error::{ErrorCategory, ErrorKind, ImageLabError, Result};
pub use handle::{ColorMode, ImageHandle, SourceFormat};
pub use ops::{Operation, Scale};
pub use response::{ErrorBody, Outputs, ProcessResult, UploadResult};

use image::ImageReader;
use std::io::Cursor;

/// Header facts read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

/// Read dimensions and container format from encoded bytes.
pub fn inspect_header_from_bytes(data: &[u8]) -> Result<InspectMetadata> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageLabError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().map(|f| format!("{f:?}").to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ImageLabError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Extensions accepted by `Dispatcher::upload`.
pub fn supported_input_formats() -> Vec<&'static str> {
    engine::ALLOWED_EXTENSIONS.to_vec()
}

/// Operation names accepted by `Dispatcher::process`.
pub fn supported_operations() -> Vec<&'static str> {
    Operation::NAMES.to_vec()
}
