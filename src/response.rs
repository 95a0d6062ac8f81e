// src/response.rs
//
// JSON shapes handed back to the web layer.

use crate::engine::{AnalysisResult, Channel, ChannelStats, ImageStructure, OperationMetadata};
use crate::engine::ResultEnvelope;
use crate::error::ImageLabError;
use serde::Serialize;
use std::collections::BTreeMap;

/// `{filename, url, size_human, width, height}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub filename: String,
    pub url: String,
    pub size_human: String,
    pub width: u32,
    pub height: u32,
}

/// `{outputs: {...}}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessResult {
    pub outputs: Outputs,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outputs {
    Reduced {
        image: String,
        dimensions: (u32, u32),
    },
    Webp {
        image: String,
        size_before: u64,
        size_after: u64,
    },
    /// mirror and gray
    Image { image: String },
    Analysis {
        structure: ImageStructure,
        hist_stats: BTreeMap<Channel, ChannelStats>,
        hist_images: BTreeMap<Channel, String>,
    },
}

impl From<ResultEnvelope> for ProcessResult {
    fn from(envelope: ResultEnvelope) -> Self {
        let image = envelope.output_image.unwrap_or_default();
        let outputs = match envelope.metadata {
            OperationMetadata::Reduce { dimensions } => Outputs::Reduced { image, dimensions },
            OperationMetadata::Webp {
                size_before,
                size_after,
            } => Outputs::Webp {
                image,
                size_before,
                size_after,
            },
            OperationMetadata::Mirror | OperationMetadata::Gray => Outputs::Image { image },
            OperationMetadata::Analyse(AnalysisResult {
                structure,
                channel_stats,
                histogram_images,
            }) => Outputs::Analysis {
                structure,
                hist_stats: channel_stats,
                hist_images: histogram_images,
            },
        };
        Self { outputs }
    }
}

/// `{error: <message>}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&ImageLabError> for ErrorBody {
    fn from(err: &ImageLabError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}
