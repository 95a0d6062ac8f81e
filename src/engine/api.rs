// src/engine/api.rs
//
// Pipeline dispatcher and session state.
//
// A Dispatcher owns the storage directories, the transform settings and the
// result cache; it is shared by every request. A Session is the explicit
// "what has this client uploaded" context that requests run against.

use crate::config::LabConfig;
use crate::engine::cache::{Fingerprint, ResultCache};
use crate::engine::chart::render_histogram;
use crate::engine::decoder::decode_handle;
use crate::engine::encoder::encode_chart_png;
use crate::engine::firewall::{check_extension, sanitize_filename};
use crate::engine::io::ArtifactStore;
use crate::engine::pipeline::{self, TransformOutput};
use crate::engine::pool;
use crate::engine::report::{compose, human_readable, report_artifact_name};
use crate::engine::stats::{self, Channel, ChannelStats, ImageStructure};
use crate::error::{ImageLabError, Result};
use crate::handle::{content_hash, ImageHandle};
use crate::ops::Operation;
use crate::response::{ProcessResult, UploadResult};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Output of `analyse`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub structure: ImageStructure,
    pub channel_stats: BTreeMap<Channel, ChannelStats>,
    /// Artifact name of each channel's histogram chart.
    pub histogram_images: BTreeMap<Channel, String>,
}

/// Operation-specific part of a ResultEnvelope.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationMetadata {
    Reduce { dimensions: (u32, u32) },
    Webp { size_before: u64, size_after: u64 },
    Mirror,
    Gray,
    Analyse(AnalysisResult),
}

/// What one dispatched operation produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultEnvelope {
    /// Derived image artifact; None for `analyse`.
    pub output_image: Option<String>,
    pub metadata: OperationMetadata,
}

impl ResultEnvelope {
    /// Every artifact name this envelope refers to.
    pub fn artifacts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.output_image.iter().map(String::as_str).collect();
        if let OperationMetadata::Analyse(analysis) = &self.metadata {
            names.extend(analysis.histogram_images.values().map(String::as_str));
        }
        names
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match &self.metadata {
            OperationMetadata::Analyse(analysis) => Some(analysis),
            _ => None,
        }
    }
}

/// A generated report and the artifact it was saved as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub name: String,
    pub text: String,
}

struct SessionEntry {
    handle: ImageHandle,
    analysis: Option<AnalysisResult>,
}

/// Uploads of one client and the latest analysis of each.
#[derive(Default)]
pub struct Session {
    uploads: RwLock<HashMap<String, SessionEntry>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uploads", &self.names())
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, filename: &str) -> Option<ImageHandle> {
        self.uploads
            .read()
            .get(filename)
            .map(|entry| entry.handle.clone())
    }

    pub fn analysis(&self, filename: &str) -> Option<AnalysisResult> {
        self.uploads
            .read()
            .get(filename)
            .and_then(|entry| entry.analysis.clone())
    }

    /// Uploaded names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.uploads.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.uploads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `handle`, replacing any upload of the same name and its analysis.
    fn insert(&self, handle: ImageHandle) {
        self.uploads.write().insert(
            handle.name().to_string(),
            SessionEntry {
                handle,
                analysis: None,
            },
        );
    }

    /// Attach `analysis` unless the upload was replaced while it ran.
    fn record_analysis(&self, analysed: &ImageHandle, analysis: AnalysisResult) {
        if let Some(entry) = self.uploads.write().get_mut(analysed.name()) {
            if entry.handle.content_hash() == analysed.content_hash() {
                entry.analysis = Some(analysis);
            }
        }
    }
}

/// A dispatched envelope plus the digest of every artifact it wrote.
/// The cache hands it out again only while the stored bytes still match.
#[derive(Clone, Debug)]
struct Published {
    envelope: ResultEnvelope,
    digests: Vec<(String, u64)>,
}

/// Routes validated operations to the engines and stores their artifacts.
pub struct Dispatcher {
    config: LabConfig,
    uploads: ArtifactStore,
    outputs: ArtifactStore,
    cache: ResultCache<Published>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("upload_dir", &self.uploads.dir())
            .field("output_dir", &self.outputs.dir())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Dispatcher {
    /// Create the storage directories and an empty cache.
    pub fn new(config: LabConfig) -> Result<Self> {
        let uploads = ArtifactStore::open(&config.upload_dir)?;
        let outputs = ArtifactStore::open(&config.output_dir)?;
        let config_cache_capacity = config.cache_capacity;
        Ok(Self {
            config,
            uploads,
            outputs,
            cache: ResultCache::with_capacity(config_cache_capacity),
        })
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Validate, decode and store an upload, then register it in `session`.
    pub fn upload(&self, session: &Session, filename: &str, bytes: &[u8]) -> Result<UploadResult> {
        let started = Instant::now();
        let name = sanitize_filename(filename)?;
        check_extension(&name)?;
        self.config.limits.enforce_source_len(bytes.len())?;

        let handle = decode_handle(&name, bytes, &self.config.limits)?;
        self.uploads.write(&name, bytes)?;

        let dropped = self.cache.invalidate_owner(&handle.source_key());
        if dropped > 0 {
            debug!(file = %name, entries = dropped, "invalidated cached results");
        }

        let result = UploadResult {
            url: self.config.upload_url(&name),
            size_human: human_readable(handle.byte_size()),
            width: handle.width(),
            height: handle.height(),
            filename: name,
        };
        info!(
            file = %result.filename,
            width = result.width,
            height = result.height,
            bytes = handle.byte_size(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "upload stored"
        );
        session.insert(handle);
        Ok(result)
    }

    /// Run `op_name` with `params` on an upload registered in `session`.
    pub fn process(
        &self,
        session: &Session,
        filename: &str,
        op_name: &str,
        params: &Value,
    ) -> Result<ProcessResult> {
        let handle = session
            .handle(filename)
            .ok_or_else(|| ImageLabError::not_found(filename.to_string()))?;
        let op = Operation::parse(op_name, params)?;
        let envelope = self.dispatch(&handle, op)?;
        if let Some(analysis) = envelope.analysis() {
            session.record_analysis(&handle, analysis.clone());
        }
        Ok(ProcessResult::from(envelope))
    }

    /// Run `op` on `image`, reusing a previous identical run while its
    /// artifacts still hold the bytes that run wrote. Artifacts of a failed
    /// run are never published.
    pub fn dispatch(&self, image: &ImageHandle, op: Operation) -> Result<ResultEnvelope> {
        let started = Instant::now();
        let key = image.source_key();
        let fingerprint = Fingerprint::of(&key, image.content_hash(), &op);
        let cached = self.cache.get_or_try_insert_with(
            fingerprint,
            &key,
            |published| self.still_published(published),
            || self.run(image, op),
        )?;
        info!(
            file = image.name(),
            op = op.name(),
            cached = cached.hit,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "operation dispatched"
        );
        Ok(cached.value.envelope)
    }

    fn still_published(&self, published: &Published) -> bool {
        published.digests.iter().all(|(name, digest)| {
            matches!(self.outputs.read(name), Ok(bytes) if content_hash(&bytes) == *digest)
        })
    }

    fn run(&self, image: &ImageHandle, op: Operation) -> Result<Published> {
        let settings = &self.config.transform;
        match op {
            Operation::Reduce { scale } => {
                let out = pipeline::reduce(image, scale, settings)?;
                let dimensions = out.handle.dimensions();
                self.publish_image(out, OperationMetadata::Reduce { dimensions })
            }
            Operation::Webp => {
                let conv = pipeline::convert_webp(image, settings)?;
                let metadata = OperationMetadata::Webp {
                    size_before: conv.size_before,
                    size_after: conv.size_after,
                };
                self.publish_image(conv.output, metadata)
            }
            Operation::Mirror => {
                self.publish_image(pipeline::mirror(image, settings)?, OperationMetadata::Mirror)
            }
            Operation::Gray => {
                self.publish_image(pipeline::grayscale(image, settings)?, OperationMetadata::Gray)
            }
            Operation::Analyse => self.analyse(image),
        }
    }

    fn publish_image(&self, out: TransformOutput, metadata: OperationMetadata) -> Result<Published> {
        let name = out.handle.name().to_string();
        let mut batch = self.outputs.batch();
        batch.stage(&name, &out.encoded)?;
        batch.commit()?;
        Ok(Published {
            digests: vec![(name.clone(), content_hash(&out.encoded))],
            envelope: ResultEnvelope {
                output_image: Some(name),
                metadata,
            },
        })
    }

    fn analyse(&self, image: &ImageHandle) -> Result<Published> {
        let started = Instant::now();
        let statistics = stats::analyse(image);
        let key = image.source_key();
        let chart = self.config.chart;
        let optimize = self.config.transform.optimize_png;

        let charts: Vec<(Channel, String, Vec<u8>)> = pool::install(|| {
            Channel::ALL
                .par_iter()
                .map(|&channel| {
                    let img = render_histogram(statistics.histogram(channel), channel, &chart);
                    let bytes = encode_chart_png(img, optimize)?;
                    Ok((channel, chart_artifact_name(&key, channel), bytes))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut batch = self.outputs.batch();
        for (_, name, bytes) in &charts {
            batch.stage(name, bytes)?;
        }
        batch.commit()?;
        debug!(
            file = image.name(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "analysed"
        );

        let digests = charts
            .iter()
            .map(|(_, name, bytes)| (name.clone(), content_hash(bytes)))
            .collect();
        let analysis = AnalysisResult {
            structure: statistics.structure,
            channel_stats: statistics.channel_stats,
            histogram_images: charts
                .into_iter()
                .map(|(channel, name, _)| (channel, name))
                .collect(),
        };
        Ok(Published {
            envelope: ResultEnvelope {
                output_image: None,
                metadata: OperationMetadata::Analyse(analysis),
            },
            digests,
        })
    }

    /// Compose the report for an upload and save it as `{key}_report.txt`.
    /// Statistics are included only after `analyse` ran for that upload.
    pub fn report(&self, session: &Session, filename: &str) -> Result<Report> {
        let handle = session
            .handle(filename)
            .ok_or_else(|| ImageLabError::not_found(filename.to_string()))?;
        let analysis = session.analysis(filename);
        let text = compose(&handle, analysis.as_ref().map(|a| &a.channel_stats));
        let name = report_artifact_name(&handle.source_key());
        self.outputs.write(&name, text.as_bytes())?;
        info!(file = filename, report = %name, with_stats = analysis.is_some(), "report written");
        Ok(Report { name, text })
    }

    /// Location of a derived artifact.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        self.outputs.path(name)
    }

    /// Location of a stored upload.
    pub fn upload_path(&self, name: &str) -> Result<PathBuf> {
        self.uploads.path(name)
    }
}

/// `{key}_hist_{R|G|B}.png`
pub fn chart_artifact_name(source_key: &str, channel: Channel) -> String {
    format!("{source_key}_hist_{channel}.png")
}
