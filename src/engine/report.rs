// src/engine/report.rs
//
// Plain-text report for one uploaded image.

use crate::engine::stats::{Channel, ChannelStats};
use crate::handle::ImageHandle;
use std::collections::BTreeMap;
use std::fmt::Write;

pub const REPORT_TITLE: &str = "IMAGE PROCESSING REPORT";
pub const STATISTICS_HEADER: &str = "=== Channel statistics ===";

/// `1536` -> `"1.50 KB"`. Divides by 1024 until below 1024, capped at TB.
pub fn human_readable(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

/// Report name for the upload whose source key is `source_key`.
pub fn report_artifact_name(source_key: &str) -> String {
    format!("{source_key}_report.txt")
}

/// Compose the report. Field order is fixed; the statistics block appears
/// only when `analysis` is given and lists R, G, B in that order.
pub fn compose(upload: &ImageHandle, analysis: Option<&BTreeMap<Channel, ChannelStats>>) -> String {
    let mut out = String::new();
    // writeln! into a String cannot fail
    let _ = writeln!(out, "{REPORT_TITLE}");
    let _ = writeln!(out);
    let _ = writeln!(out, "File: {}", upload.name());
    let _ = writeln!(out, "Dimensions: {} x {}", upload.width(), upload.height());
    let _ = writeln!(
        out,
        "File size: {} bytes ({})",
        upload.byte_size(),
        human_readable(upload.byte_size())
    );
    let _ = writeln!(
        out,
        "Mode: {} - Channels: {}",
        upload.mode().as_str(),
        upload.channels()
    );
    let _ = writeln!(out, "Format: {}", upload.source_format().as_str());

    if let Some(stats) = analysis {
        let _ = writeln!(out);
        let _ = writeln!(out, "{STATISTICS_HEADER}");
        for channel in Channel::ALL {
            if let Some(s) = stats.get(&channel) {
                let _ = writeln!(
                    out,
                    "{channel}: min={}, max={}, mean={:.3}, median={}, std={:.3}",
                    s.min, s.max, s.mean, s.median, s.std
                );
            }
        }
    }
    out
}
