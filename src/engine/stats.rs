// src/engine/stats.rs
//
// Channel statistics engine: per-channel 256-bucket histograms and the
// descriptive statistics derived from them.

use crate::engine::pool;
use crate::handle::{ColorMode, ImageHandle};
use image::DynamicImage;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const BUCKETS: usize = 256;

/// Rows per rayon task. Small images stay on one thread.
const ROWS_PER_TASK: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Channel {
    R,
    G,
    B,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::R, Channel::G, Channel::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::B => "B",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occurrence count per intensity; bucket `i` counts intensity `i`.
#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [u64; BUCKETS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: [0; BUCKETS],
        }
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("total", &self.total())
            .field("max_count", &self.max_count())
            .finish()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: [u64; BUCKETS]) -> Self {
        Self { counts }
    }

    #[inline]
    pub fn add(&mut self, value: u8) {
        self.counts[value as usize] += 1;
    }

    pub fn merge(&mut self, other: &Histogram) {
        for (dst, src) in self.counts.iter_mut().zip(other.counts.iter()) {
            *dst += src;
        }
    }

    pub fn counts(&self) -> &[u64; BUCKETS] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Statistics of the sample this histogram describes; None when empty.
    pub fn stats(&self) -> Option<ChannelStats> {
        let n = self.total();
        if n == 0 {
            return None;
        }
        let nonzero = || self.counts.iter().enumerate().filter(|&(_, &c)| c > 0);
        let min = nonzero().next().map(|(i, _)| i as u8)?;
        let max = nonzero().last().map(|(i, _)| i as u8)?;

        let sum: u64 = nonzero().map(|(i, &c)| i as u64 * c).sum();
        let mean = sum as f64 / n as f64;

        // lower median: first bucket whose cumulative count reaches ceil(n/2)
        let half = n.div_ceil(2);
        let mut cumulative = 0u64;
        let median = self
            .counts
            .iter()
            .position(|&c| {
                cumulative += c;
                cumulative >= half
            })
            .map(|i| i as u8)
            .unwrap_or(max);

        let variance = nonzero()
            .map(|(i, &c)| {
                let d = i as f64 - mean;
                d * d * c as f64
            })
            .sum::<f64>()
            / n as f64;

        Some(ChannelStats {
            min,
            max,
            mean,
            median,
            std: variance.sqrt(),
        })
    }
}

fn round3<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 1000.0).round() / 1000.0)
}

/// Descriptive statistics of one channel. `std` is the population deviation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChannelStats {
    pub min: u8,
    pub max: u8,
    #[serde(serialize_with = "round3")]
    pub mean: f64,
    pub median: u8,
    #[serde(serialize_with = "round3")]
    pub std: f64,
}

/// Structural facts about an image, as reported by `analyse`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageStructure {
    pub mode: ColorMode,
    pub channels: u8,
    pub bits_per_channel: u8,
    pub bits_per_pixel: u16,
    pub dimensions: (u32, u32),
    pub file_size_bytes: u64,
}

impl ImageStructure {
    pub fn of(handle: &ImageHandle) -> Self {
        Self {
            mode: handle.mode(),
            channels: handle.channels(),
            bits_per_channel: handle.bits_per_channel(),
            bits_per_pixel: handle.bits_per_pixel(),
            dimensions: handle.dimensions(),
            file_size_bytes: handle.byte_size(),
        }
    }
}

/// Everything `analyse` computes from the pixels.
#[derive(Clone, Debug)]
pub struct ImageStatistics {
    pub structure: ImageStructure,
    pub histograms: [Histogram; 3],
    pub channel_stats: BTreeMap<Channel, ChannelStats>,
}

impl ImageStatistics {
    pub fn histogram(&self, channel: Channel) -> &Histogram {
        &self.histograms[channel.index()]
    }
}

type Rgb3 = [Histogram; 3];

fn empty3() -> Rgb3 {
    [Histogram::new(), Histogram::new(), Histogram::new()]
}

fn merge3(mut a: Rgb3, b: Rgb3) -> Rgb3 {
    for (dst, src) in a.iter_mut().zip(b.iter()) {
        dst.merge(src);
    }
    a
}

fn interleaved_histograms(raw: &[u8], row_len: usize, stride: usize) -> Rgb3 {
    raw.par_chunks(row_len * ROWS_PER_TASK)
        .fold(empty3, |mut acc, rows| {
            for px in rows.chunks_exact(stride) {
                acc[0].add(px[0]);
                acc[1].add(px[1]);
                acc[2].add(px[2]);
            }
            acc
        })
        .reduce(empty3, merge3)
}

fn luma_histogram(raw: &[u8], row_len: usize) -> Histogram {
    raw.par_chunks(row_len * ROWS_PER_TASK)
        .fold(Histogram::new, |mut acc, rows| {
            rows.iter().for_each(|&v| acc.add(v));
            acc
        })
        .reduce(Histogram::new, |mut a, b| {
            a.merge(&b);
            a
        })
}

/// R, G and B histograms of `img`.
///
/// Grayscale images report their luminance as all three channels; alpha is
/// never counted.
pub fn channel_histograms(img: &DynamicImage) -> Rgb3 {
    let width = img.width() as usize;
    if width == 0 || img.height() == 0 {
        return empty3();
    }
    pool::install(|| match img {
        DynamicImage::ImageLuma8(gray) => {
            let h = luma_histogram(gray.as_raw(), width);
            [h.clone(), h.clone(), h]
        }
        DynamicImage::ImageRgb8(rgb) => interleaved_histograms(rgb.as_raw(), width * 3, 3),
        DynamicImage::ImageRgba8(rgba) => interleaved_histograms(rgba.as_raw(), width * 4, 4),
        other => {
            let rgb = other.to_rgb8();
            interleaved_histograms(rgb.as_raw(), width * 3, 3)
        }
    })
}

/// Structure, histograms and per-channel statistics of exactly `handle`.
pub fn analyse(handle: &ImageHandle) -> ImageStatistics {
    let histograms = channel_histograms(handle.image());
    let channel_stats = Channel::ALL
        .iter()
        .filter_map(|&ch| histograms[ch.index()].stats().map(|s| (ch, s)))
        .collect();
    ImageStatistics {
        structure: ImageStructure::of(handle),
        histograms,
        channel_stats,
    }
}
