// src/engine/chart.rs
//
// Histogram renderer: one bar chart per channel, drawn straight into an RgbImage.

use crate::engine::stats::{Channel, Histogram, BUCKETS};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);

/// Intensities that get a tick on the x axis.
pub const TICKS: [u8; 5] = [0, 64, 128, 192, 255];

const MIN_WIDTH: u32 = 64;
const MIN_HEIGHT: u32 = 48;
const TICK_LEN: u32 = 4;

/// Charts at least this large get a title, axis labels and tick values.
const LABELLED_WIDTH: u32 = 160;
const LABELLED_HEIGHT: u32 = 120;
const GLYPH: u32 = 8;

pub const X_LABEL: &str = "Value";
pub const Y_LABEL: &str = "Frequency";

/// `Histogram R`, `Histogram G`, `Histogram B`.
pub fn chart_title(channel: Channel) -> String {
    format!("Histogram {channel}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 400,
            height: 220,
        }
    }
}

impl ChartSettings {
    /// Size actually rendered; tiny sizes are raised to 64x48.
    pub fn effective_size(&self) -> (u32, u32) {
        (self.width.max(MIN_WIDTH), self.height.max(MIN_HEIGHT))
    }
}

pub fn bar_color(channel: Channel) -> Rgb<u8> {
    match channel {
        Channel::R => Rgb([214, 48, 49]),
        Channel::G => Rgb([46, 160, 67]),
        Channel::B => Rgb([36, 104, 204]),
    }
}

/// Plot area inside the margins, in pixels.
#[derive(Debug, Clone, Copy)]
struct Plot {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

fn is_labelled(width: u32, height: u32) -> bool {
    width >= LABELLED_WIDTH && height >= LABELLED_HEIGHT
}

impl Plot {
    fn for_size(width: u32, height: u32) -> Self {
        let (left, right, top, bottom) = if is_labelled(width, height) {
            // y label column, title row, tick values and x label rows
            (
                (width / 12).max(3 * GLYPH),
                (width / 40).max(2 * GLYPH),
                2 * GLYPH,
                TICK_LEN + 4 * GLYPH,
            )
        } else {
            (
                (width / 12).max(8),
                (width / 40).max(4),
                (height / 22).max(4),
                (height / 9).max(8),
            )
        };
        Self {
            left,
            top,
            width: width - left - right,
            height: height - top - bottom,
        }
    }

    fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// Horizontal span `[x0, x1)` of bucket `i`; at least one pixel wide.
    fn bucket_span(&self, i: usize) -> (u32, u32) {
        let x0 = self.left + (i as u64 * self.width as u64 / BUCKETS as u64) as u32;
        let x1 = self.left + ((i as u64 + 1) * self.width as u64 / BUCKETS as u64) as u32;
        (x0, x1.max(x0 + 1).min(self.left + self.width))
    }

    fn tick_x(&self, value: u8) -> u32 {
        let (x0, x1) = self.bucket_span(value as usize);
        (x0 + x1) / 2
    }
}

fn hline(img: &mut RgbImage, x0: u32, x1: u32, y: u32, color: Rgb<u8>) {
    if y >= img.height() {
        return;
    }
    for x in x0..x1.min(img.width()) {
        img.put_pixel(x, y, color);
    }
}

fn vline(img: &mut RgbImage, x: u32, y0: u32, y1: u32, color: Rgb<u8>) {
    if x >= img.width() {
        return;
    }
    for y in y0..y1.min(img.height()) {
        img.put_pixel(x, y, color);
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u64) < img.width() as u64 && (y as u64) < img.height() as u64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn glyph(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'))
}

fn text_width(text: &str) -> u32 {
    text.chars().count() as u32 * GLYPH
}

/// Left-to-right text with its top-left corner at `(x, y)`. Clipped at the edges.
fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin = x + i as i64 * GLYPH as i64;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH as i64 {
                if (bits >> col) & 1 == 1 {
                    put(img, origin + col, y + row as i64, color);
                }
            }
        }
    }
}

/// Text rotated a quarter turn counter-clockwise, read bottom to top, with
/// its bottom-left corner at `(x, y)`.
fn draw_text_up(img: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let base = y - i as i64 * GLYPH as i64;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH as i64 {
                if (bits >> col) & 1 == 1 {
                    put(img, x + row as i64, base - col, color);
                }
            }
        }
    }
}

fn draw_labels(img: &mut RgbImage, plot: &Plot, channel: Channel) {
    let width = img.width() as i64;
    let title = chart_title(channel);
    let title_x = (width - text_width(&title) as i64) / 2;
    draw_text(img, title_x, (GLYPH / 2) as i64, &title, AXIS);

    let ticks_y = (plot.bottom() + 1 + TICK_LEN + 2) as i64;
    for tick in TICKS {
        let label = tick.to_string();
        let x = plot.tick_x(tick) as i64 - text_width(&label) as i64 / 2;
        draw_text(img, x, ticks_y, &label, AXIS);
    }

    let center_x = (plot.left + plot.width / 2) as i64;
    let x_label_y = ticks_y + GLYPH as i64 + 3;
    draw_text(img, center_x - text_width(X_LABEL) as i64 / 2, x_label_y, X_LABEL, AXIS);

    let center_y = (plot.top + plot.height / 2) as i64;
    let y_label_bottom = center_y + text_width(Y_LABEL) as i64 / 2;
    draw_text_up(img, (GLYPH / 2) as i64, y_label_bottom, Y_LABEL, AXIS);
}

/// Render `histogram` as a bar chart colored for `channel`.
///
/// Bars are scaled so the tallest bucket fills the plot height. An all-zero
/// histogram renders the frame only. Charts of at least 160x120 also carry a
/// title, axis labels and the tick values.
pub fn render_histogram(
    histogram: &Histogram,
    channel: Channel,
    settings: &ChartSettings,
) -> RgbImage {
    let (width, height) = settings.effective_size();
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let plot = Plot::for_size(width, height);
    let right = plot.left + plot.width;

    for quarter in 1..=4u32 {
        let y = plot.bottom() - plot.height * quarter / 4;
        hline(&mut img, plot.left, right, y, GRID);
    }

    let tallest = histogram.max_count();
    if tallest > 0 {
        let color = bar_color(channel);
        for (i, &count) in histogram.counts().iter().enumerate() {
            if count == 0 {
                continue;
            }
            let bar = (count as u128 * plot.height as u128 / tallest as u128) as u32;
            let bar = bar.max(1);
            let (x0, x1) = plot.bucket_span(i);
            for x in x0..x1 {
                vline(&mut img, x, plot.bottom() - bar, plot.bottom(), color);
            }
        }
    }

    // axes drawn last so bars never cover them
    hline(&mut img, plot.left.saturating_sub(1), right, plot.bottom(), AXIS);
    vline(&mut img, plot.left.saturating_sub(1), plot.top, plot.bottom() + 1, AXIS);
    for tick in TICKS {
        let x = plot.tick_x(tick);
        vline(&mut img, x, plot.bottom() + 1, plot.bottom() + 1 + TICK_LEN, AXIS);
    }
    if is_labelled(width, height) {
        draw_labels(&mut img, &plot, channel);
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChartSettings {
        ChartSettings::default()
    }

    fn count_color(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|&&p| p == color).count()
    }

    #[test]
    fn test_default_size() {
        let img = render_histogram(&Histogram::new(), Channel::R, &settings());
        assert_eq!(img.dimensions(), (400, 220));
    }

    #[test]
    fn test_empty_histogram_draws_axes_only() {
        let img = render_histogram(&Histogram::new(), Channel::G, &settings());
        assert_eq!(count_color(&img, bar_color(Channel::G)), 0);
        assert!(count_color(&img, AXIS) > 0);
    }

    #[test]
    fn test_single_bucket_is_full_height_spike() {
        let mut counts = [0u64; BUCKETS];
        counts[128] = 500;
        let h = Histogram::from_counts(counts);
        let img = render_histogram(&h, Channel::B, &settings());
        let plot = Plot::for_size(400, 220);
        let (x0, _) = plot.bucket_span(128);
        let color = bar_color(Channel::B);
        assert_eq!(*img.get_pixel(x0, plot.top), color);
        assert_eq!(*img.get_pixel(x0, plot.bottom() - 1), color);
        let (other, _) = plot.bucket_span(10);
        assert_ne!(*img.get_pixel(other, plot.bottom() - 1), color);
    }

    #[test]
    fn test_small_counts_stay_visible() {
        let mut counts = [0u64; BUCKETS];
        counts[0] = u64::MAX / 2;
        counts[255] = 1;
        let img = render_histogram(&Histogram::from_counts(counts), Channel::R, &settings());
        let plot = Plot::for_size(400, 220);
        let (x0, _) = plot.bucket_span(255);
        assert_eq!(*img.get_pixel(x0, plot.bottom() - 1), bar_color(Channel::R));
    }

    #[test]
    fn test_tiny_settings_do_not_panic() {
        let mut h = Histogram::new();
        h.add(3);
        for (w, hgt) in [(0, 0), (1, 1), (64, 48), (1000, 50)] {
            let img = render_histogram(&h, Channel::R, &ChartSettings { width: w, height: hgt });
            assert!(img.width() >= 64 && img.height() >= 48);
        }
    }

    fn ink_in(img: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == AXIS)
            .count()
    }

    #[test]
    fn test_labelled_chart_has_title_and_axis_text() {
        let img = render_histogram(&Histogram::new(), Channel::R, &settings());
        let plot = Plot::for_size(400, 220);
        // title row above the plot
        assert!(ink_in(&img, 0, 0, 400, plot.top) > 0);
        // y label column left of the axis
        assert!(ink_in(&img, 0, plot.top, plot.left - 2, plot.bottom()) > 0);
        // tick values and x label below the tick marks
        let below = plot.bottom() + 1 + TICK_LEN + 1;
        assert!(ink_in(&img, 0, below, 400, 220) > 0);
        assert_eq!(chart_title(Channel::G), "Histogram G");
    }

    #[test]
    fn test_title_names_the_channel() {
        let plot = Plot::for_size(400, 220);
        let red = render_histogram(&Histogram::new(), Channel::R, &settings());
        let green = render_histogram(&Histogram::new(), Channel::G, &settings());
        let row = |img: &RgbImage| -> Vec<Rgb<u8>> {
            (0..plot.top)
                .flat_map(|y| (0..400).map(move |x| (x, y)))
                .map(|(x, y)| *img.get_pixel(x, y))
                .collect()
        };
        assert_ne!(row(&red), row(&green));
    }

    #[test]
    fn test_small_chart_has_no_text() {
        let small = ChartSettings {
            width: 100,
            height: 60,
        };
        let img = render_histogram(&Histogram::new(), Channel::R, &small);
        let plot = Plot::for_size(100, 60);
        assert_eq!(ink_in(&img, 0, 0, 100, plot.top), 0);
    }

    #[test]
    fn test_bucket_spans_cover_plot_in_order() {
        let plot = Plot::for_size(400, 220);
        let mut prev_end = plot.left;
        for i in 0..BUCKETS {
            let (x0, x1) = plot.bucket_span(i);
            assert!(x0 >= prev_end.saturating_sub(1));
            assert!(x1 > x0);
            assert!(x1 <= plot.left + plot.width);
            prev_end = x1;
        }
    }
}
