use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

use crate::error::SkcmError;
use crate::stats::quantile;
use crate::table::write_atomic;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: u32 = 60;
const MARGIN_RIGHT: u32 = 20;
const MARGIN_TOP: u32 = 20;
const MARGIN_BOTTOM: u32 = 50;
const MAX_BINS: usize = 200;

const PANEL: Rgb<u8> = Rgb([229, 229, 229]);
const GRID: Rgb<u8> = Rgb([255, 255, 255]);
const BAR: Rgb<u8> = Rgb([70, 130, 180]);
const BAR_EDGE: Rgb<u8> = Rgb([40, 80, 120]);
const AXIS: Rgb<u8> = Rgb([77, 77, 77]);

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn new(values: &[f64]) -> Option<Self> {
        let finite = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect::<Vec<_>>();
        if finite.is_empty() {
            return None;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (low, high) = if max > min {
            (min, max)
        } else {
            (min - 0.5, max + 0.5)
        };

        let bins = bin_count(&finite).clamp(1, MAX_BINS);
        let width = (high - low) / bins as f64;
        let edges = (0..=bins)
            .map(|i| low + width * i as f64)
            .collect::<Vec<_>>();
        let mut counts = vec![0usize; bins];
        for value in finite {
            let index = (((value - low) / width) as usize).min(bins - 1);
            counts[index] += 1;
        }
        Some(Self { edges, counts })
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Bin count choosing the narrower of the Sturges and Freedman-Diaconis
/// widths (Sturges alone when the interquartile range is zero).
pub fn bin_count(values: &[f64]) -> usize {
    let n = values.len();
    if n < 2 {
        return 1;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return 1;
    }

    let sturges_width = range / ((n as f64).log2() + 1.0);
    let iqr = match (quantile(values, 0.75), quantile(values, 0.25)) {
        (Some(upper), Some(lower)) => upper - lower,
        _ => 0.0,
    };
    let fd_width = 2.0 * iqr / (n as f64).cbrt();
    let width = if fd_width > 0.0 {
        sturges_width.min(fd_width)
    } else {
        sturges_width
    };
    ((range / width).ceil() as usize).max(1)
}

pub fn write_histogram(path: &Path, values: &[f64]) -> Result<Option<Histogram>, SkcmError> {
    let Some(histogram) = Histogram::new(values) else {
        tracing::warn!(path = %path.display(), "no values to plot");
        return Ok(None);
    };
    let image = render(&histogram);

    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|err| SkcmError::Plot {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    write_atomic(path, bytes.get_ref())?;
    tracing::debug!(path = %path.display(), bins = histogram.counts.len(), "wrote histogram");
    Ok(Some(histogram))
}

fn render(histogram: &Histogram) -> RgbImage {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, GRID);
    let left = MARGIN_LEFT;
    let right = WIDTH - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = HEIGHT - MARGIN_BOTTOM;
    fill_rect(&mut image, left, top, right, bottom, PANEL);

    let plot_height = (bottom - top) as f64;
    let max_count = histogram.max_count().max(1) as f64;
    for step in 1..=4u32 {
        let y = bottom - ((plot_height * step as f64 / 4.0) as u32).min(bottom - top);
        fill_rect(&mut image, left, y, right, y + 1, GRID);
    }

    let bins = histogram.counts.len() as u32;
    let plot_width = right - left;
    for (i, count) in histogram.counts.iter().enumerate() {
        let x0 = left + plot_width * i as u32 / bins;
        let x1 = left + plot_width * (i as u32 + 1) / bins;
        let bar_height = ((*count as f64 / max_count) * plot_height * 0.95) as u32;
        if bar_height == 0 {
            continue;
        }
        let y0 = bottom - bar_height;
        fill_rect(&mut image, x0, y0, x1, bottom, BAR_EDGE);
        if x1 > x0 + 2 && bar_height > 1 {
            fill_rect(&mut image, x0 + 1, y0 + 1, x1 - 1, bottom, BAR);
        }
    }

    fill_rect(&mut image, left, bottom, right, bottom + 1, AXIS);
    fill_rect(&mut image, left - 1, top, left, bottom + 1, AXIS);
    for i in 0..=bins {
        let x = (left + plot_width * i / bins).min(right - 1);
        fill_rect(&mut image, x, bottom + 1, x + 1, bottom + 5, AXIS);
    }
    image
}

fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1.min(image.height()) {
        for x in x0..x1.min(image.width()) {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_cover_every_finite_value() {
        let values = [0.0, 1.0, 1.5, 2.0, 9.0, f64::NAN];
        let histogram = Histogram::new(&values).unwrap();
        assert_eq!(histogram.counts.iter().sum::<usize>(), 5);
        assert_eq!(histogram.edges.len(), histogram.counts.len() + 1);
        assert_eq!(histogram.edges[0], 0.0);
        assert_eq!(*histogram.edges.last().unwrap(), 9.0);
    }

    #[test]
    fn constant_values_use_one_bin() {
        let histogram = Histogram::new(&[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(histogram.counts, vec![3]);
        assert!(Histogram::new(&[f64::NAN]).is_none());
    }

    #[test]
    fn sturges_applies_without_spread() {
        // IQR is zero, so the Sturges width (range / 4) decides.
        assert_eq!(bin_count(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0]), 4);
    }

    #[test]
    fn writes_png() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hist_tpm_unstranded.png");
        let histogram = write_histogram(&path, &[1.0, 2.0, 2.5, 3.0, 7.0])
            .unwrap()
            .unwrap();
        assert!(histogram.max_count() >= 1);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert!(write_histogram(&temp.path().join("empty.png"), &[]).unwrap().is_none());
        assert!(!temp.path().join("empty.png").exists());
    }
}
