//! Global intensity thresholds and binarization.
//!
//! Two automatic rules are provided: a background-peak rule that places the
//! threshold a number of peak half-widths above the histogram mode, and
//! Huang's fuzzy-entropy method.

use burn::tensor::backend::Backend;
use rayon::prelude::*;

use crate::image::Image;

/// Bins used for threshold histograms.
pub const HISTOGRAM_BINS: usize = 256;

/// Intensity histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    counts: Vec<u64>,
    min: f32,
    bin_width: f32,
}

impl Histogram {
    /// Returns `None` when `values` holds no finite sample.
    pub fn from_values(values: &[f32], bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let (min, max) = values
            .par_iter()
            .filter(|v| v.is_finite())
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        if min > max {
            return None;
        }

        let bin_width = if max > min { (max - min) / bins as f32 } else { 1.0 };
        let counts = values
            .par_iter()
            .filter(|v| v.is_finite())
            .fold(
                || vec![0u64; bins],
                |mut acc, &v| {
                    let bin = (((v - min) / bin_width) as usize).min(bins - 1);
                    acc[bin] += 1;
                    acc
                },
            )
            .reduce(
                || vec![0u64; bins],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        Some(Self {
            counts,
            min,
            bin_width,
        })
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn bin_width(&self) -> f32 {
        self.bin_width
    }

    pub fn bin_center(&self, bin: usize) -> f32 {
        self.min + (bin as f32 + 0.5) * self.bin_width
    }

    /// Upper intensity edge of `bin`.
    pub fn bin_upper(&self, bin: usize) -> f32 {
        self.min + (bin as f32 + 1.0) * self.bin_width
    }

    /// Most populated bin; ties resolve to the lowest intensity.
    pub fn mode(&self) -> usize {
        let mut best = 0;
        for (i, c) in self.counts.iter().enumerate() {
            if *c > self.counts[best] {
                best = i;
            }
        }
        best
    }
}

/// Threshold `n_half_widths` background-peak half-widths above the peak.
///
/// The background peak is the histogram mode; its half-width is the distance,
/// towards brighter bins, at which the count first falls below half the peak
/// count. A histogram with a single occupied bin yields its upper edge.
pub fn background_peak_threshold(values: &[f32], n_half_widths: f64) -> Option<f32> {
    let histogram = Histogram::from_values(values, HISTOGRAM_BINS)?;
    let counts = histogram.counts();
    let mode = histogram.mode();
    let half = counts[mode] as f64 / 2.0;

    let above = counts[mode + 1..].iter().position(|c| (*c as f64) < half);
    let Some(offset) = above else {
        return Some(histogram.bin_upper(HISTOGRAM_BINS - 1));
    };
    let half_width = (offset + 1) as f64 * histogram.bin_width() as f64;
    Some((histogram.bin_center(mode) as f64 + n_half_widths * half_width) as f32)
}

/// Huang's fuzzy-entropy threshold.
///
/// Minimises the Shannon entropy of the fuzzy membership of every bin in the
/// class (background or object) whose mean it lies closest to.
pub fn huang_threshold(values: &[f32]) -> Option<f32> {
    let histogram = Histogram::from_values(values, HISTOGRAM_BINS)?;
    let counts = histogram.counts();

    let first = counts.iter().position(|c| *c > 0)?;
    let last = counts.iter().rposition(|c| *c > 0)?;
    if first == last {
        return Some(histogram.bin_upper(last));
    }

    // Cumulative counts and first moments over bin indices.
    let mut s = vec![0.0f64; last + 1];
    let mut w = vec![0.0f64; last + 1];
    let mut cs = 0.0;
    let mut cw = 0.0;
    for i in first..=last {
        cs += counts[i] as f64;
        cw += i as f64 * counts[i] as f64;
        s[i] = cs;
        w[i] = cw;
    }

    let span = (last - first) as f64;
    let entropy: Vec<f64> = (0..=last - first)
        .map(|d| {
            let mu = 1.0 / (1.0 + d as f64 / span);
            if mu >= 1.0 {
                0.0
            } else {
                -mu * mu.ln() - (1.0 - mu) * (1.0 - mu).ln()
            }
        })
        .collect();

    let mut best = first;
    let mut best_entropy = f64::INFINITY;
    for t in first..last {
        let mu0 = (w[t] / s[t]).round() as i64;
        let mu1 = ((w[last] - w[t]) / (s[last] - s[t])).round() as i64;
        let mut total = 0.0;
        for i in first..=last {
            let mean = if i <= t { mu0 } else { mu1 };
            let d = (i as i64 - mean).unsigned_abs() as usize;
            total += entropy[d.min(entropy.len() - 1)] * counts[i] as f64;
        }
        if total < best_entropy {
            best_entropy = total;
            best = t;
        }
    }
    Some(histogram.bin_upper(best))
}

/// Voxels strictly above `threshold` become 1.0, everything else 0.0.
pub fn binarize<B: Backend>(image: &Image<B, 3>, threshold: f32) -> Image<B, 3> {
    image.with_data(image.data().clone().greater_elem(threshold).float())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Spacing3;
    use burn_ndarray::NdArray;

    fn two_level(background: usize, object: usize) -> Vec<f32> {
        let mut values = vec![10.0f32; background];
        values.extend(std::iter::repeat(200.0).take(object));
        values
    }

    #[test]
    fn histogram_rejects_non_finite_only_input() {
        assert!(Histogram::from_values(&[f32::NAN, f32::INFINITY], 16).is_none());
        assert!(Histogram::from_values(&[], 16).is_none());
    }

    #[test]
    fn background_peak_sits_between_levels() {
        let values = two_level(9000, 1000);
        let t = background_peak_threshold(&values, 5.0).unwrap();
        assert!(t > 10.0 && t < 200.0, "threshold {t}");
    }

    #[test]
    fn uniform_input_selects_nothing() {
        let values = vec![42.0f32; 64];
        let t = background_peak_threshold(&values, 5.0).unwrap();
        assert!(values.iter().all(|v| *v <= t));
        let t = huang_threshold(&values).unwrap();
        assert!(values.iter().all(|v| *v <= t));
    }

    #[test]
    fn huang_separates_two_levels() {
        let values = two_level(5000, 3000);
        let t = huang_threshold(&values).unwrap();
        assert!(t >= 10.0 && t < 200.0, "threshold {t}");
    }

    #[test]
    fn binarize_is_strict() {
        let device = Default::default();
        let image = Image::<NdArray<f32>, 3>::from_vec(vec![1.0, 2.0, 3.0, 4.0], [1, 2, 2], Spacing3::new(1.0, 1.0, 1.0), &device);
        assert_eq!(binarize(&image, 2.0).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
    }
}
