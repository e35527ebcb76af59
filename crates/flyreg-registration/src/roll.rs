//! Roll angle refinement.
//!
//! Second moments fix the major axis but leave the rotation about it
//! undetermined. The refiner looks at the two end regions of the specimen
//! in the cross-section plane `(v, w)` spanned by the secondary and tertiary
//! axes, measures the direction of an asymmetry there and turns the
//! secondary axis onto it.

use burn::tensor::backend::Backend;
use flyreg_core::filter::GaussianFilter;
use flyreg_core::image::Image;
use flyreg_core::spatial::rotation::rotation_about_x;
use flyreg_core::spatial::{Calibration, Spacing2};

use crate::error::{RegistrationError, Result};
use crate::pose::Pose;
use crate::settings::{RegistrationSettings, RollAngleMethod};

// Asymmetries weaker than this, relative to the weighted sample radius or
// the best ray score, are noise.
const MIN_ASYMMETRY: f64 = 1e-3;

/// One end-region voxel in the specimen cross-section.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CrossSectionSample {
    v: f64,
    w: f64,
    intensity: f64,
}

pub struct RollAngleRefiner<'a> {
    settings: &'a RegistrationSettings,
}

impl<'a> RollAngleRefiner<'a> {
    pub fn new(settings: &'a RegistrationSettings) -> Self {
        Self { settings }
    }

    /// Returns `pose` rotated about its major axis so the secondary axis
    /// points along the measured asymmetry.
    ///
    /// `channel` and `object_mask` share the working grid; `calibration` is
    /// the corrected calibration the pose center refers to. When no asymmetry
    /// can be measured the pose is returned unchanged.
    pub fn refine<B: Backend>(
        &self,
        pose: &Pose,
        calibration: &Calibration,
        channel: &Image<B, 3>,
        object_mask: &Image<B, 3>,
    ) -> Result<Pose> {
        if channel.shape() != object_mask.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: object_mask.shape().to_vec(),
                actual: channel.shape().to_vec(),
            });
        }
        let samples = self.end_region_samples(pose, calibration, channel, object_mask);
        let method = self.settings.roll_angle_computation_method;
        let angle = match method {
            RollAngleMethod::Intensity => weighted_direction(&samples, |s| s.intensity),
            RollAngleMethod::ShapeCentroids => weighted_direction(&samples, |_| 1.0),
            RollAngleMethod::ShapeProjection => {
                let s = self.settings;
                projection_direction::<B>(
                    &samples,
                    object_mask.spacing()[0],
                    s.projection_blur_sigma,
                    (s.projection_min_radius, s.projection_max_radius),
                    &channel.device(),
                )
            }
        };

        match angle {
            Some(theta) => {
                let refined = pose.with_rotation(pose.rotation() * rotation_about_x(theta));
                tracing::debug!(
                    ?method,
                    samples = samples.len(),
                    rotation = theta.to_degrees(),
                    roll = refined.roll(),
                    "Refined roll angle"
                );
                Ok(refined)
            }
            None => {
                tracing::warn!(?method, samples = samples.len(), "No roll asymmetry found, keeping ellipsoid roll");
                Ok(*pose)
            }
        }
    }

    fn end_region_samples<B: Backend>(
        &self,
        pose: &Pose,
        calibration: &Calibration,
        channel: &Image<B, 3>,
        object_mask: &Image<B, 3>,
    ) -> Vec<CrossSectionSample> {
        let [nz, ny, nx] = object_mask.shape();
        let mask = object_mask.to_vec();
        let intensity = channel.to_vec();
        let center = pose.center_physical(calibration);
        let frame = pose.rotation().transpose();
        let s = self.settings;

        let mut samples = Vec::new();
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let i = (z * ny + y) * nx + x;
                    if mask[i] <= 0.0 {
                        continue;
                    }
                    let local = frame * (object_mask.voxel_center(z, y, x) - center);
                    let along = local[0].abs();
                    let radial = (local[1] * local[1] + local[2] * local[2]).sqrt();
                    if along < s.roll_angle_min_distance_to_center
                        || along > s.roll_angle_max_distance_to_center
                        || radial < s.roll_angle_min_distance_to_axis
                    {
                        continue;
                    }
                    samples.push(CrossSectionSample {
                        v: local[1],
                        w: local[2],
                        intensity: intensity[i] as f64,
                    });
                }
            }
        }
        samples
    }
}

/// Direction of the weighted mean of the samples in the `(v, w)` plane.
fn weighted_direction(samples: &[CrossSectionSample], weight: impl Fn(&CrossSectionSample) -> f64) -> Option<f64> {
    let (mut total, mut sv, mut sw, mut sr) = (0.0, 0.0, 0.0, 0.0);
    for sample in samples {
        let wgt = weight(sample);
        total += wgt;
        sv += wgt * sample.v;
        sw += wgt * sample.w;
        sr += wgt * sample.v.hypot(sample.w);
    }
    if !(total > 0.0) {
        return None;
    }
    let (mv, mw, radius) = (sv / total, sw / total, sr / total);
    (mv.hypot(mw) > MIN_ASYMMETRY * radius && mv.is_finite() && mw.is_finite()).then(|| mw.atan2(mv))
}

/// Angle of the ray, searched in one degree steps, that carries the most
/// blurred projected mask mass between `radii.0` and `radii.1`.
fn projection_direction<B: Backend>(
    samples: &[CrossSectionSample],
    pixel: f64,
    sigma: f64,
    radii: (f64, f64),
    device: &B::Device,
) -> Option<f64> {
    if samples.is_empty() || !(pixel > 0.0) {
        return None;
    }
    let reach = samples
        .iter()
        .fold(radii.1, |r, s| r.max(s.v.abs()).max(s.w.abs()))
        + 3.0 * sigma.max(0.0);
    let half = (reach / pixel).ceil() as usize + 1;
    let n = 2 * half + 1;

    let mut counts = vec![0.0f32; n * n];
    for s in samples {
        let col = (s.v / pixel).round() as i64 + half as i64;
        let row = (s.w / pixel).round() as i64 + half as i64;
        if (0..n as i64).contains(&col) && (0..n as i64).contains(&row) {
            counts[row as usize * n + col as usize] += 1.0;
        }
    }
    let projection = Image::<B, 2>::from_vec(counts, [n, n], Spacing2::new(pixel, pixel), device);
    let blurred = GaussianFilter::<B>::new(sigma).apply(&projection).to_vec();

    let step = pixel / 2.0;
    let steps = ((radii.1 - radii.0) / step).floor() as usize;
    let ray = |degrees: usize| -> f64 {
        let (sin, cos) = (degrees as f64).to_radians().sin_cos();
        (0..=steps)
            .map(|k| {
                let r = radii.0 + k as f64 * step;
                bilinear(&blurred, n, r * cos / pixel + half as f64, r * sin / pixel + half as f64)
            })
            .sum()
    };
    let scores: Vec<f64> = (0..360).map(ray).collect();
    let (best, best_score) = scores
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, s)| if *s > acc.1 { (i, *s) } else { acc });
    let worst = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    (best_score - worst > MIN_ASYMMETRY * best_score.abs().max(1.0)).then(|| (best as f64).to_radians())
}

/// Samples a row-major `n x n` grid at continuous `(col, row)`; zero outside.
fn bilinear(values: &[f32], n: usize, col: f64, row: f64) -> f64 {
    let (c0, r0) = (col.floor(), row.floor());
    let (fc, fr) = (col - c0, row - r0);
    let at = |c: f64, r: f64| -> f64 {
        if c < 0.0 || r < 0.0 || c >= n as f64 || r >= n as f64 {
            0.0
        } else {
            values[r as usize * n + c as usize] as f64
        }
    };
    at(c0, r0) * (1.0 - fc) * (1.0 - fr)
        + at(c0 + 1.0, r0) * fc * (1.0 - fr)
        + at(c0, r0 + 1.0) * (1.0 - fc) * fr
        + at(c0 + 1.0, r0 + 1.0) * fc * fr
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use flyreg_core::spatial::rotation::wrap_degrees;
    use flyreg_core::spatial::{Point3, Spacing3};

    type TestBackend = NdArray<f32>;

    const SPACING: f64 = 10.0;
    const SHAPE: [usize; 3] = [21, 21, 49];

    fn center() -> Point3 {
        Point3::new(24.0, 10.0, 10.0)
    }

    /// Elongated specimen along x with a ridge and a bright band on its +y side.
    fn specimen() -> (Image<TestBackend, 3>, Image<TestBackend, 3>) {
        let [nz, ny, nx] = SHAPE;
        let c = center().coords * SPACING;
        let mut mask = Vec::with_capacity(nz * ny * nx);
        let mut intensity = Vec::with_capacity(nz * ny * nx);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let (u, v, w) = (x as f64 * SPACING - c[0], y as f64 * SPACING - c[1], z as f64 * SPACING - c[2]);
                    let body = (u / 220.0).powi(2) + (v / 70.0).powi(2) + (w / 70.0).powi(2) <= 1.0;
                    let ridge = u.abs() <= 190.0 && (60.0..=90.0).contains(&v) && w.abs() <= 20.0;
                    let inside = body || ridge;
                    mask.push(if inside { 1.0 } else { 0.0 });
                    intensity.push(if inside { if v > 30.0 { 200.0 } else { 50.0 } } else { 0.0 });
                }
            }
        }
        let spacing = Spacing3::new(SPACING, SPACING, SPACING);
        let device = Default::default();
        (
            Image::from_vec(intensity, SHAPE, spacing, &device),
            Image::from_vec(mask, SHAPE, spacing, &device),
        )
    }

    fn refine(method: RollAngleMethod, initial_roll: f64) -> Pose {
        let settings = RegistrationSettings::default().with_roll_angle_method(method);
        let (channel, mask) = specimen();
        let calibration = Calibration::isotropic(SPACING).unwrap();
        let pose = Pose::from_euler_degrees(center(), [0.0, 0.0, initial_roll]);
        RollAngleRefiner::new(&settings)
            .refine(&pose, &calibration, &channel, &mask)
            .unwrap()
    }

    #[test]
    fn test_every_method_turns_secondary_axis_to_asymmetry() {
        for method in [
            RollAngleMethod::Intensity,
            RollAngleMethod::ShapeCentroids,
            RollAngleMethod::ShapeProjection,
        ] {
            for initial in [0.0, 70.0, 180.0, -120.0] {
                let refined = refine(method, initial);
                let tolerance = if method == RollAngleMethod::ShapeProjection { 5.0 } else { 1e-6 };
                assert!(
                    wrap_degrees(refined.roll()).abs() < tolerance,
                    "{method:?} from {initial}: {}",
                    refined.roll()
                );
                assert!((refined.major_axis() - Pose::from_euler_degrees(center(), [0.0; 3]).major_axis()).norm() < 1e-9);
                assert_eq!(refined.center(), &center());
            }
        }
    }

    #[test]
    fn test_full_turn_does_not_change_result() {
        let a = refine(RollAngleMethod::Intensity, 35.0);
        let b = refine(RollAngleMethod::Intensity, 395.0);
        assert!((a.rotation() - b.rotation()).amax() < 1e-9);
    }

    #[test]
    fn test_opposite_initial_rolls_agree() {
        let a = refine(RollAngleMethod::ShapeCentroids, 10.0);
        let b = refine(RollAngleMethod::ShapeCentroids, 190.0);
        assert!((a.rotation() - b.rotation()).amax() < 1e-9);
    }

    /// Solid ellipsoid around `center()` with uniform intensity.
    fn round_specimen() -> Image<TestBackend, 3> {
        let [nz, ny, nx] = SHAPE;
        let c = center().coords * SPACING;
        let mut values = Vec::with_capacity(nz * ny * nx);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let (u, v, w) = (x as f64 * SPACING - c[0], y as f64 * SPACING - c[1], z as f64 * SPACING - c[2]);
                    let body = (u / 220.0).powi(2) + (v / 70.0).powi(2) + (w / 70.0).powi(2) <= 1.0;
                    values.push(if body { 80.0 } else { 0.0 });
                }
            }
        }
        Image::from_vec(values, SHAPE, Spacing3::new(SPACING, SPACING, SPACING), &Default::default())
    }

    #[test]
    fn test_round_cross_section_keeps_roll() {
        let image = round_specimen();
        let calibration = Calibration::isotropic(SPACING).unwrap();
        for method in [RollAngleMethod::Intensity, RollAngleMethod::ShapeCentroids] {
            let settings = RegistrationSettings::default().with_roll_angle_method(method);
            for roll in [0.0, 33.0, -140.0] {
                let pose = Pose::from_euler_degrees(center(), [0.0, 0.0, roll]);
                let refined = RollAngleRefiner::new(&settings)
                    .refine(&pose, &calibration, &image, &image)
                    .unwrap();
                assert_eq!(refined, pose, "{method:?} from {roll}");
            }
        }
    }

    #[test]
    fn test_weak_offset_is_not_an_asymmetry() {
        let ring = |offset: f64| -> Vec<CrossSectionSample> {
            (0..360)
                .map(|deg| {
                    let a = (deg as f64).to_radians();
                    CrossSectionSample {
                        v: 60.0 * a.cos() + offset,
                        w: 60.0 * a.sin(),
                        intensity: 1.0,
                    }
                })
                .collect()
        };
        assert_eq!(weighted_direction(&ring(0.01), |_| 1.0), None);
        let theta = weighted_direction(&ring(5.0), |_| 1.0).unwrap();
        assert!(theta.abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_specimen_keeps_pose() {
        let settings = RegistrationSettings::default().with_roll_angle_method(RollAngleMethod::ShapeCentroids);
        let spacing = Spacing3::new(SPACING, SPACING, SPACING);
        let device = Default::default();
        let mask = Image::<TestBackend, 3>::from_vec(vec![0.0; SHAPE.iter().product()], SHAPE, spacing, &device);
        let pose = Pose::from_euler_degrees(center(), [0.0, 0.0, 33.0]);
        let refined = RollAngleRefiner::new(&settings)
            .refine(&pose, &Calibration::isotropic(SPACING).unwrap(), &mask, &mask)
            .unwrap();
        assert_eq!(refined, pose);
    }
}
