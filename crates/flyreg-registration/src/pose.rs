//! Ellipsoid-based pose estimation.
//!
//! The reference channel is binarized, the central specimen is isolated and
//! its second moments give the specimen axes. The specimen frame is a
//! right-handed rotation whose columns are, in image `(x, y, z)`, the major,
//! secondary and tertiary axes.

use burn::tensor::backend::Backend;
use flyreg_core::filter::{background_peak_threshold, huang_threshold, label_components};
use flyreg_core::image::Image;
use flyreg_core::spatial::rotation::{euler_degrees_from_rotation, rotation_from_euler_degrees};
use flyreg_core::spatial::{Calibration, Point3, Vector3};
use flyreg_core::Spacing;
use nalgebra::{Matrix3, SymmetricEigen};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::settings::{RegistrationSettings, ThresholdModality};
use crate::validation::{is_finite_matrix, is_finite_vector};

// Relative intensity range below which a channel counts as uniform.
const MIN_CONTRAST: f32 = 1e-4;

/// Center and orientation of the specimen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Center in voxel units of the input volume, `(x, y, z)`.
    center: Point3,
    /// Columns are the specimen axes in image coordinates.
    rotation: Matrix3<f64>,
}

impl Pose {
    pub fn new(center: Point3, rotation: Matrix3<f64>) -> Self {
        Self { center, rotation }
    }

    /// `angles` are `[yaw, pitch, roll]` in degrees.
    pub fn from_euler_degrees(center: Point3, angles: [f64; 3]) -> Self {
        Self::new(center, rotation_from_euler_degrees(angles))
    }

    /// Center in input voxel units.
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// `[yaw, pitch, roll]` in degrees.
    pub fn euler_angles_degrees(&self) -> [f64; 3] {
        euler_degrees_from_rotation(&self.rotation)
    }

    pub fn yaw(&self) -> f64 {
        self.euler_angles_degrees()[0]
    }

    pub fn roll(&self) -> f64 {
        self.euler_angles_degrees()[2]
    }

    pub fn major_axis(&self) -> Vector3 {
        self.rotation.column(0).into_owned()
    }

    pub fn secondary_axis(&self) -> Vector3 {
        self.rotation.column(1).into_owned()
    }

    /// Center in micrometers for the given (corrected) calibration.
    pub fn center_physical(&self, calibration: &Calibration) -> Point3 {
        Point3::from(self.center.coords.component_mul(&calibration.spacing()))
    }

    pub fn with_rotation(&self, rotation: Matrix3<f64>) -> Self {
        Self::new(self.center, rotation)
    }
}

/// Raw first and second moments of a voxel set, in voxel indices.
///
/// Sums are kept as integers so the result does not depend on the order in
/// which voxels are visited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeMoments {
    count: u64,
    sum: [u64; 3],
    // xx, yy, zz, xy, xz, yz
    products: [u64; 6],
}

impl ShapeMoments {
    pub fn add(&mut self, x: usize, y: usize, z: usize) {
        let (x, y, z) = (x as u64, y as u64, z as u64);
        self.count += 1;
        self.sum[0] += x;
        self.sum[1] += y;
        self.sum[2] += z;
        self.products[0] += x * x;
        self.products[1] += y * y;
        self.products[2] += z * z;
        self.products[3] += x * y;
        self.products[4] += x * z;
        self.products[5] += y * z;
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        for i in 0..3 {
            self.sum[i] += other.sum[i];
        }
        for i in 0..6 {
            self.products[i] += other.products[i];
        }
        self
    }

    /// Moments of the voxels of a `[Z, Y, X]` mask.
    pub fn from_mask(mask: &[bool], shape: [usize; 3]) -> Self {
        let [_, ny, nx] = shape;
        if mask.is_empty() || ny * nx == 0 {
            return Self::default();
        }
        mask.par_chunks(ny * nx)
            .enumerate()
            .map(|(z, plane)| {
                let mut m = ShapeMoments::default();
                for (i, inside) in plane.iter().enumerate() {
                    if *inside {
                        m.add(i % nx, i / nx, z);
                    }
                }
                m
            })
            .reduce(ShapeMoments::default, ShapeMoments::merge)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean voxel index `(x, y, z)`.
    pub fn mean(&self) -> Option<Vector3> {
        (self.count > 0).then(|| {
            let n = self.count as f64;
            Vector3::new(self.sum[0] as f64 / n, self.sum[1] as f64 / n, self.sum[2] as f64 / n)
        })
    }

    /// Population covariance in physical units for voxel size `spacing`.
    pub fn covariance(&self, spacing: &Spacing<3>) -> Option<Matrix3<f64>> {
        let mean = self.mean()?;
        let n = self.count as f64;
        let p = self.products.map(|v| v as f64 / n);
        let xx = p[0] - mean[0] * mean[0];
        let yy = p[1] - mean[1] * mean[1];
        let zz = p[2] - mean[2] * mean[2];
        let xy = p[3] - mean[0] * mean[1];
        let xz = p[4] - mean[0] * mean[2];
        let yz = p[5] - mean[1] * mean[2];
        let (sx, sy, sz) = (spacing[0], spacing[1], spacing[2]);
        Some(Matrix3::new(
            xx * sx * sx, xy * sx * sy, xz * sx * sz,
            xy * sx * sy, yy * sy * sy, yz * sy * sz,
            xz * sx * sz, yz * sy * sz, zz * sz * sz,
        ))
    }
}

impl FromIterator<[usize; 3]> for ShapeMoments {
    /// Collects `(x, y, z)` voxel indices.
    fn from_iter<I: IntoIterator<Item = [usize; 3]>>(iter: I) -> Self {
        let mut m = ShapeMoments::default();
        for [x, y, z] in iter {
            m.add(x, y, z);
        }
        m
    }
}

/// Principal axes of a covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalAxes {
    /// Proper rotation; columns ordered by descending eigenvalue.
    pub rotation: Matrix3<f64>,
    /// Eigenvalues, descending.
    pub eigenvalues: Vector3,
}

impl PrincipalAxes {
    /// Semi-axes of the solid ellipsoid with these second moments.
    pub fn semi_axes(&self) -> Vector3 {
        self.eigenvalues.map(|l| (5.0 * l.max(0.0)).sqrt())
    }
}

/// Flips `v` so its first significant component, in `priority` order, is positive.
fn orient(v: Vector3, priority: [usize; 3]) -> Vector3 {
    for axis in priority {
        if v[axis].abs() > 1e-9 {
            return if v[axis] < 0.0 { -v } else { v };
        }
    }
    v
}

/// Diagonalizes `covariance` with a sign and order convention that makes the
/// result unique: eigenvalues descending, major axis with `x >= 0`, secondary
/// with `y >= 0`, tertiary completing a right-handed frame.
pub fn principal_axes(covariance: &Matrix3<f64>) -> Option<PrincipalAxes> {
    if !is_finite_matrix(covariance) {
        return None;
    }
    let eigen = SymmetricEigen::new(*covariance);
    let mut order = [0usize, 1, 2];
    order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));

    let major = orient(eigen.eigenvectors.column(order[0]).normalize(), [0, 1, 2]);
    let secondary = orient(eigen.eigenvectors.column(order[1]).normalize(), [1, 2, 0]);
    let tertiary = major.cross(&secondary);

    let rotation = Matrix3::from_columns(&[major, secondary, tertiary]);
    let eigenvalues = Vector3::new(
        eigen.eigenvalues[order[0]],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    );
    (is_finite_matrix(&rotation) && is_finite_vector(&eigenvalues)).then_some(PrincipalAxes {
        rotation,
        eigenvalues,
    })
}

/// Ellipsoid fitted to the central specimen.
#[derive(Debug, Clone)]
pub struct EllipsoidFit<B: Backend> {
    pub pose: Pose,
    /// Center in micrometers.
    pub center_physical: Point3,
    /// Semi-axis lengths in micrometers, descending.
    pub semi_axes: Vector3,
    /// Intensity threshold used for binarization.
    pub threshold: f32,
    /// Binary mask of the fitted specimen on the working grid.
    pub object_mask: Image<B, 3>,
}

/// Fits the specimen pose on an isotropic working copy of the reference channel.
pub struct EllipsoidPoseEstimator<'a> {
    settings: &'a RegistrationSettings,
}

impl<'a> EllipsoidPoseEstimator<'a> {
    pub fn new(settings: &'a RegistrationSettings) -> Self {
        Self { settings }
    }

    /// Threshold for `values` under the configured modality.
    pub fn threshold(&self, values: &[f32]) -> Result<f32> {
        let threshold = match self.settings.threshold_modality {
            ThresholdModality::Manual => background_peak_threshold(
                values,
                self.settings.threshold_in_units_of_background_peak_half_width,
            ),
            ThresholdModality::Huang => huang_threshold(values),
        };
        threshold.ok_or_else(|| RegistrationError::no_object_found("reference channel has no finite intensities"))
    }

    /// `working` is the reference channel on a grid with origin at the input
    /// origin; `calibration` is the corrected input calibration used to
    /// express the center in input voxels.
    pub fn estimate<B: Backend>(&self, working: &Image<B, 3>, calibration: &Calibration) -> Result<EllipsoidFit<B>> {
        let shape = working.shape();
        let spacing = *working.spacing();
        let values = working.to_vec();
        let (lo, hi) = values
            .par_iter()
            .filter(|v| v.is_finite())
            .fold(|| (f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
            .reduce(|| (f32::INFINITY, f32::NEG_INFINITY), |a, b| (a.0.min(b.0), a.1.max(b.1)));
        if !(hi - lo > MIN_CONTRAST * hi.abs().max(1.0)) {
            return Err(RegistrationError::no_object_found("reference channel has no contrast"));
        }
        let threshold = self.threshold(&values)?;
        let foreground: Vec<bool> = values.par_iter().map(|v| *v > threshold).collect();

        let components = label_components(&foreground, shape);
        let voxel_volume = spacing.iter().product::<f64>();
        let min_voxels = (self.settings.minimal_object_size / voxel_volume).ceil() as usize;

        let grid_center = Vector3::new(
            (shape[2] as f64 - 1.0) / 2.0 * spacing[0],
            (shape[1] as f64 - 1.0) / 2.0 * spacing[1],
            (shape[0] as f64 - 1.0) / 2.0 * spacing[2],
        );
        let label = (1..=components.len() as u32)
            .filter(|l| components.size(*l) >= min_voxels.max(1))
            .filter_map(|l| {
                let c = components.centroid(l)?;
                let physical = Vector3::new(c[0] * spacing[0], c[1] * spacing[1], c[2] * spacing[2]);
                Some((l, (physical - grid_center).norm()))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(l, _)| l)
            .ok_or_else(|| {
                RegistrationError::no_object_found(format!(
                    "no object of at least {:.0} um^3 above threshold {threshold:.2}",
                    self.settings.minimal_object_size
                ))
            })?;

        let mask = components.mask_of(label);
        let moments = ShapeMoments::from_mask(&mask, shape);
        let mean = moments
            .mean()
            .ok_or_else(|| RegistrationError::no_object_found("selected object is empty"))?;
        let covariance = moments
            .covariance(&spacing)
            .ok_or_else(|| RegistrationError::no_object_found("selected object is empty"))?;
        let axes = principal_axes(&covariance)
            .ok_or_else(|| RegistrationError::no_object_found("covariance could not be diagonalized"))?;

        let [l1, l2, _] = [axes.eigenvalues[0], axes.eigenvalues[1], axes.eigenvalues[2]];
        let elongation = self.settings.min_elongation;
        if !(l2 > 0.0 && l1 / l2 >= elongation * elongation) {
            return Err(RegistrationError::no_object_found(format!(
                "object has no clear major axis (eigenvalues {l1:.3}, {l2:.3})"
            )));
        }

        let center_physical = working.transform_continuous_index_to_physical_point(&Point3::from(mean));
        let center = Point3::from(center_physical.coords.component_div(&calibration.spacing()));
        if !is_finite_vector(&center.coords) {
            return Err(RegistrationError::no_object_found("object center is not finite"));
        }

        let pose = Pose::new(center, axes.rotation);
        tracing::debug!(
            voxels = moments.count(),
            threshold,
            center = ?center,
            angles = ?pose.euler_angles_degrees(),
            "Fitted ellipsoid"
        );

        let object_values = mask.iter().map(|m| if *m { 1.0 } else { 0.0 }).collect();
        let object_mask = Image::<B, 3>::from_vec(object_values, shape, spacing, &working.device());
        Ok(EllipsoidFit {
            pose,
            center_physical,
            semi_axes: axes.semi_axes(),
            threshold,
            object_mask: working.with_data(object_mask.into_data()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyreg_core::spatial::rotation::is_proper_rotation;
    use proptest::prelude::*;

    #[test]
    fn test_moments_of_a_bar() {
        let moments: ShapeMoments = (0..10).map(|x| [x, 2, 3]).collect();
        assert_eq!(moments.count(), 10);
        assert_eq!(moments.mean(), Some(Vector3::new(4.5, 2.0, 3.0)));
        let cov = moments.covariance(&Spacing::<3>::new(2.0, 1.0, 1.0)).unwrap();
        assert!((cov[(0, 0)] - 8.25 * 4.0).abs() < 1e-9);
        assert!(cov[(1, 1)].abs() < 1e-12);
    }

    #[test]
    fn test_principal_axes_follow_sign_convention() {
        let r = rotation_from_euler_degrees([-30.0, 10.0, 20.0]);
        let cov = r * Matrix3::from_diagonal(&Vector3::new(9.0, 4.0, 1.0)) * r.transpose();
        let axes = principal_axes(&cov).unwrap();
        assert!(is_proper_rotation(&axes.rotation, 1e-9));
        assert!(axes.rotation[(0, 0)] >= 0.0);
        assert!(axes.rotation[(1, 1)] >= 0.0);
        assert!((axes.eigenvalues - Vector3::new(9.0, 4.0, 1.0)).norm() < 1e-9);
        let yaw = euler_degrees_from_rotation(&axes.rotation)[0];
        assert!((yaw + 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_pose_physical_center() {
        let pose = Pose::from_euler_degrees(Point3::new(10.0, 20.0, 5.0), [0.0, 0.0, 0.0]);
        let cal = Calibration::new(0.5, 0.5, 3.2).unwrap();
        assert_eq!(pose.center_physical(&cal), Point3::new(5.0, 10.0, 16.0));
    }

    proptest! {
        #[test]
        fn moments_ignore_visit_order(
            voxels in proptest::collection::vec((0usize..40, 0usize..30, 0usize..20), 8..200)
                .prop_flat_map(|v| {
                    let shuffled = Just(v.clone()).prop_shuffle();
                    (Just(v), shuffled)
                })
        ) {
            let (original, shuffled) = voxels;
            let a: ShapeMoments = original.iter().map(|(x, y, z)| [*x, *y, *z]).collect();
            let b: ShapeMoments = shuffled.iter().map(|(x, y, z)| [*x, *y, *z]).collect();
            prop_assert_eq!(a, b);
            let spacing = Spacing::<3>::new(1.0, 1.0, 1.0);
            if let (Some(ca), Some(cb)) = (a.covariance(&spacing), b.covariance(&spacing)) {
                prop_assert_eq!(principal_axes(&ca), principal_axes(&cb));
            }
        }
    }
}
