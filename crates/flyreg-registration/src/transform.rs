//! Registration transform and the canonical output interval.
//!
//! All composition happens in micrometers: the input volume is first placed
//! in physical space with the corrected calibration, then moved so the
//! specimen center sits at the origin, rotated into the specimen frame and
//! finally scaled to output voxels.

use flyreg_core::spatial::{Affine3, Calibration, Point3, Spacing3};
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::pose::Pose;
use crate::settings::RegistrationSettings;
use crate::validation::{is_finite_matrix, is_finite_vector};

const SIMILARITY_TOLERANCE: f64 = 1e-6;

/// Origin-centered voxel box of the canonical output volume.
///
/// Bounds are inclusive and ordered `(x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInterval {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl OutputInterval {
    /// Box covering `size` micrometers at `resolution` micrometers per voxel.
    pub fn from_physical_size(size: [f64; 3], resolution: f64) -> Self {
        let half = size.map(|s| (s / 2.0 / resolution).floor().max(0.0) as i64);
        Self {
            min: half.map(|h| -h),
            max: half,
        }
    }

    /// Number of voxels per axis, `(x, y, z)`.
    pub fn dimensions(&self) -> [usize; 3] {
        [0, 1, 2].map(|i| (self.max[i] - self.min[i] + 1).max(0) as usize)
    }

    /// Tensor shape `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        let [x, y, z] = self.dimensions();
        [z, y, x]
    }

    pub fn num_voxels(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Physical position of the first voxel.
    pub fn origin_physical(&self, resolution: f64) -> Point3 {
        Point3::new(
            self.min[0] as f64 * resolution,
            self.min[1] as f64 * resolution,
            self.min[2] as f64 * resolution,
        )
    }

    /// Tensor index `[z, y, x]` of the canonical origin.
    pub fn origin_index(&self) -> [usize; 3] {
        [(-self.min[2]) as usize, (-self.min[1]) as usize, (-self.min[0]) as usize]
    }

    pub fn spacing(resolution: f64) -> Spacing3 {
        Spacing3::new(resolution, resolution, resolution)
    }
}

/// Maps input micrometers to output voxels of the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistrationTransform {
    input_to_output: Affine3,
    interval: OutputInterval,
    resolution: f64,
}

impl RegistrationTransform {
    pub fn new(input_to_output: Affine3, interval: OutputInterval, resolution: f64) -> Self {
        Self {
            input_to_output,
            interval,
            resolution,
        }
    }

    /// Input micrometers to output voxel coordinates (origin-centered).
    pub fn input_to_output(&self) -> &Affine3 {
        &self.input_to_output
    }

    pub fn interval(&self) -> &OutputInterval {
        &self.interval
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Output voxel coordinates to input micrometers.
    pub fn output_to_input(&self) -> Result<Affine3> {
        self.input_to_output
            .try_inverse()
            .ok_or_else(|| RegistrationError::no_transform("transform is not invertible"))
    }

    /// Output micrometers to input micrometers; the mapping a resampler walks.
    pub fn output_physical_to_input(&self) -> Result<Affine3> {
        Ok(Affine3::from_scale(1.0 / self.resolution).then(&self.output_to_input()?))
    }

    pub fn apply(&self, point: &Point3) -> Point3 {
        self.input_to_output.apply(point)
    }
}

/// Composes the registration transform from a refined pose.
pub struct TransformBuilder<'a> {
    settings: &'a RegistrationSettings,
}

impl<'a> TransformBuilder<'a> {
    pub fn new(settings: &'a RegistrationSettings) -> Self {
        Self { settings }
    }

    /// Builds the transform for `resolution` micrometers per output voxel.
    ///
    /// `calibration` must be the corrected calibration; the pose center is
    /// expressed in input voxels of that calibration.
    pub fn build(
        &self,
        pose: Option<&Pose>,
        calibration: Option<&Calibration>,
        resolution: f64,
    ) -> Result<RegistrationTransform> {
        let pose = pose.ok_or_else(|| RegistrationError::no_transform("no pose available"))?;
        let calibration =
            calibration.ok_or_else(|| RegistrationError::no_transform("no corrected calibration available"))?;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(RegistrationError::no_transform(format!(
                "output resolution must be positive, got {resolution}"
            )));
        }
        if !is_finite_matrix(pose.rotation()) || !is_finite_vector(&pose.center().coords) {
            return Err(RegistrationError::no_transform("pose is not finite"));
        }

        let center = pose.center_physical(calibration);
        let transform = Affine3::from_translation(-center.coords)
            .then(&Affine3::from_linear(pose.rotation().transpose()))
            .then(&Affine3::from_scale(1.0 / resolution));

        if !transform.is_finite() || !transform.is_similarity(SIMILARITY_TOLERANCE) {
            return Err(RegistrationError::no_transform(
                "composed transform is not a finite similarity",
            ));
        }
        Ok(RegistrationTransform::new(
            transform,
            self.settings.output_interval(resolution),
            resolution,
        ))
    }
}
