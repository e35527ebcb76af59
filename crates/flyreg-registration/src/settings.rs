//! Immutable configuration for one registration run.
//!
//! All lengths are in micrometers. Settings are built once, validated against
//! the input, and passed by reference into every stage.

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::transform::OutputInterval;

pub const EMBRYO_LENGTH: f64 = 420.0;
pub const EMBRYO_WIDTH: f64 = 160.0;

/// How the reference channel is binarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdModality {
    /// A fixed number of background-peak half-widths above the background peak.
    Manual,
    /// Huang's fuzzy-entropy threshold.
    Huang,
}

/// Which asymmetry resolves the rotation about the long axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollAngleMethod {
    Intensity,
    ShapeCentroids,
    ShapeProjection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSettings {
    pub alignment_channel_index_one_based: usize,
    /// Channel whose intensity drives the roll refinement; the alignment
    /// channel when unset.
    pub secondary_channel_index_one_based: Option<usize>,
    pub registration_resolution: f64,
    pub output_resolution: f64,
    pub refractive_index_axial_calibration_correction_factor: f64,
    pub refractive_index_intensity_correction_decay_length: f64,
    pub roll_angle_min_distance_to_axis: f64,
    pub roll_angle_min_distance_to_center: f64,
    pub roll_angle_max_distance_to_center: f64,
    pub roll_angle_computation_method: RollAngleMethod,
    /// Radial range, in the cross-section, scanned by the projection method.
    pub projection_min_radius: f64,
    pub projection_max_radius: f64,
    pub projection_blur_sigma: f64,
    pub watershed_seeds_global_distance_threshold: f64,
    pub threshold_modality: ThresholdModality,
    pub threshold_in_units_of_background_peak_half_width: f64,
    /// Physical extent `(x, y, z)` of the canonical output volume.
    pub output_image_size: [f64; 3],
    /// Smallest specimen volume, in cubic micrometers.
    pub minimal_object_size: f64,
    /// Smallest accepted ratio of the major to the second semi-axis.
    pub min_elongation: f64,
    pub only_compute_ellipsoid_parameters: bool,
    pub show_intermediate_results: bool,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            alignment_channel_index_one_based: 2,
            secondary_channel_index_one_based: None,
            registration_resolution: 6.0,
            output_resolution: 0.7,
            refractive_index_axial_calibration_correction_factor: 1.6,
            refractive_index_intensity_correction_decay_length: 170.0,
            roll_angle_min_distance_to_axis: 0.0,
            roll_angle_min_distance_to_center: EMBRYO_LENGTH / 2.0 * 0.5,
            roll_angle_max_distance_to_center: EMBRYO_LENGTH / 2.0 - 10.0,
            roll_angle_computation_method: RollAngleMethod::Intensity,
            projection_min_radius: 20.0,
            projection_max_radius: 80.0,
            projection_blur_sigma: 20.0,
            watershed_seeds_global_distance_threshold: EMBRYO_WIDTH / 3.0,
            threshold_modality: ThresholdModality::Manual,
            threshold_in_units_of_background_peak_half_width: 5.0,
            output_image_size: [EMBRYO_LENGTH * 1.5, EMBRYO_WIDTH * 1.5, EMBRYO_WIDTH * 1.5],
            minimal_object_size: EMBRYO_WIDTH * EMBRYO_WIDTH * EMBRYO_WIDTH,
            min_elongation: 1.1,
            only_compute_ellipsoid_parameters: false,
            show_intermediate_results: false,
        }
    }
}

impl RegistrationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alignment_channel(mut self, index_one_based: usize) -> Self {
        self.alignment_channel_index_one_based = index_one_based;
        self
    }

    pub fn with_secondary_channel(mut self, index_one_based: usize) -> Self {
        self.secondary_channel_index_one_based = Some(index_one_based);
        self
    }

    pub fn with_registration_resolution(mut self, micrometers: f64) -> Self {
        self.registration_resolution = micrometers;
        self
    }

    pub fn with_output_resolution(mut self, micrometers: f64) -> Self {
        self.output_resolution = micrometers;
        self
    }

    pub fn with_axial_correction_factor(mut self, factor: f64) -> Self {
        self.refractive_index_axial_calibration_correction_factor = factor;
        self
    }

    pub fn with_intensity_decay_length(mut self, micrometers: f64) -> Self {
        self.refractive_index_intensity_correction_decay_length = micrometers;
        self
    }

    pub fn with_roll_angle_method(mut self, method: RollAngleMethod) -> Self {
        self.roll_angle_computation_method = method;
        self
    }

    pub fn with_roll_angle_distances(mut self, to_axis: f64, min_to_center: f64, max_to_center: f64) -> Self {
        self.roll_angle_min_distance_to_axis = to_axis;
        self.roll_angle_min_distance_to_center = min_to_center;
        self.roll_angle_max_distance_to_center = max_to_center;
        self
    }

    pub fn with_projection_radii(mut self, min: f64, max: f64) -> Self {
        self.projection_min_radius = min;
        self.projection_max_radius = max;
        self
    }

    pub fn with_threshold_modality(mut self, modality: ThresholdModality) -> Self {
        self.threshold_modality = modality;
        self
    }

    pub fn with_output_image_size(mut self, size: [f64; 3]) -> Self {
        self.output_image_size = size;
        self
    }

    pub fn with_minimal_object_size(mut self, cubic_micrometers: f64) -> Self {
        self.minimal_object_size = cubic_micrometers;
        self
    }

    pub fn with_watershed_seed_distance(mut self, micrometers: f64) -> Self {
        self.watershed_seeds_global_distance_threshold = micrometers;
        self
    }

    pub fn with_only_ellipsoid_parameters(mut self, only: bool) -> Self {
        self.only_compute_ellipsoid_parameters = only;
        self
    }

    pub fn with_intermediate_results(mut self, show: bool) -> Self {
        self.show_intermediate_results = show;
        self
    }

    /// Zero-based index of the alignment channel.
    pub fn alignment_channel(&self) -> usize {
        self.alignment_channel_index_one_based.saturating_sub(1)
    }

    /// Zero-based index of the roll refinement channel.
    pub fn secondary_channel(&self) -> usize {
        self.secondary_channel_index_one_based
            .map_or_else(|| self.alignment_channel(), |index| index.saturating_sub(1))
    }

    /// Canonical output box at `resolution` micrometers per voxel.
    pub fn output_interval(&self, resolution: f64) -> OutputInterval {
        OutputInterval::from_physical_size(self.output_image_size, resolution)
    }

    /// Checks every invariant, including channel indices against `channel_count`.
    pub fn validate(&self, channel_count: usize) -> Result<()> {
        let positive = [
            ("registration_resolution", self.registration_resolution),
            ("output_resolution", self.output_resolution),
            (
                "refractive_index_axial_calibration_correction_factor",
                self.refractive_index_axial_calibration_correction_factor,
            ),
            (
                "refractive_index_intensity_correction_decay_length",
                self.refractive_index_intensity_correction_decay_length,
            ),
            ("min_elongation", self.min_elongation),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.output_image_size.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(RegistrationError::invalid_configuration(format!(
                "output_image_size must be positive, got {:?}",
                self.output_image_size
            )));
        }
        if self.roll_angle_min_distance_to_center > self.roll_angle_max_distance_to_center {
            return Err(RegistrationError::invalid_configuration(
                "roll angle distance range is empty",
            ));
        }
        if !(self.projection_min_radius >= 0.0 && self.projection_min_radius < self.projection_max_radius) {
            return Err(RegistrationError::invalid_configuration(format!(
                "projection radius range [{}, {}] is empty",
                self.projection_min_radius, self.projection_max_radius
            )));
        }
        let channels = [
            Some(("alignment_channel_index_one_based", self.alignment_channel_index_one_based)),
            self.secondary_channel_index_one_based
                .map(|index| ("secondary_channel_index_one_based", index)),
        ];
        for (name, index) in channels.into_iter().flatten() {
            if index < 1 || index > channel_count {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{name} is {index}, volume has {channel_count} channel(s)"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_embryo_geometry() {
        let settings = RegistrationSettings::default();
        assert_eq!(settings.roll_angle_min_distance_to_center, 105.0);
        assert_eq!(settings.roll_angle_max_distance_to_center, 200.0);
        assert_eq!(settings.output_image_size, [630.0, 240.0, 240.0]);
        assert!((settings.watershed_seeds_global_distance_threshold - 53.333).abs() < 1e-3);
        assert!(settings.validate(2).is_ok());
    }

    #[test]
    fn channel_index_is_checked_against_volume() {
        let settings = RegistrationSettings::default();
        assert!(settings.validate(1).is_err());
        let settings = settings.with_alignment_channel(1).with_secondary_channel(1);
        assert!(settings.validate(1).is_ok());
        assert!(settings.clone().with_alignment_channel(0).validate(1).is_err());
        assert!(settings.with_secondary_channel(3).validate(2).is_err());
    }

    #[test]
    fn unset_secondary_channel_follows_alignment_channel() {
        let settings = RegistrationSettings::default().with_alignment_channel(1);
        assert!(settings.validate(1).is_ok());
        assert_eq!(settings.secondary_channel(), 0);

        let settings = settings.with_alignment_channel(3);
        assert_eq!(settings.secondary_channel(), 2);
        assert!(settings.validate(3).is_ok());
    }

    #[test]
    fn projection_radii_must_form_a_range() {
        let settings = RegistrationSettings::default().with_projection_radii(30.0, 90.0);
        assert!(settings.validate(2).is_ok());
        assert!(settings.clone().with_projection_radii(90.0, 30.0).validate(2).is_err());
        assert!(settings.with_projection_radii(-1.0, 30.0).validate(2).is_err());
    }

    #[test]
    fn resolutions_must_be_positive() {
        let settings = RegistrationSettings::default().with_output_resolution(0.0);
        assert!(matches!(
            settings.validate(2),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
        let settings = RegistrationSettings::default().with_registration_resolution(f64::NAN);
        assert!(settings.validate(2).is_err());
    }

    #[test]
    fn builder_does_not_touch_other_fields() {
        let settings = RegistrationSettings::default().with_roll_angle_method(RollAngleMethod::ShapeProjection);
        assert_eq!(settings.roll_angle_computation_method, RollAngleMethod::ShapeProjection);
        assert_eq!(settings.output_resolution, 0.7);
    }
}
