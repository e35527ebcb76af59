//! Refractive index mismatch correction.
//!
//! Mismatch between immersion medium and sample scales apparent depth and
//! attenuates signal below the coverslip. The axial calibration is rescaled
//! by a constant factor and intensities are boosted with an exponential
//! recovery in depth, clamped to the range of the sample type.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use flyreg_core::image::{Image, SampleType};
use flyreg_core::spatial::Calibration;

use crate::error::{RegistrationError, Result};
use crate::settings::RegistrationSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefractiveIndexCorrector {
    axial_factor: f64,
    decay_length: f64,
}

impl RefractiveIndexCorrector {
    pub fn new(axial_factor: f64, decay_length: f64) -> Self {
        Self {
            axial_factor,
            decay_length,
        }
    }

    pub fn from_settings(settings: &RegistrationSettings) -> Self {
        Self::new(
            settings.refractive_index_axial_calibration_correction_factor,
            settings.refractive_index_intensity_correction_decay_length,
        )
    }

    /// Calibration with the axial voxel size scaled by the correction factor.
    pub fn corrected_calibration(&self, raw: &Calibration) -> Result<Calibration> {
        raw.with_axial_factor(self.axial_factor)
            .map_err(|e| RegistrationError::no_transform(format!("axial correction failed: {e}")))
    }

    /// Physical z of the coverslip, taken as the lowest plane holding
    /// specimen voxels of `object_mask`. A specimen cut by the first plane
    /// has no coverslip side.
    pub fn coverslip_position<B: Backend>(&self, object_mask: &Image<B, 3>) -> Result<f64> {
        let [nz, ny, nx] = object_mask.shape();
        let values = object_mask.to_vec();
        let plane = ny * nx;
        let occupied: Vec<bool> = (0..nz)
            .map(|z| values[z * plane..(z + 1) * plane].iter().any(|v| *v > 0.0))
            .collect();

        let first = occupied
            .iter()
            .position(|o| *o)
            .ok_or_else(|| RegistrationError::no_coverslip("specimen mask is empty"))?;
        // The coverslip side must be visible below the specimen.
        if first == 0 {
            return Err(RegistrationError::no_coverslip(
                "specimen touches the lowest plane of the volume",
            ));
        }
        let position = object_mask.origin()[2] + first as f64 * object_mask.spacing()[2];
        tracing::debug!(plane = first, position, "Located coverslip");
        Ok(position)
    }

    /// Intensity gain at depth `z` micrometers.
    pub fn gain(&self, z: f64, coverslip: f64) -> f64 {
        ((z - coverslip).max(0.0) / self.decay_length).exp()
    }

    /// Depth-corrected copy of `channel`, whose spacing is the corrected calibration.
    pub fn correct_channel<B: Backend>(
        &self,
        channel: &Image<B, 3>,
        coverslip: f64,
        sample_type: SampleType,
    ) -> Image<B, 3> {
        let [nz, _, _] = channel.shape();
        let z0 = channel.origin()[2];
        let dz = channel.spacing()[2];
        let gains: Vec<f32> = (0..nz)
            .map(|k| self.gain(z0 + k as f64 * dz, coverslip) as f32)
            .collect();
        let gains = Tensor::<B, 3>::from_data(TensorData::new(gains, Shape::new([nz, 1, 1])), &channel.device());
        let corrected = (channel.data().clone() * gains).clamp_max(sample_type.max_value());
        channel.with_data(corrected)
    }

    pub fn correct_channels<B: Backend>(
        &self,
        channels: &[Image<B, 3>],
        coverslip: f64,
        sample_type: SampleType,
    ) -> Vec<Image<B, 3>> {
        channels
            .iter()
            .map(|c| self.correct_channel(c, coverslip, sample_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use flyreg_core::spatial::Spacing3;

    type TestBackend = NdArray<f32>;

    fn slab_mask(planes: &[usize], nz: usize) -> Image<TestBackend, 3> {
        let mut values = vec![0.0; nz * 4];
        for z in planes {
            values[z * 4] = 1.0;
        }
        Image::from_vec(values, [nz, 2, 2], Spacing3::new(1.0, 1.0, 2.5), &Default::default())
    }

    #[test]
    fn test_corrected_calibration_scales_z_only() {
        let corrector = RefractiveIndexCorrector::new(1.6, 170.0);
        let raw = Calibration::new(6.0, 6.0, 3.75).unwrap();
        let corrected = corrector.corrected_calibration(&raw).unwrap();
        assert_eq!(corrected.x(), 6.0);
        assert!((corrected.z() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_coverslip_is_lowest_occupied_plane() {
        let corrector = RefractiveIndexCorrector::new(1.0, 100.0);
        let pos = corrector.coverslip_position(&slab_mask(&[3, 4, 5], 8)).unwrap();
        assert!((pos - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_coverslip() {
        let corrector = RefractiveIndexCorrector::new(1.0, 100.0);
        let err = corrector.coverslip_position(&slab_mask(&[], 4)).unwrap_err();
        assert!(matches!(err, RegistrationError::NoCoverslip(_)));
        let err = corrector.coverslip_position(&slab_mask(&[0, 1, 2, 3], 4)).unwrap_err();
        assert!(matches!(err, RegistrationError::NoCoverslip(_)));
    }

    #[test]
    fn test_specimen_on_first_plane_has_no_coverslip() {
        let corrector = RefractiveIndexCorrector::new(1.0, 100.0);
        let err = corrector.coverslip_position(&slab_mask(&[0, 1, 2, 3, 4], 8)).unwrap_err();
        assert!(matches!(err, RegistrationError::NoCoverslip(_)));
        assert!(corrector.coverslip_position(&slab_mask(&[1, 2, 3, 4], 8)).is_ok());
    }

    #[test]
    fn test_intensity_gain_is_monotonic_and_clamped() {
        let corrector = RefractiveIndexCorrector::new(1.0, 10.0);
        let channel = Image::<TestBackend, 3>::from_vec(
            vec![50.0; 5],
            [5, 1, 1],
            Spacing3::new(1.0, 1.0, 10.0),
            &Default::default(),
        );
        let out = corrector.correct_channel(&channel, 10.0, SampleType::U8).to_vec();
        assert_eq!(out[0], 50.0);
        assert_eq!(out[1], 50.0);
        assert!((out[2] - 50.0 * std::f32::consts::E).abs() < 1e-3);
        assert_eq!(out[3], 255.0);
        assert_eq!(out[4], 255.0);
    }
}
