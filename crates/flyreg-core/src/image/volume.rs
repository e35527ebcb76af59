//! Multi-channel volumes.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::Image;
use crate::error::{Result, VolumeError};
use crate::spatial::Calibration;

/// Storage type of the samples a volume was decoded from.
///
/// Voxel values are always held as floats; the sample type bounds what can be
/// written back without overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    U16,
    I16,
    F32,
}

impl SampleType {
    pub fn max_value(&self) -> f32 {
        match self {
            SampleType::U8 => u8::MAX as f32,
            SampleType::U16 => u16::MAX as f32,
            SampleType::I16 => i16::MAX as f32,
            SampleType::F32 => f32::MAX,
        }
    }
}

/// A stack of co-registered scalar channels sharing one voxel grid.
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    channels: Vec<Image<B, 3>>,
    calibration: Calibration,
    sample_type: SampleType,
}

impl<B: Backend> Volume<B> {
    /// The calibration is taken from the first channel's spacing.
    pub fn new(channels: Vec<Image<B, 3>>, sample_type: SampleType) -> Result<Self> {
        let first = channels.first().ok_or(VolumeError::Empty)?;
        let expected = first.shape();
        let calibration = Calibration::from_spacing(*first.spacing())?;
        for (channel, image) in channels.iter().enumerate().skip(1) {
            let actual = image.shape();
            if actual != expected {
                return Err(VolumeError::ShapeMismatch {
                    channel,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            channels,
            calibration,
            sample_type,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Zero-based channel access.
    pub fn channel(&self, index: usize) -> Option<&Image<B, 3>> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[Image<B, 3>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Image<B, 3>> {
        self.channels
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// `[Z, Y, X]` grid size shared by all channels.
    pub fn shape(&self) -> [usize; 3] {
        self.channels[0].shape()
    }

    /// All channels as one `[C, Z, Y, X]` tensor.
    pub fn stack(&self) -> Tensor<B, 4> {
        let parts = self
            .channels
            .iter()
            .map(|c| c.data().clone().unsqueeze_dim::<4>(0))
            .collect();
        Tensor::cat(parts, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Spacing3;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn channel(shape: [usize; 3], fill: f32) -> Image<Backend, 3> {
        let n = shape.iter().product();
        Image::from_vec(vec![fill; n], shape, Spacing3::new(0.5, 0.5, 2.0), &Default::default())
    }

    #[test]
    fn empty_volume_is_rejected() {
        let result = Volume::<Backend>::new(Vec::new(), SampleType::U16);
        assert!(matches!(result, Err(VolumeError::Empty)));
    }

    #[test]
    fn channels_must_share_shape() {
        let result = Volume::new(vec![channel([2, 3, 4], 1.0), channel([2, 3, 5], 1.0)], SampleType::U8);
        assert!(matches!(result, Err(VolumeError::ShapeMismatch { channel: 1, .. })));
    }

    #[test]
    fn stack_puts_channels_first() {
        let volume = Volume::new(vec![channel([2, 3, 4], 1.0), channel([2, 3, 4], 2.0)], SampleType::U16).unwrap();
        assert_eq!(volume.num_channels(), 2);
        assert_eq!(volume.calibration().z(), 2.0);
        let stacked = volume.stack();
        assert_eq!(stacked.dims(), [2, 2, 3, 4]);
        let values = stacked.to_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[24], 2.0);
    }

    #[test]
    fn sample_type_bounds() {
        assert_eq!(SampleType::U8.max_value(), 255.0);
        assert_eq!(SampleType::U16.max_value(), 65535.0);
    }
}
