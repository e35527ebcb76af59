//! Resampling of channels into the canonical frame.

use burn::tensor::backend::Backend;
use flyreg_core::filter::ResampleImageFilter;
use flyreg_core::image::Image;
use flyreg_core::interpolation::{Interpolator, LinearInterpolator};
use flyreg_core::spatial::Spacing3;
use flyreg_core::transform::AffineTransform;

use crate::error::Result;
use crate::transform::{OutputInterval, RegistrationTransform};

/// Walks every output voxel, maps it back into the input volume and samples
/// there. Samples that fall outside the input are zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelResampler;

impl ChannelResampler {
    pub fn new() -> Self {
        Self
    }

    /// Isotropic copy of `channel` at `resolution` micrometers per voxel,
    /// covering the same physical extent and sharing its origin.
    pub fn isotropic<B: Backend>(&self, channel: &Image<B, 3>, resolution: f64) -> Image<B, 3> {
        let [nz, ny, nx] = channel.shape();
        let spacing = channel.spacing();
        let samples = |n: usize, s: f64| ((n.saturating_sub(1)) as f64 * s / resolution + 1e-9).floor() as usize + 1;
        let size = [samples(nz, spacing[2]), samples(ny, spacing[1]), samples(nx, spacing[0])];
        let filter = ResampleImageFilter::new(
            size,
            *channel.origin(),
            OutputInterval::spacing(resolution),
            AffineTransform::identity(&channel.device()),
            LinearInterpolator::new(),
        );
        filter.apply(channel)
    }

    /// Resamples `channel` with trilinear interpolation.
    ///
    /// `channel` must carry the corrected calibration as its spacing.
    pub fn resample<B: Backend>(&self, channel: &Image<B, 3>, transform: &RegistrationTransform) -> Result<Image<B, 3>> {
        self.resample_with(channel, transform, LinearInterpolator::new())
    }

    pub fn resample_with<B: Backend, I: Interpolator<B>>(
        &self,
        channel: &Image<B, 3>,
        transform: &RegistrationTransform,
        interpolator: I,
    ) -> Result<Image<B, 3>> {
        let resolution = transform.resolution();
        let interval = transform.interval();
        let to_input = transform.output_physical_to_input()?;
        let filter = ResampleImageFilter::new(
            interval.shape(),
            interval.origin_physical(resolution),
            Spacing3::new(resolution, resolution, resolution),
            AffineTransform::from_affine(&to_input, &channel.device()),
            interpolator,
        );
        Ok(filter.apply(channel))
    }

    /// Resamples every channel through the same transform.
    pub fn resample_channels<B: Backend>(
        &self,
        channels: &[Image<B, 3>],
        transform: &RegistrationTransform,
    ) -> Result<Vec<Image<B, 3>>> {
        channels.iter().map(|c| self.resample(c, transform)).collect()
    }
}
