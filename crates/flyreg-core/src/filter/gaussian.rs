//! Separable Gaussian smoothing.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};

use crate::image::Image;
use crate::spatial::Spacing;

/// Gaussian smoothing with a physical standard deviation.
///
/// The kernel radius on each axis is `3 sigma` expressed in voxels of that
/// axis, capped by `max_kernel_width`. Borders are zero padded.
pub struct GaussianFilter<B: Backend> {
    sigma: f64,
    max_kernel_width: usize,
    _b: PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// `sigma` in the physical units of the image spacing.
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            max_kernel_width: 65,
            _b: PhantomData,
        }
    }

    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        image.with_data(self.apply_tensor(image.data().clone(), image.spacing()))
    }

    /// `spacing` is ordered `(x, y, ...)` while tensor axes run `[..., Y, X]`.
    pub fn apply_tensor<const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        if self.sigma <= 1e-6 {
            return input;
        }
        let device = input.device();
        let mut data = input;
        for axis in 0..D {
            let voxel_sigma = self.sigma / spacing[D - 1 - axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let radius = radius.min((self.max_kernel_width - 1) / 2);
            if radius == 0 {
                continue;
            }
            let kernel = Self::kernel(voxel_sigma, radius);
            let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = Self::convolve_axis(data, kernel, axis);
        }
        data
    }

    fn kernel(sigma: f64, radius: usize) -> Vec<f32> {
        let two_sigma2 = 2.0 * sigma * sigma;
        let weights: Vec<f64> = (0..=2 * radius)
            .map(|i| {
                let x = i as f64 - radius as f64;
                (-x * x / two_sigma2).exp()
            })
            .collect();
        let sum: f64 = weights.iter().sum();
        weights.iter().map(|w| (w / sum) as f32).collect()
    }

    fn convolve_axis<const D: usize>(input: Tensor<B, D>, kernel: Tensor<B, 1>, axis: usize) -> Tensor<B, D> {
        let dims: [usize; D] = input.shape().dims();

        // Move `axis` last and fold the rest into the batch dimension.
        let mut order = [0usize; D];
        let mut k = 0;
        for i in (0..D).filter(|i| *i != axis) {
            order[k] = i;
            k += 1;
        }
        order[D - 1] = axis;

        let mut permuted_shape = [0usize; D];
        for (i, o) in order.iter().enumerate() {
            permuted_shape[i] = dims[*o];
        }
        let length = dims[axis];
        let batch = dims.iter().product::<usize>() / length.max(1);

        let width = kernel.dims()[0];
        let columns = input.permute(order.map(|o| o as isize)).reshape([batch, 1, length]);
        let output = burn::tensor::module::conv1d(
            columns,
            kernel.reshape([1, 1, width]),
            None,
            ConvOptions::new([1], [width / 2], [1], 1),
        );

        let mut inverse = [0isize; D];
        for (i, o) in order.iter().enumerate() {
            inverse[*o] = i as isize;
        }
        output.reshape(Shape::new(permuted_shape)).permute(inverse)
    }
}
