//! Nearest neighbor interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{split_xyz, Interpolator};

/// Rounds to the closest voxel, clamping to the volume edges.
///
/// Used for label and mask volumes where blending values is meaningless.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims();
        let [x, y, z] = split_xyz(indices);

        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let idx = z_i * ((d1 * d2) as i32) + y_i * (d2 as i32) + x_i;
        data.clone().reshape([d0 * d1 * d2]).gather(0, idx)
    }
}
