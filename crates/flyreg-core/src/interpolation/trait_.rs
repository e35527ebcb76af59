//! Interpolator trait for sampling volumes at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a `[Z, Y, X]` volume at continuous voxel indices.
pub trait Interpolator<B: Backend> {
    /// Interpolate `data` at `[Batch, 3]` indices ordered `(x, y, z)`.
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}

/// Splits `[Batch, 3]` indices into their x, y and z columns.
pub(crate) fn split_xyz<B: Backend>(indices: Tensor<B, 2>) -> [Tensor<B, 1>; 3] {
    let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
    let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
    let z = indices.narrow(1, 2, 1).squeeze::<1>(1);
    [x, y, z]
}
