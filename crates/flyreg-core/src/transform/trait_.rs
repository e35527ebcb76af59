//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps batches of physical points from one space to another.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to `[Batch, D]` points, ordered `(x, y, z)`.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
