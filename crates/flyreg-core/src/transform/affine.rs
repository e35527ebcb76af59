//! Affine transform on tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::trait_::Transform;
use crate::spatial::Affine3;

/// Tensor form of an [`Affine3`]: `T(x) = A x + t`.
#[derive(Debug, Clone)]
pub struct AffineTransform<B: Backend> {
    matrix: Tensor<B, 2>,      // [3, 3]
    translation: Tensor<B, 1>, // [3]
}

impl<B: Backend> AffineTransform<B> {
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>) -> Self {
        Self { matrix, translation }
    }

    pub fn identity(device: &B::Device) -> Self {
        Self::from_affine(&Affine3::identity(), device)
    }

    pub fn from_affine(affine: &Affine3, device: &B::Device) -> Self {
        let linear = affine.linear();
        let mut values = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                values.push(linear[(r, c)] as f32);
            }
        }
        let matrix = Tensor::<B, 2>::from_data(TensorData::new(values, Shape::new([3, 3])), device);
        let t = affine.translation();
        let translation = Tensor::<B, 1>::from_data(
            TensorData::new(vec![t[0] as f32, t[1] as f32, t[2] as f32], Shape::new([3])),
            device,
        );
        Self::new(matrix, translation)
    }

    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.clone()
    }

    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.clone()
    }
}

impl<B: Backend> Transform<B, 3> for AffineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vectors: y = x @ A^T + t
        let t = self.translation.clone().reshape([1, 3]);
        points.matmul(self.matrix.clone().transpose()) + t
    }
}
