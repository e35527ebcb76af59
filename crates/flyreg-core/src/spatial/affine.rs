//! Affine maps on 3D physical points.

use nalgebra::{Matrix3, SMatrix};
use serde::{Deserialize, Serialize};

use super::{Point3, Vector3};

/// Affine map `x -> linear * x + translation`.
///
/// Composition reads left to right: `a.then(&b)` applies `a` first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine3 {
    linear: Matrix3<f64>,
    translation: Vector3,
}

impl Default for Affine3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine3 {
    pub fn new(linear: Matrix3<f64>, translation: Vector3) -> Self {
        Self { linear, translation }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    pub fn from_translation(translation: Vector3) -> Self {
        Self::new(Matrix3::identity(), translation)
    }

    pub fn from_linear(linear: Matrix3<f64>) -> Self {
        Self::new(linear, Vector3::zeros())
    }

    /// Uniform scaling about the origin.
    pub fn from_scale(scale: f64) -> Self {
        Self::from_linear(Matrix3::identity() * scale)
    }

    pub fn linear(&self) -> &Matrix3<f64> {
        &self.linear
    }

    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    /// Returns the map that applies `self` and then `next`.
    pub fn then(&self, next: &Affine3) -> Affine3 {
        Affine3::new(
            next.linear * self.linear,
            next.linear * self.translation + next.translation,
        )
    }

    pub fn apply(&self, point: &Point3) -> Point3 {
        Point3::from(self.linear * point.coords + self.translation)
    }

    pub fn apply_vector(&self, vector: &Vector3) -> Vector3 {
        self.linear * vector
    }

    pub fn try_inverse(&self) -> Option<Affine3> {
        let inverse = self.linear.try_inverse()?;
        Some(Affine3::new(inverse, -(inverse * self.translation)))
    }

    /// Row-major `[linear | translation]` matrix.
    pub fn matrix_3x4(&self) -> SMatrix<f64, 3, 4> {
        let mut m = SMatrix::<f64, 3, 4>::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Cube root of the determinant; the scale factor of a similarity.
    pub fn uniform_scale(&self) -> f64 {
        self.linear.determinant().cbrt()
    }

    /// True when the linear part is a rotation times a positive uniform scale.
    pub fn is_similarity(&self, tolerance: f64) -> bool {
        let scale = self.uniform_scale();
        if !(scale.is_finite() && scale > 0.0) {
            return false;
        }
        let gram = self.linear.transpose() * self.linear / (scale * scale);
        (gram - Matrix3::identity()).amax() <= tolerance
    }

    pub fn is_finite(&self) -> bool {
        self.linear.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }
}
