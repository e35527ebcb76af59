//! Numerical and shape checks shared by the pipeline stages.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use flyreg_core::image::Image;
use nalgebra::{Matrix3, Vector3};

use crate::error::{RegistrationError, Result};

/// All images must share one voxel grid.
pub fn validate_image_shapes<B: Backend>(images: &[Image<B, 3>]) -> Result<()> {
    let Some(first) = images.first() else {
        return Ok(());
    };
    let expected = first.shape();
    for image in &images[1..] {
        if image.shape() != expected {
            return Err(RegistrationError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: image.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// True when no element is NaN or infinite.
pub fn is_finite_tensor<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> bool {
    // x - x is 0 for finite x and NaN otherwise; the sum carries the NaN.
    let probe = (tensor.clone() - tensor.clone()).sum().into_scalar().elem::<f64>();
    probe.is_finite()
}

/// Rejects resampled data carrying NaN or infinity.
pub fn ensure_finite_image<B: Backend>(image: &Image<B, 3>, what: &str) -> Result<()> {
    if is_finite_tensor(image.data()) {
        Ok(())
    } else {
        Err(RegistrationError::no_transform(format!("{what} contains non-finite values")))
    }
}

pub fn is_finite_vector(v: &Vector3<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

pub fn is_finite_matrix(m: &Matrix3<f64>) -> bool {
    m.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use flyreg_core::spatial::Spacing3;

    type Backend = NdArray<f32>;

    fn image(values: Vec<f32>, shape: [usize; 3]) -> Image<Backend, 3> {
        Image::from_vec(values, shape, Spacing3::new(1.0, 1.0, 1.0), &Default::default())
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let a = image(vec![0.0; 8], [2, 2, 2]);
        let b = image(vec![0.0; 12], [3, 2, 2]);
        assert!(validate_image_shapes(&[a.clone(), a.clone()]).is_ok());
        assert!(matches!(
            validate_image_shapes(&[a, b]),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_detection() {
        assert!(ensure_finite_image(&image(vec![1.0, 2.0], [1, 1, 2]), "x").is_ok());
        assert!(ensure_finite_image(&image(vec![1.0, f32::NAN], [1, 1, 2]), "x").is_err());
        assert!(ensure_finite_image(&image(vec![f32::INFINITY, 0.0], [1, 1, 2]), "x").is_err());
    }
}
