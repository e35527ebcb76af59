//! Image type with physical metadata and coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::spatial::{Direction, Point, Spacing, Vector};

/// Scalar image with physical metadata.
///
/// Tensor data is laid out `[Z, Y, X]` (or `[Y, X]` in 2D) while physical
/// quantities follow `(x, y, z)` ordering. The direction matrix is expected to
/// be orthonormal.
///
/// # Examples
/// ```rust
/// use flyreg_core::Image;
/// use flyreg_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(
///     data,
///     Point3::origin(),
///     Spacing3::new(0.5, 0.5, 2.0),
///     Direction3::identity(),
/// );
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Builds an image at the origin with axis-aligned direction.
    pub fn from_vec(
        values: Vec<f32>,
        shape: [usize; D],
        spacing: Spacing<D>,
        device: &B::Device,
    ) -> Self {
        let data = Tensor::<B, D>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Self::new(data, Point::<D>::origin(), spacing, Direction::<D>::identity())
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    pub fn shape(&self) -> [usize; D] {
        self.data.shape().dims()
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Same voxels and origin, reinterpreted with another voxel size.
    pub fn with_spacing(&self, spacing: Spacing<D>) -> Self {
        Self::new(self.data.clone(), self.origin, spacing, self.direction)
    }

    /// Same metadata, different voxel values.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Copies the voxel values to host memory in `[Z, Y, X]` row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.to_data().iter::<f32>().collect()
    }

    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// `index = (Direction^T * (point - origin)) / spacing`
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let rotated = self.direction.transpose() * (*point - self.origin);
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Maps `[N, D]` physical points to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin = self.origin_tensor(&device);

        // I = (P - O) @ T with T[r, c] = Direction[r, c] / spacing[c]
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((self.direction[(r, c)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        (points - origin).matmul(t)
    }

    /// Maps `[N, D]` continuous indices to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin = self.origin_tensor(&device);

        // P = O + I @ M with M[r, c] = spacing[r] * Direction[c, r]
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m) + origin
    }

    fn origin_tensor(&self, device: &B::Device) -> Tensor<B, 2> {
        let values: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([D])), device).reshape([1, D])
    }
}

impl<B: Backend> Image<B, 3> {
    /// Physical coordinate of the voxel at `[z, y, x]`.
    pub fn voxel_center(&self, z: usize, y: usize, x: usize) -> Point<3> {
        self.transform_continuous_index_to_physical_point(&Point::<3>::new(x as f64, y as f64, z as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn image(origin: Point3, spacing: Spacing3) -> Image<Backend, 3> {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        Image::new(data, origin, spacing, Direction3::identity())
    }

    #[test]
    fn test_image_creation() {
        let img = image(Point3::origin(), Spacing3::new(1.0, 1.0, 1.0));
        assert_eq!(img.shape(), [10, 10, 10]);
        assert_eq!(img.num_voxels(), 1000);
        assert_eq!(img.direction(), &Direction3::identity());
    }

    #[test]
    fn test_anisotropic_index_round_trip() {
        let img = image(Point3::new(10.0, 20.0, 30.0), Spacing3::new(0.5, 0.5, 2.0));
        let point = Point3::new(12.5, 21.0, 38.0);
        let index = img.transform_physical_point_to_continuous_index(&point);
        assert!((index[0] - 5.0).abs() < 1e-9);
        assert!((index[1] - 2.0).abs() < 1e-9);
        assert!((index[2] - 4.0).abs() < 1e-9);

        let back = img.transform_continuous_index_to_physical_point(&index);
        assert!((back - point).norm() < 1e-9);
    }

    #[test]
    fn test_tensor_mapping_matches_scalar_mapping() {
        let device = Default::default();
        let img = image(Point3::new(1.0, 2.0, 3.0), Spacing3::new(0.5, 1.0, 4.0));
        let indices = Tensor::<Backend, 2>::from_floats([[2.0, 3.0, 1.0]], &device);
        let points = img.index_to_world_tensor(indices.clone());
        let values = points.to_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![2.0, 5.0, 7.0]);

        let back = img.world_to_index_tensor(points).to_data().to_vec::<f32>().unwrap();
        assert_eq!(back, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_with_spacing_keeps_values() {
        let device = Default::default();
        let img = Image::<Backend, 3>::from_vec(
            (0..8).map(|v| v as f32).collect(),
            [2, 2, 2],
            Spacing3::new(1.0, 1.0, 1.0),
            &device,
        );
        let scaled = img.with_spacing(Spacing3::new(1.0, 1.0, 1.6));
        assert_eq!(scaled.to_vec(), img.to_vec());
        assert_eq!(scaled.voxel_center(1, 0, 0), Point3::new(0.0, 0.0, 1.6));
    }
}
