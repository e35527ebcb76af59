//! Resample image filter.
//!
//! Resamples a volume onto a new grid by mapping every output voxel through a
//! transform into the input volume and interpolating there.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};

use crate::image::Image;
use crate::interpolation::trait_::Interpolator;
use crate::spatial::{Direction3, Point3, Spacing3};
use crate::transform::trait_::Transform;

// Output voxels evaluated per pass; bounds the size of the coordinate tensors.
const DEFAULT_CHUNK_VOXELS: usize = 1 << 21;

/// Resample image filter.
///
/// The transform maps output physical space to input physical space, i.e. the
/// inverse of the mapping that carries the input onto the output grid.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    size: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    transform: T,
    interpolator: I,
    chunk_voxels: usize,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// # Arguments
    /// * `size` - Output grid size `[Z, Y, X]`
    /// * `origin` - Physical position of output voxel `[0, 0, 0]`
    /// * `spacing` - Output voxel size `(x, y, z)`
    /// * `transform` - Output physical space to input physical space
    /// * `interpolator` - Sampler for the input volume
    pub fn new(
        size: [usize; 3],
        origin: Point3,
        spacing: Spacing3,
        transform: T,
        interpolator: I,
    ) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction: Direction3::identity(),
            transform,
            interpolator,
            chunk_voxels: DEFAULT_CHUNK_VOXELS,
            _phantom: PhantomData,
        }
    }

    /// Uses the grid of `reference` for the output.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        let mut filter = Self::new(
            reference.shape(),
            *reference.origin(),
            *reference.spacing(),
            transform,
            interpolator,
        );
        filter.direction = *reference.direction();
        filter
    }

    pub fn with_chunk_voxels(mut self, voxels: usize) -> Self {
        self.chunk_voxels = voxels.max(1);
        self
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.device();
        let [d, h, w] = self.size;
        let output_grid = Image::<B, 3>::new(
            Tensor::<B, 3>::zeros([1, 1, 1], &device),
            self.origin,
            self.spacing,
            self.direction,
        );

        let planes_per_chunk = (self.chunk_voxels / (h * w).max(1)).max(1);
        tracing::debug!(
            input = ?input.shape(),
            output = ?self.size,
            planes_per_chunk,
            "Resampling volume"
        );
        let mut chunks = Vec::with_capacity(d.div_ceil(planes_per_chunk));
        let mut z_start = 0;
        while z_start < d {
            let z_end = (z_start + planes_per_chunk).min(d);
            let indices = Self::slab_indices(z_start, z_end, h, w, &device);
            let output_points = output_grid.index_to_world_tensor(indices);
            let input_points = self.transform.transform_points(output_points);
            let input_indices = input.world_to_index_tensor(input_points);
            chunks.push(self.interpolator.interpolate(input.data(), input_indices));
            z_start = z_end;
        }

        let data = if chunks.is_empty() {
            Tensor::<B, 1>::from_data(TensorData::new(Vec::<f32>::new(), Shape::new([0])), &device)
        } else {
            Tensor::cat(chunks, 0)
        };

        Image::new(
            data.reshape(Shape::new(self.size)),
            self.origin,
            self.spacing,
            self.direction,
        )
    }

    /// `(x, y, z)` indices of output planes `z_start..z_end`, `[N, 3]`.
    fn slab_indices(z_start: usize, z_end: usize, h: usize, w: usize, device: &B::Device) -> Tensor<B, 2> {
        let d = z_end - z_start;
        let n = d * h * w;

        let z = Tensor::<B, 1, Int>::arange(z_start as i64..z_end as i64, device)
            .reshape([d, 1, 1])
            .repeat(&[1, h, w])
            .reshape([n]);
        let y = Tensor::<B, 1, Int>::arange(0..h as i64, device)
            .reshape([1, h, 1])
            .repeat(&[d, 1, w])
            .reshape([n]);
        let x = Tensor::<B, 1, Int>::arange(0..w as i64, device)
            .reshape([1, 1, w])
            .repeat(&[d, h, 1])
            .reshape([n]);

        Tensor::cat(
            vec![
                x.float().unsqueeze_dim(1),
                y.float().unsqueeze_dim(1),
                z.float().unsqueeze_dim(1),
            ],
            1,
        )
    }
}
