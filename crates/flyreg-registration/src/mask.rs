//! Isolation of the central specimen in the registered frame.
//!
//! The aligned reference channel is binarized and split by a distance-based
//! marker watershed, so that neighbours touching the specimen end up in their
//! own regions. Only the region holding the canonical origin is kept.

use burn::tensor::backend::Backend;
use flyreg_core::filter::{binarize, distance_transform, label_components, marker_watershed, ResampleImageFilter};
use flyreg_core::image::Image;
use flyreg_core::interpolation::NearestNeighborInterpolator;
use flyreg_core::spatial::Point3;
use flyreg_core::transform::AffineTransform;

use crate::error::{RegistrationError, Result};
use crate::settings::RegistrationSettings;
use crate::transform::OutputInterval;
use crate::validation::validate_image_shapes;

/// Mask of the central specimen on the aligned registration grid.
#[derive(Debug, Clone)]
pub struct ObjectMask<B: Backend> {
    mask: Image<B, 3>,
    labels: Vec<u32>,
    central_label: u32,
}

impl<B: Backend> ObjectMask<B> {
    /// 1.0 inside the central specimen, 0.0 elsewhere.
    pub fn image(&self) -> &Image<B, 3> {
        &self.mask
    }

    /// Watershed regions, `[Z, Y, X]` row-major; 0 is background.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn central_label(&self) -> u32 {
        self.central_label
    }

    /// Nearest-neighbour copy of the mask on the output grid.
    pub fn upsample(&self, interval: &OutputInterval, resolution: f64) -> Image<B, 3> {
        let filter = ResampleImageFilter::new(
            interval.shape(),
            interval.origin_physical(resolution),
            OutputInterval::spacing(resolution),
            AffineTransform::identity(&self.mask.device()),
            NearestNeighborInterpolator::new(),
        );
        filter.apply(&self.mask)
    }
}

pub struct ObjectMaskGenerator<'a> {
    settings: &'a RegistrationSettings,
}

impl<'a> ObjectMaskGenerator<'a> {
    pub fn new(settings: &'a RegistrationSettings) -> Self {
        Self { settings }
    }

    /// Segments `aligned_reference`, the reference channel resampled into the
    /// canonical frame, with the threshold found during pose estimation.
    pub fn generate<B: Backend>(&self, aligned_reference: &Image<B, 3>, threshold: f32) -> Result<ObjectMask<B>> {
        let shape = aligned_reference.shape();
        let foreground: Vec<bool> = binarize(aligned_reference, threshold)
            .to_vec()
            .into_iter()
            .map(|v| v > 0.5)
            .collect();

        let distance = distance_transform(&foreground, shape, *aligned_reference.spacing());
        let seed_distance = self.settings.watershed_seeds_global_distance_threshold;
        let cores: Vec<bool> = distance.iter().map(|d| *d >= seed_distance).collect();
        let mut markers = label_components(&cores, shape);
        if markers.is_empty() {
            tracing::debug!(seed_distance, "No watershed seeds, using connected components");
            markers = label_components(&foreground, shape);
        }
        let labels = marker_watershed(&distance, &foreground, markers.labels(), shape);

        let origin = aligned_reference.transform_physical_point_to_continuous_index(&Point3::origin());
        let [nz, ny, nx] = shape;
        let index = [origin[2], origin[1], origin[0]].map(|v| v.round());
        if index.iter().zip([nz, ny, nx]).any(|(i, n)| *i < 0.0 || *i >= n as f64) {
            return Err(RegistrationError::no_object_found("canonical origin lies outside the aligned volume"));
        }
        let [z, y, x] = index.map(|v| v as usize);
        let central_label = labels[(z * ny + y) * nx + x];
        if central_label == 0 {
            return Err(RegistrationError::no_object_found("no specimen at the canonical origin"));
        }

        let values: Vec<f32> = labels
            .iter()
            .map(|l| if *l == central_label { 1.0 } else { 0.0 })
            .collect();
        let kept = values.iter().filter(|v| **v > 0.0).count();
        tracing::debug!(
            regions = markers.len(),
            central_label,
            voxels = kept,
            "Separated central specimen"
        );
        let mask = Image::<B, 3>::from_vec(values, shape, *aligned_reference.spacing(), &aligned_reference.device());
        Ok(ObjectMask {
            mask: aligned_reference.with_data(mask.into_data()),
            labels,
            central_label,
        })
    }
}

/// Zeroes every channel outside `mask`. Applying it twice changes nothing.
pub fn apply_mask<B: Backend>(channels: &[Image<B, 3>], mask: &Image<B, 3>) -> Result<Vec<Image<B, 3>>> {
    let mut all = channels.to_vec();
    all.push(mask.clone());
    validate_image_shapes(&all)?;
    Ok(channels
        .iter()
        .map(|c| c.with_data(c.data().clone() * mask.data().clone()))
        .collect())
}
