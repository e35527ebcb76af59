//! Image filters.

pub mod distance;
pub mod gaussian;
pub mod label;
pub mod resample;
pub mod threshold;
pub mod watershed;

pub use distance::distance_transform;
pub use gaussian::GaussianFilter;
pub use label::{face_neighbors, label_components, Components};
pub use resample::ResampleImageFilter;
pub use threshold::{background_peak_threshold, binarize, huang_threshold, Histogram};
pub use watershed::marker_watershed;
