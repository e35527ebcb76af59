//! Images and multi-channel volumes.

pub mod image;
pub mod volume;

pub use image::Image;
pub use volume::{SampleType, Volume};
