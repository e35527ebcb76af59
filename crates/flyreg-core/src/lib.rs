//! Core imaging types for embryo volume registration.
//!
//! Voxel data lives in burn tensors laid out `[Z, Y, X]`; physical geometry
//! uses nalgebra types ordered `(x, y, z)` in micrometers.

pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod io;
pub mod spatial;
pub mod transform;

pub use error::VolumeError;
pub use image::{Image, SampleType, Volume};
pub use io::{VolumeLoader, VolumeWriter};
pub use spatial::{Affine3, Calibration, Direction, Point, Spacing, Vector};
