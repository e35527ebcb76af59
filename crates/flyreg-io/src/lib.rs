//! File format adapters for flyreg volumes.

pub mod nifti_io;

pub use nifti_io::{NiftiVolumeLoader, NiftiVolumeWriter};
