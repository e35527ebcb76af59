//! Format-agnostic volume reading and writing.
//!
//! Concrete formats live in `flyreg-io`; registration code only sees these
//! traits so batch drivers and tests can substitute their own sources.

use std::path::Path;

use burn::tensor::backend::Backend;

use crate::error::Result;
use crate::image::Volume;

/// Decodes a multi-channel volume from a file.
pub trait VolumeLoader<B: Backend>: Send + Sync {
    fn load(&self, path: &Path, device: &B::Device) -> Result<Volume<B>>;
}

/// Encodes a multi-channel volume with its calibration.
pub trait VolumeWriter<B: Backend>: Send + Sync {
    /// File extension written by this writer, without the leading dot.
    fn extension(&self) -> &str;

    fn save(&self, volume: &Volume<B>, path: &Path) -> Result<()>;
}
