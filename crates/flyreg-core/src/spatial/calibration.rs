//! Physical voxel size of a volume.

use serde::{Deserialize, Serialize};

use super::Spacing3;
use crate::error::{Result, VolumeError};

/// Voxel size in micrometers, ordered `(x, y, z)`.
///
/// Every component is finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    spacing: Spacing3,
}

impl Calibration {
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::from_spacing(Spacing3::new(x, y, z))
    }

    pub fn isotropic(size: f64) -> Result<Self> {
        Self::new(size, size, size)
    }

    pub fn from_spacing(spacing: Spacing3) -> Result<Self> {
        if spacing.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(VolumeError::InvalidCalibration(format!(
                "voxel size ({}, {}, {}) must be finite and positive",
                spacing[0], spacing[1], spacing[2]
            )));
        }
        Ok(Self { spacing })
    }

    pub fn x(&self) -> f64 {
        self.spacing[0]
    }

    pub fn y(&self) -> f64 {
        self.spacing[1]
    }

    pub fn z(&self) -> f64 {
        self.spacing[2]
    }

    pub fn spacing(&self) -> Spacing3 {
        self.spacing
    }

    /// Returns the calibration with the axial voxel size multiplied by `factor`.
    pub fn with_axial_factor(&self, factor: f64) -> Result<Self> {
        Self::new(self.x(), self.y(), self.z() * factor)
    }

    /// Extent in micrometers of a grid of `size` voxels, `[Z, Y, X]` order.
    pub fn extent(&self, size: [usize; 3]) -> Spacing3 {
        Spacing3::new(
            size[2] as f64 * self.x(),
            size[1] as f64 * self.y(),
            size[0] as f64 * self.z(),
        )
    }
}
