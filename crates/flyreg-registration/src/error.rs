//! Error types for registration operations.

use flyreg_core::VolumeError;
use thiserror::Error;

/// Why a sample could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoObjectFound,
    NoCoverslip,
    NoTransform,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::NoObjectFound => "no object found",
            FailureReason::NoCoverslip => "no coverslip",
            FailureReason::NoTransform => "no transform",
        };
        f.write_str(name)
    }
}

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Thresholding or the ellipsoid fit found no usable specimen.
    #[error("Could not find central embryo: {0}")]
    NoObjectFound(String),

    /// The coverslip side of the specimen could not be located.
    #[error("Could not locate coverslip: {0}")]
    NoCoverslip(String),

    /// The registration transform could not be composed.
    #[error("Could not build registration transform: {0}")]
    NoTransform(String),

    /// Settings are inconsistent with each other or with the input.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Volume construction or I/O failed.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn no_object_found(msg: impl Into<String>) -> Self {
        Self::NoObjectFound(msg.into())
    }

    pub fn no_coverslip(msg: impl Into<String>) -> Self {
        Self::NoCoverslip(msg.into())
    }

    pub fn no_transform(msg: impl Into<String>) -> Self {
        Self::NoTransform(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// The pipeline failure this error stands for, if it is one.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::NoObjectFound(_) => Some(FailureReason::NoObjectFound),
            Self::NoCoverslip(_) => Some(FailureReason::NoCoverslip),
            Self::NoTransform(_) => Some(FailureReason::NoTransform),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::no_object_found("empty mask");
        assert_eq!(err.to_string(), "Could not find central embryo: empty mask");
    }

    #[test]
    fn test_failure_reason_mapping() {
        assert_eq!(
            RegistrationError::no_coverslip("x").failure_reason(),
            Some(FailureReason::NoCoverslip)
        );
        assert_eq!(
            RegistrationError::no_transform("x").failure_reason(),
            Some(FailureReason::NoTransform)
        );
        assert_eq!(RegistrationError::invalid_configuration("x").failure_reason(), None);
    }

    #[test]
    fn test_volume_error_converts() {
        let err: RegistrationError = VolumeError::Empty.into();
        assert!(matches!(err, RegistrationError::Volume(VolumeError::Empty)));
        assert_eq!(err.failure_reason(), None);
    }
}
