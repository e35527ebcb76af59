//! Registration of fly embryo volumes into a canonical frame.
//!
//! A reference channel is thresholded and fitted with an ellipsoid, the roll
//! about the long axis is resolved from an asymmetry of the end regions, the
//! axial calibration and intensities are corrected for refractive index
//! mismatch, and every channel is resampled into an origin-centered output
//! box and masked to the central specimen.

pub mod batch;
pub mod error;
pub mod mask;
pub mod pipeline;
pub mod pose;
pub mod refractive;
pub mod resample;
pub mod roll;
pub mod settings;
pub mod status;
pub mod transform;
pub mod validation;

pub use batch::{accept_file, output_collisions, BatchDriver, BatchOptions, BatchReport, SampleReport, SampleStatus};
pub use error::{FailureReason, RegistrationError, Result};
pub use mask::{apply_mask, ObjectMask, ObjectMaskGenerator};
pub use pipeline::{IntermediateResults, RegisteredSample, RegistrationOutcome, RegistrationPipeline};
pub use pose::{EllipsoidFit, EllipsoidPoseEstimator, Pose};
pub use refractive::RefractiveIndexCorrector;
pub use resample::ChannelResampler;
pub use roll::RollAngleRefiner;
pub use settings::{RegistrationSettings, RollAngleMethod, ThresholdModality};
pub use status::{HistoryStatusSink, Stage, StatusEvent, StatusLevel, StatusSink, StatusTracker, TracingStatusSink};
pub use transform::{OutputInterval, RegistrationTransform, TransformBuilder};
