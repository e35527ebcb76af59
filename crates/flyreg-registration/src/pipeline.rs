//! Registration of one sample, from raw volume to masked canonical stack.
//!
//! Stages run strictly in order and each consumes the previous result:
//! pose estimation, roll refinement, intensity correction, transform
//! composition, resampling, mask generation and masking. Any stage failure
//! ends the run with a tagged error; nothing falls back to an identity pose.

use burn::tensor::backend::Backend;
use flyreg_core::image::{Image, Volume};
use flyreg_core::spatial::{Calibration, Vector3};

use crate::error::Result;
use crate::mask::{apply_mask, ObjectMaskGenerator};
use crate::pose::{EllipsoidFit, EllipsoidPoseEstimator, Pose};
use crate::refractive::RefractiveIndexCorrector;
use crate::resample::ChannelResampler;
use crate::roll::RollAngleRefiner;
use crate::settings::RegistrationSettings;
use crate::status::{Stage, StatusTracker};
use crate::transform::{RegistrationTransform, TransformBuilder};
use crate::validation::ensure_finite_image;

/// Diagnostic images kept when `show_intermediate_results` is set.
#[derive(Debug, Clone)]
pub struct IntermediateResults<B: Backend> {
    /// Reference channel on the isotropic working grid.
    pub working_reference: Image<B, 3>,
    /// Binary mask the ellipsoid was fitted to.
    pub fit_mask: Image<B, 3>,
    /// Reference channel in the canonical frame at registration resolution.
    pub aligned_reference: Image<B, 3>,
    /// Central specimen mask at registration resolution.
    pub aligned_mask: Image<B, 3>,
    /// Watershed regions on the aligned grid.
    pub watershed_labels: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct RegisteredSample<B: Backend> {
    /// Registered and masked channels at output resolution.
    pub volume: Volume<B>,
    /// Pose after roll refinement.
    pub pose: Pose,
    /// Pose straight from the ellipsoid fit.
    pub ellipsoid_pose: Pose,
    pub semi_axes: Vector3,
    pub corrected_calibration: Calibration,
    /// Physical z of the coverslip in corrected micrometers.
    pub coverslip_position: f64,
    pub transform: RegistrationTransform,
    pub intermediate: Option<IntermediateResults<B>>,
}

#[derive(Debug, Clone)]
pub enum RegistrationOutcome<B: Backend> {
    Registered(Box<RegisteredSample<B>>),
    /// Only the ellipsoid was requested.
    EllipsoidOnly(Box<EllipsoidFit<B>>),
}

impl<B: Backend> RegistrationOutcome<B> {
    /// Pose reported for the sample, refined when available.
    pub fn pose(&self) -> &Pose {
        match self {
            RegistrationOutcome::Registered(sample) => &sample.pose,
            RegistrationOutcome::EllipsoidOnly(fit) => &fit.pose,
        }
    }

    pub fn registered(&self) -> Option<&RegisteredSample<B>> {
        match self {
            RegistrationOutcome::Registered(sample) => Some(sample),
            RegistrationOutcome::EllipsoidOnly(_) => None,
        }
    }
}

pub struct RegistrationPipeline<'a> {
    settings: &'a RegistrationSettings,
    tracker: &'a StatusTracker,
}

impl<'a> RegistrationPipeline<'a> {
    pub fn new(settings: &'a RegistrationSettings, tracker: &'a StatusTracker) -> Self {
        Self { settings, tracker }
    }

    /// Registers `volume`; failures are reported to the tracker and returned.
    pub fn run<B: Backend>(&self, volume: &Volume<B>, sample_id: &str) -> Result<RegistrationOutcome<B>> {
        let result = self.run_stages(volume, sample_id);
        match &result {
            Ok(_) => self.tracker.info(Stage::Done, sample_id, "finished"),
            Err(e) => self.tracker.error(Stage::Failed, sample_id, e.to_string()),
        }
        result
    }

    fn run_stages<B: Backend>(&self, volume: &Volume<B>, id: &str) -> Result<RegistrationOutcome<B>> {
        let settings = self.settings;
        settings.validate(volume.num_channels())?;

        let corrector = RefractiveIndexCorrector::from_settings(settings);
        let calibration = corrector.corrected_calibration(volume.calibration())?;
        let channels: Vec<Image<B, 3>> = volume
            .channels()
            .iter()
            .map(|c| c.with_spacing(calibration.spacing()))
            .collect();
        let reference = &channels[settings.alignment_channel()];
        let resampler = ChannelResampler::new();

        self.tracker.info(
            Stage::EstimatePose,
            id,
            format!("fitting ellipsoid at {} um", settings.registration_resolution),
        );
        let working = resampler.isotropic(reference, settings.registration_resolution);
        let fit = EllipsoidPoseEstimator::new(settings).estimate(&working, &calibration)?;
        let [yaw, pitch, roll] = fit.pose.euler_angles_degrees();
        self.tracker.info(
            Stage::EstimatePose,
            id,
            format!(
                "center {:.1} {:.1} {:.1} px, angles {yaw:.1} {pitch:.1} {roll:.1} deg",
                fit.pose.center()[0],
                fit.pose.center()[1],
                fit.pose.center()[2]
            ),
        );
        if settings.only_compute_ellipsoid_parameters {
            return Ok(RegistrationOutcome::EllipsoidOnly(Box::new(fit)));
        }

        self.tracker.info(Stage::RefineRoll, id, format!("{:?}", settings.roll_angle_computation_method));
        let roll_working = if settings.secondary_channel() == settings.alignment_channel() {
            working.clone()
        } else {
            resampler.isotropic(&channels[settings.secondary_channel()], settings.registration_resolution)
        };
        let pose = RollAngleRefiner::new(settings).refine(&fit.pose, &calibration, &roll_working, &fit.object_mask)?;

        let coverslip = corrector.coverslip_position(&fit.object_mask)?;
        self.tracker.info(
            Stage::CorrectIntensity,
            id,
            format!("coverslip at {coverslip:.1} um"),
        );
        let corrected = corrector.correct_channels(&channels, coverslip, volume.sample_type());

        self.tracker.info(Stage::BuildTransform, id, format!("output resolution {} um", settings.output_resolution));
        let builder = TransformBuilder::new(settings);
        let transform = builder.build(Some(&pose), Some(&calibration), settings.output_resolution)?;
        let coarse = builder.build(Some(&pose), Some(&calibration), settings.registration_resolution)?;

        self.tracker.info(
            Stage::Resample,
            id,
            format!("{} channel(s) onto {:?}", corrected.len(), transform.interval().shape()),
        );
        let resampled = resampler.resample_channels(&corrected, &transform)?;
        for (i, channel) in resampled.iter().enumerate() {
            ensure_finite_image(channel, &format!("channel {}", i + 1))?;
        }

        self.tracker.info(Stage::GenerateMask, id, "separating central specimen");
        let aligned_reference = resampler.resample(reference, &coarse)?;
        let object = ObjectMaskGenerator::new(settings).generate(&aligned_reference, fit.threshold)?;
        let mask = object.upsample(transform.interval(), settings.output_resolution);

        self.tracker.info(Stage::ApplyMask, id, "masking channels");
        let masked = apply_mask(&resampled, &mask)?;
        let registered = Volume::new(masked, volume.sample_type())?;

        let intermediate = settings.show_intermediate_results.then(|| IntermediateResults {
            working_reference: working,
            fit_mask: fit.object_mask.clone(),
            aligned_reference,
            aligned_mask: object.image().clone(),
            watershed_labels: object.labels().to_vec(),
        });

        Ok(RegistrationOutcome::Registered(Box::new(RegisteredSample {
            volume: registered,
            pose,
            ellipsoid_pose: fit.pose,
            semi_axes: fit.semi_axes,
            corrected_calibration: calibration,
            coverslip_position: coverslip,
            transform,
            intermediate,
        })))
    }
}
