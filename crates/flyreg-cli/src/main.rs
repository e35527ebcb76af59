use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Result};
use burn_ndarray::NdArray;
use clap::{Parser, ValueEnum};
use flyreg_io::{NiftiVolumeLoader, NiftiVolumeWriter};
use flyreg_registration::batch::collect_candidates;
use flyreg_registration::status::{StatusEvent, StatusSink};
use flyreg_registration::{
    BatchDriver, BatchOptions, RegistrationSettings, RollAngleMethod, SampleStatus, Stage, StatusTracker,
    ThresholdModality,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "flyreg")]
#[command(about = "Register fly embryo volumes into a canonical frame")]
struct Cli {
    /// Input files or directories (directories are scanned one level deep)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory receiving `<name>-registered.nii` files
    #[arg(short, long, default_value = ".")]
    output_directory: PathBuf,

    /// Comma-separated accepted file name suffixes
    #[arg(long, default_value = ".nii,.nii.gz")]
    file_name_ends_with: String,

    /// Samples processed concurrently (0 = all cores)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(clap::Args)]
struct SettingsArgs {
    /// Channel used for pose estimation and masking (1-based)
    #[arg(long, default_value_t = 2)]
    alignment_channel: usize,

    /// Channel used for roll refinement (1-based); the alignment channel when omitted
    #[arg(long)]
    secondary_channel: Option<usize>,

    /// Isotropic voxel size for pose estimation and masking, in µm
    #[arg(long, default_value_t = 6.0)]
    registration_resolution: f64,

    /// Isotropic voxel size of the output, in µm
    #[arg(long, default_value_t = 0.7)]
    output_resolution: f64,

    /// Multiplier applied to the axial voxel size
    #[arg(long, default_value_t = 1.6)]
    axial_correction_factor: f64,

    /// Depth over which intensity gain grows by a factor of e, in µm
    #[arg(long, default_value_t = 170.0)]
    intensity_decay_length: f64,

    #[arg(long, value_enum, default_value_t = RollMethodArg::Intensity)]
    roll_angle_method: RollMethodArg,

    #[arg(long, default_value_t = 0.0)]
    roll_min_distance_to_axis: f64,

    #[arg(long, default_value_t = 105.0)]
    roll_min_distance_to_center: f64,

    #[arg(long, default_value_t = 200.0)]
    roll_max_distance_to_center: f64,

    #[arg(long, default_value_t = 20.0)]
    projection_blur_sigma: f64,

    /// Inner radius of the projection ray search, in µm
    #[arg(long, default_value_t = 20.0)]
    projection_min_radius: f64,

    /// Outer radius of the projection ray search, in µm
    #[arg(long, default_value_t = 80.0)]
    projection_max_radius: f64,

    /// Minimal distance to the background of watershed seeds, in µm
    #[arg(long, default_value_t = 160.0 / 3.0)]
    watershed_seed_distance: f64,

    #[arg(long, value_enum, default_value_t = ThresholdArg::Manual)]
    threshold_modality: ThresholdArg,

    /// Manual threshold in background-peak half-widths
    #[arg(long, default_value_t = 5.0)]
    threshold_half_widths: f64,

    /// Output extent x,y,z in µm
    #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [630.0, 240.0, 240.0])]
    output_size: Vec<f64>,

    /// Smallest specimen volume, in µm³
    #[arg(long, default_value_t = 160.0 * 160.0 * 160.0)]
    minimal_object_size: f64,

    /// Only report the ellipsoid fit, write nothing
    #[arg(long)]
    only_ellipsoid: bool,

    /// Keep intermediate images of each stage
    #[arg(long)]
    intermediate_results: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RollMethodArg {
    Intensity,
    ShapeCentroids,
    ShapeProjection,
}

impl From<RollMethodArg> for RollAngleMethod {
    fn from(arg: RollMethodArg) -> Self {
        match arg {
            RollMethodArg::Intensity => RollAngleMethod::Intensity,
            RollMethodArg::ShapeCentroids => RollAngleMethod::ShapeCentroids,
            RollMethodArg::ShapeProjection => RollAngleMethod::ShapeProjection,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThresholdArg {
    Manual,
    Huang,
}

impl From<ThresholdArg> for ThresholdModality {
    fn from(arg: ThresholdArg) -> Self {
        match arg {
            ThresholdArg::Manual => ThresholdModality::Manual,
            ThresholdArg::Huang => ThresholdModality::Huang,
        }
    }
}

impl SettingsArgs {
    fn into_settings(self) -> Result<RegistrationSettings> {
        let [x, y, z] = self.output_size[..] else {
            bail!("--output-size takes exactly three values");
        };
        let mut settings = RegistrationSettings::new()
            .with_alignment_channel(self.alignment_channel)
            .with_registration_resolution(self.registration_resolution)
            .with_output_resolution(self.output_resolution)
            .with_axial_correction_factor(self.axial_correction_factor)
            .with_intensity_decay_length(self.intensity_decay_length)
            .with_roll_angle_method(self.roll_angle_method.into())
            .with_roll_angle_distances(
                self.roll_min_distance_to_axis,
                self.roll_min_distance_to_center,
                self.roll_max_distance_to_center,
            )
            .with_projection_radii(self.projection_min_radius, self.projection_max_radius)
            .with_threshold_modality(self.threshold_modality.into())
            .with_output_image_size([x, y, z])
            .with_minimal_object_size(self.minimal_object_size)
            .with_watershed_seed_distance(self.watershed_seed_distance)
            .with_only_ellipsoid_parameters(self.only_ellipsoid)
            .with_intermediate_results(self.intermediate_results);
        if let Some(channel) = self.secondary_channel {
            settings = settings.with_secondary_channel(channel);
        }
        settings.projection_blur_sigma = self.projection_blur_sigma;
        settings.threshold_in_units_of_background_peak_half_width = self.threshold_half_widths;
        Ok(settings)
    }
}

/// Advances a progress bar once per finished sample, keyed by input path.
struct ProgressSink {
    bar: ProgressBar,
    finished: Mutex<HashSet<String>>,
}

impl StatusSink for ProgressSink {
    fn on_event(&self, event: &StatusEvent) {
        if !matches!(event.stage, Stage::Done | Stage::Failed) {
            return;
        }
        let first = self
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.sample_id.clone());
        if first {
            self.bar.set_message(event.sample_id.clone());
            self.bar.inc(1);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings.into_settings()?;
    let options = BatchOptions {
        output_directory: cli.output_directory,
        file_name_ends_with: cli.file_name_ends_with,
        jobs: cli.jobs,
    };

    let total = collect_candidates(&cli.inputs, &options.file_name_ends_with).len();
    if total == 0 {
        bail!("no input file matches '{}'", options.file_name_ends_with);
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
    let tracker = StatusTracker::tracing().with_sink(Arc::new(ProgressSink {
        bar: bar.clone(),
        finished: Mutex::new(HashSet::new()),
    }));

    let driver = BatchDriver::<Backend, _, _>::new(
        &settings,
        &NiftiVolumeLoader,
        &NiftiVolumeWriter,
        &tracker,
        options,
    );
    let report = driver.run(&cli.inputs)?;
    bar.finish_and_clear();

    for sample in &report.samples {
        match &sample.status {
            SampleStatus::Registered { output } => {
                info!("{} -> {}", sample.input.display(), output.display())
            }
            SampleStatus::EllipsoidOnly { pose, semi_axes } => {
                let [yaw, pitch, roll] = pose.euler_angles_degrees();
                let c = pose.center();
                println!(
                    "{}\tcenter=({:.1}, {:.1}, {:.1})\tangles=({yaw:.2}, {pitch:.2}, {roll:.2})\tsemi_axes=({:.1}, {:.1}, {:.1})",
                    sample.input.display(),
                    c.x,
                    c.y,
                    c.z,
                    semi_axes.x,
                    semi_axes.y,
                    semi_axes.z,
                );
            }
            SampleStatus::Failed { stage, message, .. } => {
                warn!("{} failed at {stage}: {message}", sample.input.display())
            }
        }
    }
    info!(
        "{} of {} samples succeeded",
        report.succeeded(),
        report.samples.len()
    );
    if report.failed() > 0 {
        bail!("{} samples failed", report.failed());
    }
    Ok(())
}
