//! Batch registration of many files.
//!
//! Each accepted file is loaded, registered and written independently on a
//! bounded worker pool. A failing file is reported and skipped; it never
//! stops the rest of the batch.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use flyreg_core::io::{VolumeLoader, VolumeWriter};
use flyreg_core::spatial::Vector3;
use rayon::prelude::*;

use crate::error::{FailureReason, RegistrationError, Result};
use crate::pipeline::{RegistrationOutcome, RegistrationPipeline};
use crate::pose::Pose;
use crate::settings::RegistrationSettings;
use crate::status::{Stage, StatusTracker};

/// True when `file_name` ends with one of the comma separated suffixes.
pub fn accept_file(file_name_ends_with: &str, file_name: &str) -> bool {
    file_name_ends_with
        .split(',')
        .any(|suffix| file_name.ends_with(suffix.trim()))
}

/// Expands directories (one level) and keeps accepted files, sorted.
pub fn collect_candidates(paths: &[PathBuf], file_name_ends_with: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            match std::fs::read_dir(path) {
                Ok(entries) => files.extend(entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_file())),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable directory"),
            }
        } else {
            files.push(path.clone());
        }
    }
    files.retain(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| accept_file(file_name_ends_with, n))
    });
    files.sort();
    files.dedup();
    files
}

/// `<output_directory>/<file name>-registered.<extension>`
pub fn output_path(input: &Path, output_directory: &Path, extension: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_directory.join(format!("{name}-registered.{extension}"))
}

/// Output paths claimed by more than one of `inputs`, in sorted order.
pub fn output_collisions(inputs: &[PathBuf], output_directory: &Path, extension: &str) -> Vec<PathBuf> {
    let mut outputs: Vec<PathBuf> = inputs
        .iter()
        .map(|input| output_path(input, output_directory, extension))
        .collect();
    outputs.sort();
    let mut collisions: Vec<PathBuf> = outputs
        .windows(2)
        .filter(|pair| pair[0] == pair[1])
        .map(|pair| pair[0].clone())
        .collect();
    collisions.dedup();
    collisions
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleStatus {
    Registered { output: PathBuf },
    EllipsoidOnly { pose: Pose, semi_axes: Vector3 },
    Failed {
        stage: Stage,
        reason: Option<FailureReason>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub input: PathBuf,
    pub status: SampleStatus,
}

impl SampleReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, SampleStatus::Failed { .. })
    }
}

/// Per-file results in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub samples: Vec<SampleReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.samples.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.samples.len() - self.succeeded()
    }

    pub fn outputs(&self) -> Vec<&Path> {
        self.samples
            .iter()
            .filter_map(|s| match &s.status {
                SampleStatus::Registered { output } => Some(output.as_path()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_directory: PathBuf,
    pub file_name_ends_with: String,
    /// Concurrent samples; 0 uses every core.
    pub jobs: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            file_name_ends_with: ".nii,.nii.gz".to_string(),
            jobs: 0,
        }
    }
}

pub struct BatchDriver<'a, B: Backend, L, W> {
    settings: &'a RegistrationSettings,
    loader: &'a L,
    writer: &'a W,
    tracker: &'a StatusTracker,
    options: BatchOptions,
    _backend: PhantomData<fn() -> B>,
}

impl<'a, B, L, W> BatchDriver<'a, B, L, W>
where
    B: Backend,
    L: VolumeLoader<B>,
    W: VolumeWriter<B>,
{
    pub fn new(
        settings: &'a RegistrationSettings,
        loader: &'a L,
        writer: &'a W,
        tracker: &'a StatusTracker,
        options: BatchOptions,
    ) -> Self {
        Self {
            settings,
            loader,
            writer,
            tracker,
            options,
            _backend: PhantomData,
        }
    }

    /// Registers every accepted file among `inputs`.
    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchReport> {
        let files = collect_candidates(inputs, &self.options.file_name_ends_with);
        std::fs::create_dir_all(&self.options.output_directory).map_err(|e| {
            RegistrationError::invalid_configuration(format!(
                "cannot create output directory {}: {e}",
                self.options.output_directory.display()
            ))
        })?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| RegistrationError::invalid_configuration(format!("cannot start worker pool: {e}")))?;

        for output in output_collisions(&files, &self.options.output_directory, self.writer.extension()) {
            tracing::warn!(output = %output.display(), "Several inputs share a file name and will overwrite one output");
        }

        tracing::info!(files = files.len(), jobs = pool.current_num_threads(), "Starting batch");
        let samples: Vec<SampleReport> = pool.install(|| files.par_iter().map(|f| self.process(f)).collect());
        let report = BatchReport { samples };
        tracing::info!(succeeded = report.succeeded(), failed = report.failed(), "Batch finished");
        Ok(report)
    }

    fn process(&self, input: &Path) -> SampleReport {
        // Full path: inputs from different directories may share a file name.
        let id = input.display().to_string();
        let failed = |stage, reason, message: String| SampleReport {
            input: input.to_path_buf(),
            status: SampleStatus::Failed { stage, reason, message },
        };

        self.tracker.info(Stage::Load, &id, format!("reading {}", input.display()));
        let device = B::Device::default();
        let volume = match self.loader.load(input, &device) {
            Ok(volume) => volume,
            Err(e) => {
                self.tracker.error(Stage::Failed, &id, format!("error opening file: {e}"));
                return failed(Stage::Load, None, e.to_string());
            }
        };

        let outcome = match RegistrationPipeline::new(self.settings, self.tracker).run(&volume, &id) {
            Ok(outcome) => outcome,
            Err(e) => return failed(Stage::Failed, e.failure_reason(), e.to_string()),
        };
        drop(volume);

        match outcome {
            RegistrationOutcome::EllipsoidOnly(fit) => SampleReport {
                input: input.to_path_buf(),
                status: SampleStatus::EllipsoidOnly {
                    pose: fit.pose,
                    semi_axes: fit.semi_axes,
                },
            },
            RegistrationOutcome::Registered(sample) => {
                let output = output_path(input, &self.options.output_directory, self.writer.extension());
                self.tracker.info(Stage::Save, &id, format!("writing {}", output.display()));
                match self.writer.save(&sample.volume, &output) {
                    Ok(()) => SampleReport {
                        input: input.to_path_buf(),
                        status: SampleStatus::Registered { output },
                    },
                    Err(e) => {
                        self.tracker.error(Stage::Failed, &id, format!("error writing file: {e}"));
                        failed(Stage::Save, None, e.to_string())
                    }
                }
            }
        }
    }
}
