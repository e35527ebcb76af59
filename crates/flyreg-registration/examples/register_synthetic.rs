//! Registers a synthetic embryo and prints the recovered pose.
//!
//! Usage:
//!   cargo run --example register_synthetic

use burn_ndarray::NdArray;
use flyreg_core::image::{Image, SampleType, Volume};
use flyreg_core::spatial::rotation::rotation_from_euler_degrees;
use flyreg_core::spatial::{Spacing3, Vector3};
use flyreg_registration::{RegistrationPipeline, RegistrationSettings, StatusTracker};

type Backend = NdArray<f32>;

const SIZE: [usize; 3] = [120, 110, 82];
const CENTER: [f64; 3] = [360.0, 330.0, 246.0];
const SEMI_AXES: [f64; 3] = [210.0, 80.0, 80.0];

fn synthetic_volume(yaw: f64, roll: f64) -> anyhow::Result<Volume<Backend>> {
    let [nx, ny, nz] = SIZE;
    let frame = rotation_from_euler_degrees([yaw, 0.0, roll]).transpose();
    let center = Vector3::from(CENTER);
    let mut values = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let local = frame * (Vector3::new(x as f64, y as f64, z as f64) * 6.0 - center);
                let r = (0..3).map(|i| (local[i] / SEMI_AXES[i]).powi(2)).sum::<f64>();
                values.push(match (r <= 1.0, local[1] > 40.0) {
                    (true, true) => 200.0,
                    (true, false) => 100.0,
                    _ => 10.0 + ((x * 7 + y * 3 + z) % 5) as f32,
                });
            }
        }
    }

    let device = Default::default();
    // Axial spacing before the refractive-index correction.
    let spacing = Spacing3::new(6.0, 6.0, 3.75);
    let reference = Image::from_vec(values, [nz, ny, nx], spacing, &device);
    Ok(Volume::new(vec![reference.clone(), reference], SampleType::U16)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = RegistrationSettings::new().with_output_resolution(3.0);
    let tracker = StatusTracker::tracing();
    let volume = synthetic_volume(-22.0, 30.0)?;

    let outcome = RegistrationPipeline::new(&settings, &tracker).run(&volume, "synthetic")?;
    let pose = outcome.pose();
    let [yaw, pitch, roll] = pose.euler_angles_degrees();
    println!("center (px): {:?}", pose.center());
    println!("yaw {yaw:.2}, pitch {pitch:.2}, roll {roll:.2}");
    if let Some(sample) = outcome.registered() {
        println!("output shape [z, y, x]: {:?}", sample.volume.shape());
    }
    Ok(())
}
