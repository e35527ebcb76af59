#![allow(dead_code)]

use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use flyreg_core::image::{Image, SampleType, Volume};
use flyreg_core::spatial::rotation::rotation_from_euler_degrees;
use flyreg_core::spatial::{Spacing3, Vector3};
use flyreg_registration::RegistrationSettings;

pub type B = NdArray<f32>;

/// Raw voxel size; the axial correction factor of 1.6 makes it isotropic.
pub const RAW_CALIBRATION: [f64; 3] = [6.0, 6.0, 3.75];
pub const CORRECTED_VOXEL: f64 = 6.0;

pub const SEMI_AXES: [f64; 3] = [210.0, 80.0, 80.0];

/// Synthetic embryo: a solid ellipsoid with a bright nerve cord band on the
/// +secondary side, on a noisy background.
#[derive(Debug, Clone, Copy)]
pub struct EmbryoFixture {
    /// Grid size `(x, y, z)`.
    pub size: [usize; 3],
    /// Center in voxels `(x, y, z)`.
    pub center: [f64; 3],
    pub yaw: f64,
    pub roll: f64,
}

pub const FIXTURE_A: EmbryoFixture = EmbryoFixture {
    size: [120, 110, 82],
    center: [60.0, 55.0, 41.0],
    yaw: -22.0,
    roll: 30.0,
};

pub const FIXTURE_B: EmbryoFixture = EmbryoFixture {
    size: [120, 140, 80],
    center: [58.0, 69.0, 38.0],
    yaw: -54.0,
    roll: -40.0,
};

/// Lies on the first plane, so the coverslip side is cut off.
pub const FIXTURE_ON_FIRST_PLANE: EmbryoFixture = EmbryoFixture {
    size: [120, 110, 40],
    center: [60.0, 55.0, 8.0],
    yaw: -22.0,
    roll: 30.0,
};

impl EmbryoFixture {
    fn channel_values(&self, inside: impl Fn(f64, f64, f64) -> f32) -> Vec<f32> {
        let [nx, ny, nz] = self.size;
        let rotation = rotation_from_euler_degrees([self.yaw, 0.0, self.roll]);
        let frame = rotation.transpose();
        let c = Vector3::new(self.center[0], self.center[1], self.center[2]) * CORRECTED_VOXEL;
        let mut values = Vec::with_capacity(nx * ny * nz);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let p = Vector3::new(x as f64, y as f64, z as f64) * CORRECTED_VOXEL;
                    let local = frame * (p - c);
                    let body = (local[0] / SEMI_AXES[0]).powi(2)
                        + (local[1] / SEMI_AXES[1]).powi(2)
                        + (local[2] / SEMI_AXES[2]).powi(2)
                        <= 1.0;
                    let index = (z * ny + y) * nx + x;
                    let noise = ((index as u64).wrapping_mul(2_654_435_761) >> 7) % 7;
                    values.push(if body {
                        inside(local[0], local[1], local[2])
                    } else {
                        10.0 + noise as f32
                    });
                }
            }
        }
        values
    }

    /// Two channels: a uniform body stain and the reference with the nerve cord.
    pub fn volume(&self) -> Volume<B> {
        let [nx, ny, nz] = self.size;
        let shape = [nz, ny, nx];
        let spacing = Spacing3::new(RAW_CALIBRATION[0], RAW_CALIBRATION[1], RAW_CALIBRATION[2]);
        let device = Default::default();
        let body = self.channel_values(|_, _, _| 60.0);
        let reference = self.channel_values(|_, v, _| if v > 40.0 { 200.0 } else { 100.0 });
        Volume::new(
            vec![
                Image::from_vec(body, shape, spacing, &device),
                Image::from_vec(reference, shape, spacing, &device),
            ],
            SampleType::U16,
        )
        .unwrap()
    }

    pub fn center_physical(&self) -> Vector3 {
        Vector3::new(self.center[0], self.center[1], self.center[2]) * CORRECTED_VOXEL
    }
}

/// Defaults with a coarse output grid to keep the tests fast.
pub fn test_settings() -> RegistrationSettings {
    RegistrationSettings::default().with_output_resolution(6.0)
}

pub fn uniform_volume<Be: Backend>(shape: [usize; 3], value: f32) -> Volume<Be> {
    let spacing = Spacing3::new(RAW_CALIBRATION[0], RAW_CALIBRATION[1], RAW_CALIBRATION[2]);
    let n = shape.iter().product();
    let image = Image::from_vec(vec![value; n], shape, spacing, &Default::default());
    Volume::new(vec![image.clone(), image], SampleType::U8).unwrap()
}
