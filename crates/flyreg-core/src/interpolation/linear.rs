//! Trilinear interpolation with zero padding.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::{split_xyz, Interpolator};

// Slack on the bounds test so grid points that land on the last voxel
// through rounding are still sampled.
const BOUNDS_TOLERANCE: f64 = 1e-3;

/// Trilinear interpolator.
///
/// Samples whose continuous index falls outside `[0, n - 1]` on any axis
/// evaluate to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }

    /// 1.0 where `coord` lies inside `[0, n - 1]`, 0.0 elsewhere.
    fn inside<B: Backend>(coord: &Tensor<B, 1>, n: usize) -> Tensor<B, 1> {
        let lower = coord.clone().greater_equal_elem(-BOUNDS_TOLERANCE).float();
        let upper = coord
            .clone()
            .lower_equal_elem((n - 1) as f64 + BOUNDS_TOLERANCE)
            .float();
        lower * upper
    }

    #[inline]
    fn gather<B: Backend>(
        flat_data: &Tensor<B, 1>,
        xi: &Tensor<B, 1, Int>,
        yi: &Tensor<B, 1, Int>,
        zi: &Tensor<B, 1, Int>,
        stride_y: i32,
        stride_z: i32,
    ) -> Tensor<B, 1> {
        let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
        flat_data.clone().gather(0, idx)
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims(); // Z, Y, X
        let [x, y, z] = split_xyz(indices);

        let inside = Self::inside(&x, d2) * Self::inside(&y, d1) * Self::inside(&z, d0);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = (x - x0.clone()).clamp(0.0, 1.0);
        let wy = (y - y0.clone()).clamp(0.0, 1.0);
        let wz = (z - z0.clone()).clamp(0.0, 1.0);

        let x1_i = (x0.clone() + 1.0).clamp(0.0, (d2 - 1) as f64).int();
        let y1_i = (y0.clone() + 1.0).clamp(0.0, (d1 - 1) as f64).int();
        let z1_i = (z0.clone() + 1.0).clamp(0.0, (d0 - 1) as f64).int();
        let x0_i = x0.clamp(0.0, (d2 - 1) as f64).int();
        let y0_i = y0.clamp(0.0, (d1 - 1) as f64).int();
        let z0_i = z0.clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;
        let flat = data.clone().reshape([d0 * d1 * d2]);

        let v000 = Self::gather(&flat, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
        let v001 = Self::gather(&flat, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
        let v010 = Self::gather(&flat, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
        let v011 = Self::gather(&flat, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
        let v100 = Self::gather(&flat, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
        let v101 = Self::gather(&flat, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
        let v110 = Self::gather(&flat, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
        let v111 = Self::gather(&flat, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

        let one_minus_wx = wx.clone().neg() + 1.0;
        let one_minus_wy = wy.clone().neg() + 1.0;
        let one_minus_wz = wz.clone().neg() + 1.0;

        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        (c0 * one_minus_wz + c1 * wz) * inside
    }
}
