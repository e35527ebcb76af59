//! NIfTI-1 loader and writer.
//!
//! Files hold `[X, Y, Z]` or `[X, Y, Z, C]` arrays; channels are split into
//! `[Z, Y, X]` images. Pixel dimensions become the calibration and the
//! stored datatype the sample type.

use std::path::Path;

use anyhow::{bail, Context};
use burn::tensor::backend::Backend;
use flyreg_core::error::{Result, VolumeError};
use flyreg_core::image::{Image, SampleType, Volume};
use flyreg_core::io::{VolumeLoader, VolumeWriter};
use flyreg_core::spatial::Calibration;
use ndarray::{Array4, ArrayD, Ix3, Ix4, Ix5};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

// NIfTI datatype codes.
const DT_UINT8: i16 = 2;
const DT_INT16: i16 = 4;
const DT_UINT16: i16 = 512;

// xyzt_units: micrometers.
const NIFTI_UNITS_MICRON: u8 = 3;

fn sample_type_of(datatype: i16) -> SampleType {
    match datatype {
        DT_UINT8 => SampleType::U8,
        DT_INT16 => SampleType::I16,
        DT_UINT16 => SampleType::U16,
        _ => SampleType::F32,
    }
}

/// `[X, Y, Z, C]` view of a decoded array.
fn as_channels(array: ArrayD<f32>) -> anyhow::Result<Array4<f32>> {
    match array.ndim() {
        3 => {
            let a = array.into_dimensionality::<Ix3>()?;
            Ok(a.insert_axis(ndarray::Axis(3)))
        }
        4 => Ok(array.into_dimensionality::<Ix4>()?),
        // ImageJ hyperstacks keep channels in the fifth dimension with a unit time axis.
        5 if array.shape()[3] == 1 => Ok(array.into_dimensionality::<Ix5>()?.index_axis_move(ndarray::Axis(3), 0)),
        n => bail!("unsupported NIfTI dimensionality {n}"),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiVolumeLoader;

impl NiftiVolumeLoader {
    fn read<B: Backend>(&self, path: &Path, device: &B::Device) -> anyhow::Result<Volume<B>> {
        let object = ReaderOptions::new()
            .read_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let header = object.header().clone();
        let calibration = Calibration::new(
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        )?;
        let sample_type = sample_type_of(header.datatype);

        let array = object
            .into_volume()
            .into_ndarray::<f32>()
            .context("failed to decode voxel data")?;
        let array = as_channels(array)?;
        let (nx, ny, nz, nc) = array.dim();
        if nx * ny * nz * nc == 0 {
            bail!("volume has an empty axis: {:?}", array.dim());
        }

        let channels = (0..nc)
            .map(|c| {
                let mut values = Vec::with_capacity(nx * ny * nz);
                for z in 0..nz {
                    for y in 0..ny {
                        for x in 0..nx {
                            values.push(array[[x, y, z, c]]);
                        }
                    }
                }
                Image::from_vec(values, [nz, ny, nx], calibration.spacing(), device)
            })
            .collect();
        tracing::debug!(
            path = %path.display(),
            size = ?[nx, ny, nz],
            channels = nc,
            calibration = ?calibration.spacing(),
            ?sample_type,
            "Loaded NIfTI volume"
        );
        Ok(Volume::new(channels, sample_type)?)
    }
}

impl<B: Backend> VolumeLoader<B> for NiftiVolumeLoader {
    fn load(&self, path: &Path, device: &B::Device) -> Result<Volume<B>> {
        self.read(path, device).map_err(|e| VolumeError::Decode(format!("{e:#}")))
    }
}

/// Writes `[X, Y, Z, C]` float volumes with the calibration as pixel size.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiVolumeWriter;

impl NiftiVolumeWriter {
    fn write<B: Backend>(&self, volume: &Volume<B>, path: &Path) -> anyhow::Result<()> {
        let [nz, ny, nx] = volume.shape();
        let nc = volume.num_channels();
        let channels: Vec<Vec<f32>> = volume.channels().iter().map(|c| c.to_vec()).collect();
        let array = Array4::from_shape_fn((nx, ny, nz, nc), |(x, y, z, c)| channels[c][(z * ny + y) * nx + x]);

        let calibration = volume.calibration();
        let mut pixdim = [1.0f32; 8];
        pixdim[1] = calibration.x() as f32;
        pixdim[2] = calibration.y() as f32;
        pixdim[3] = calibration.z() as f32;
        let header = NiftiHeader {
            pixdim,
            xyzt_units: NIFTI_UNITS_MICRON,
            ..NiftiHeader::default()
        };

        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&array)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), size = ?[nx, ny, nz], channels = nc, "Wrote NIfTI volume");
        Ok(())
    }
}

impl<B: Backend> VolumeWriter<B> for NiftiVolumeWriter {
    fn extension(&self) -> &str {
        "nii"
    }

    fn save(&self, volume: &Volume<B>, path: &Path) -> Result<()> {
        self.write(volume, path).map_err(|e| VolumeError::Encode(format!("{e:#}")))
    }
}
