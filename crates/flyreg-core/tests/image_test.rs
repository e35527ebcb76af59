use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use flyreg_core::image::{Image, SampleType, Volume};
use flyreg_core::spatial::rotation::rotation_from_euler_degrees;
use flyreg_core::spatial::{Point, Spacing};

type B = NdArray<f32>;

#[test]
fn test_rotated_image_transform() {
    let device = Default::default();
    let data = Tensor::<B, 3>::zeros([4, 4, 4], &device);
    let origin = Point::<3>::new(10.0, 20.0, 30.0);
    let spacing = Spacing::<3>::new(1.0, 2.0, 3.0);
    // 90 degrees about z: index x runs along +y, index y along -x.
    let direction = rotation_from_euler_degrees([90.0, 0.0, 0.0]);
    let image = Image::new(data, origin, spacing, direction);

    let p = image.transform_continuous_index_to_physical_point(&Point::<3>::new(1.0, 1.0, 1.0));
    assert!((p.x - 8.0).abs() < 1e-9);
    assert!((p.y - 21.0).abs() < 1e-9);
    assert!((p.z - 33.0).abs() < 1e-9);

    let index = image.transform_physical_point_to_continuous_index(&p);
    assert!((index - Point::<3>::new(1.0, 1.0, 1.0)).norm() < 1e-9);
}

#[test]
fn test_voxel_center_uses_zyx_storage_order() {
    let device = Default::default();
    let image = Image::<B, 3>::from_vec(vec![0.0; 24], [2, 3, 4], Spacing::<3>::new(0.5, 1.0, 4.0), &device);
    assert_eq!(image.shape(), [2, 3, 4]);

    let p = image.voxel_center(1, 2, 3);
    assert_eq!(p, Point::<3>::new(1.5, 2.0, 4.0));
}

#[test]
fn test_volume_stacks_channels_first() {
    let device = Default::default();
    let spacing = Spacing::<3>::new(0.7, 0.7, 1.2);
    let channels = (0..3)
        .map(|c| Image::<B, 3>::from_vec(vec![c as f32; 8], [2, 2, 2], spacing, &device))
        .collect();
    let volume = Volume::new(channels, SampleType::U8).unwrap();

    assert_eq!(volume.num_channels(), 3);
    assert_eq!(volume.calibration().z(), 1.2);
    let stack = volume.stack();
    assert_eq!(stack.dims(), [3, 2, 2, 2]);
    let values: Vec<f32> = stack.to_data().iter::<f32>().collect();
    assert_eq!(values[8..16], [1.0; 8]);
}
