use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use flyreg_core::image::Image;
use flyreg_core::spatial::rotation::rotation_from_euler_degrees;
use flyreg_core::spatial::{Direction, Point, Spacing};
use proptest::prelude::*;

type Backend = NdArray<f32>;
const D: usize = 3;

fn image_with(origin: [f64; 3], spacing: [f64; 3], angles: [f64; 3]) -> Image<Backend, D> {
    let device = Default::default();
    let data = Tensor::<Backend, D>::zeros([2, 2, 2], &device);
    let direction: Direction<D> = rotation_from_euler_degrees(angles);
    Image::new(
        data,
        Point::<D>::from(origin),
        Spacing::<D>::from(spacing),
        direction,
    )
}

proptest! {
    #[test]
    fn test_coordinate_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        yaw in -180.0f64..180.0, pitch in -89.0f64..89.0, roll in -180.0f64..180.0,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0
    ) {
        let image = image_with([ox, oy, oz], [sx, sy, sz], [yaw, pitch, roll]);
        let point = Point::<D>::new(px, py, pz);

        let index = image.transform_physical_point_to_continuous_index(&point);
        let recovered = image.transform_continuous_index_to_physical_point(&index);

        for i in 0..D {
            prop_assert!((point[i] - recovered[i]).abs() < 1e-6, "axis {}: {} vs {}", i, point[i], recovered[i]);
        }
    }

    #[test]
    fn test_tensor_batch_consistency(
        ox in -10.0f64..10.0,
        sx in 0.5f64..2.0,
        yaw in -90.0f64..90.0,
        px in -10.0f64..10.0, py in -10.0f64..10.0, pz in -10.0f64..10.0
    ) {
        let image = image_with([ox, -ox, 0.5 * ox], [sx, 2.0 * sx, 0.5 * sx], [yaw, 0.0, 0.0]);
        let index = image.transform_physical_point_to_continuous_index(&Point::<D>::new(px, py, pz));

        let device = Default::default();
        let points = Tensor::<Backend, 2>::from_floats([[px as f32, py as f32, pz as f32]], &device);
        let indices = image.world_to_index_tensor(points.clone()).into_data();
        let indices = indices.as_slice::<f32>().unwrap();
        for i in 0..D {
            prop_assert!((indices[i] - index[i] as f32).abs() < 1e-3);
        }

        let back = image.index_to_world_tensor(image.world_to_index_tensor(points)).into_data();
        let back = back.as_slice::<f32>().unwrap();
        prop_assert!((back[0] - px as f32).abs() < 1e-3);
        prop_assert!((back[1] - py as f32).abs() < 1e-3);
        prop_assert!((back[2] - pz as f32).abs() < 1e-3);
    }
}
