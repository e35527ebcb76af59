//! Exact Euclidean distance transform.
//!
//! Separable lower-envelope algorithm of Felzenszwalb and Huttenlocher, run
//! once per axis with that axis' physical voxel size.

use rayon::prelude::*;

use crate::spatial::Spacing3;

/// Distance from every foreground voxel to the nearest background voxel.
///
/// `mask` is `[Z, Y, X]` row-major and `spacing` is `(x, y, z)`. Background
/// voxels get 0; a volume without background yields `f64::INFINITY`.
pub fn distance_transform(mask: &[bool], shape: [usize; 3], spacing: Spacing3) -> Vec<f64> {
    let [nz, ny, nx] = shape;
    let mut d: Vec<f64> = mask.iter().map(|f| if *f { f64::INFINITY } else { 0.0 }).collect();
    if d.is_empty() {
        return d;
    }

    // x: contiguous rows
    d.par_chunks_mut(nx).for_each_init(
        || Envelope::new(nx),
        |env, row| env.transform_in_place(row, spacing[0]),
    );

    // y: columns within each plane
    d.par_chunks_mut(ny * nx).for_each_init(
        || (Envelope::new(ny), vec![0.0; ny]),
        |(env, column), plane| {
            for x in 0..nx {
                for y in 0..ny {
                    column[y] = plane[y * nx + x];
                }
                env.transform_in_place(column, spacing[1]);
                for y in 0..ny {
                    plane[y * nx + x] = column[y];
                }
            }
        },
    );

    // z: gather each pillar, transform, scatter
    let plane = ny * nx;
    let pillars: Vec<Vec<f64>> = (0..plane)
        .into_par_iter()
        .map_init(
            || Envelope::new(nz),
            |env, offset| {
                let mut pillar: Vec<f64> = (0..nz).map(|z| d[z * plane + offset]).collect();
                env.transform_in_place(&mut pillar, spacing[2]);
                pillar
            },
        )
        .collect();
    for (offset, pillar) in pillars.into_iter().enumerate() {
        for (z, v) in pillar.into_iter().enumerate() {
            d[z * plane + offset] = v;
        }
    }

    d.par_iter_mut().for_each(|v| *v = v.sqrt());
    d
}

/// Scratch space for the 1D squared-distance transform.
struct Envelope {
    vertices: Vec<usize>,
    bounds: Vec<f64>,
    output: Vec<f64>,
}

impl Envelope {
    fn new(n: usize) -> Self {
        Self {
            vertices: vec![0; n],
            bounds: vec![0.0; n + 1],
            output: vec![0.0; n],
        }
    }

    /// Replaces squared distances `f` by their lower envelope of parabolas.
    fn transform_in_place(&mut self, f: &mut [f64], step: f64) {
        let n = f.len();
        let pos = |i: usize| i as f64 * step;
        let mut finite = (0..n).filter(|i| f[*i].is_finite());
        let Some(first) = finite.next() else {
            return;
        };

        let intersect = |f: &[f64], p: usize, q: usize| {
            ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
        };

        let mut k = 0;
        self.vertices[0] = first;
        self.bounds[0] = f64::NEG_INFINITY;
        self.bounds[1] = f64::INFINITY;
        for q in finite {
            let mut s = intersect(f, self.vertices[k], q);
            while s <= self.bounds[k] {
                k -= 1;
                s = intersect(f, self.vertices[k], q);
            }
            k += 1;
            self.vertices[k] = q;
            self.bounds[k] = s;
            self.bounds[k + 1] = f64::INFINITY;
        }

        k = 0;
        for q in 0..n {
            while self.bounds[k + 1] < pos(q) {
                k += 1;
            }
            let p = self.vertices[k];
            let delta = pos(q) - pos(p);
            self.output[q] = delta * delta + f[p];
        }
        f.copy_from_slice(&self.output[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn brute_force(mask: &[bool], shape: [usize; 3], spacing: Spacing3) -> Vec<f64> {
        let [nz, ny, nx] = shape;
        let coords = |i: usize| {
            [
                (i % nx) as f64 * spacing[0],
                ((i / nx) % ny) as f64 * spacing[1],
                (i / (nx * ny)) as f64 * spacing[2],
            ]
        };
        (0..nz * ny * nx)
            .map(|i| {
                if !mask[i] {
                    return 0.0;
                }
                let a = coords(i);
                (0..mask.len())
                    .filter(|j| !mask[*j])
                    .map(|j| {
                        let b = coords(j);
                        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
                    })
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    }

    #[test]
    fn single_background_voxel() {
        let shape = [3, 3, 3];
        let mut mask = vec![true; 27];
        mask[13] = false;
        let d = distance_transform(&mask, shape, Spacing3::new(1.0, 1.0, 1.0));
        assert_eq!(d[13], 0.0);
        assert!((d[0] - 3f64.sqrt()).abs() < 1e-12);
        assert!((d[12] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_background_is_infinite() {
        let d = distance_transform(&[true; 8], [2, 2, 2], Spacing3::new(1.0, 1.0, 1.0));
        assert!(d.iter().all(|v| v.is_infinite()));
    }

    proptest! {
        #[test]
        fn matches_brute_force(
            bits in proptest::collection::vec(proptest::bool::weighted(0.7), 4 * 5 * 6),
            sz in 0.5f64..3.0,
        ) {
            let shape = [4, 5, 6];
            let spacing = Spacing3::new(1.0, 0.75, sz);
            let mut mask = bits;
            mask[0] = false;
            let fast = distance_transform(&mask, shape, spacing);
            let slow = brute_force(&mask, shape, spacing);
            for (a, b) in fast.iter().zip(slow.iter()) {
                prop_assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
            }
        }
    }
}
