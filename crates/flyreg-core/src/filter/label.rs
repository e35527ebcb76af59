//! Connected-component labeling of binary volumes.

use std::collections::VecDeque;

/// Indices of the up to six face neighbours of `index` in a `[Z, Y, X]` grid.
pub fn face_neighbors(index: usize, shape: [usize; 3]) -> impl Iterator<Item = usize> {
    let [nz, ny, nx] = shape;
    let plane = ny * nx;
    let z = index / plane;
    let y = (index % plane) / nx;
    let x = index % nx;
    [
        (x > 0).then(|| index - 1),
        (x + 1 < nx).then(|| index + 1),
        (y > 0).then(|| index - nx),
        (y + 1 < ny).then(|| index + nx),
        (z > 0).then(|| index - plane),
        (z + 1 < nz).then(|| index + plane),
    ]
    .into_iter()
    .flatten()
}

/// Result of labeling a binary volume.
///
/// Label `0` is background; components are numbered from 1 in raster order
/// of their first voxel.
#[derive(Debug, Clone)]
pub struct Components {
    labels: Vec<u32>,
    shape: [usize; 3],
    sizes: Vec<usize>,
}

impl Components {
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Voxel count of component `label` (1-based).
    pub fn size(&self, label: u32) -> usize {
        label
            .checked_sub(1)
            .and_then(|i| self.sizes.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn label_at(&self, z: usize, y: usize, x: usize) -> u32 {
        let [_, ny, nx] = self.shape;
        self.labels[(z * ny + y) * nx + x]
    }

    /// Mean voxel index `(x, y, z)` of component `label`.
    pub fn centroid(&self, label: u32) -> Option<[f64; 3]> {
        let [_, ny, nx] = self.shape;
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for (i, l) in self.labels.iter().enumerate() {
            if *l == label {
                sum[0] += (i % nx) as u64;
                sum[1] += ((i / nx) % ny) as u64;
                sum[2] += (i / (nx * ny)) as u64;
                count += 1;
            }
        }
        (count > 0).then(|| sum.map(|s| s as f64 / count as f64))
    }

    /// Binary mask of a single component.
    pub fn mask_of(&self, label: u32) -> Vec<bool> {
        self.labels.iter().map(|l| *l == label).collect()
    }
}

/// Labels 6-connected foreground components.
pub fn label_components(mask: &[bool], shape: [usize; 3]) -> Components {
    let mut labels = vec![0u32; mask.len()];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..mask.len() {
        if !mask[seed] || labels[seed] != 0 {
            continue;
        }
        let label = sizes.len() as u32 + 1;
        let mut size = 0;
        labels[seed] = label;
        queue.push_back(seed);
        while let Some(index) = queue.pop_front() {
            size += 1;
            for n in face_neighbors(index, shape) {
                if mask[n] && labels[n] == 0 {
                    labels[n] = label;
                    queue.push_back(n);
                }
            }
        }
        sizes.push(size);
    }

    Components {
        labels,
        shape,
        sizes,
    }
}
