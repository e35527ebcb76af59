//! Marker-controlled watershed by priority flooding.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::label::face_neighbors;

struct Front {
    priority: f64,
    order: u64,
    index: usize,
    label: u32,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    // Highest priority first, then first-come first-served.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Grows `markers` over `mask`, always extending the frontier voxel with the
/// highest `priority` first.
///
/// Voxels with a non-zero marker keep their label. Foreground voxels not
/// reachable from any marker stay 0, as does everything outside `mask`.
/// Ties are broken by insertion order, so the result is deterministic.
pub fn marker_watershed(priority: &[f64], mask: &[bool], markers: &[u32], shape: [usize; 3]) -> Vec<u32> {
    let mut labels: Vec<u32> = markers
        .iter()
        .zip(mask)
        .map(|(m, inside)| if *inside { *m } else { 0 })
        .collect();
    let mut heap = BinaryHeap::new();
    let mut order = 0u64;

    for index in 0..labels.len() {
        let label = labels[index];
        if label == 0 {
            continue;
        }
        for n in face_neighbors(index, shape) {
            if mask[n] && labels[n] == 0 {
                heap.push(Front {
                    priority: priority[n],
                    order,
                    index: n,
                    label,
                });
                order += 1;
            }
        }
    }

    while let Some(front) = heap.pop() {
        if labels[front.index] != 0 {
            continue;
        }
        labels[front.index] = front.label;
        for n in face_neighbors(front.index, shape) {
            if mask[n] && labels[n] == 0 {
                heap.push(Front {
                    priority: priority[n],
                    order,
                    index: n,
                    label: front.label,
                });
                order += 1;
            }
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_a_dumbbell_at_its_neck() {
        // Row of 9 voxels, priority is a distance map with a dip at x = 4.
        let shape = [1, 1, 9];
        let priority = [1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0];
        let mask = [true; 9];
        let mut markers = [0u32; 9];
        markers[2] = 1;
        markers[6] = 2;
        let labels = marker_watershed(&priority, &mask, &markers, shape);
        assert_eq!(&labels[..4], &[1, 1, 1, 1]);
        assert_eq!(&labels[5..], &[2, 2, 2, 2]);
        assert!(labels[4] == 1 || labels[4] == 2);
    }

    #[test]
    fn background_and_unreachable_stay_unlabeled() {
        let shape = [1, 1, 5];
        let priority = [0.0; 5];
        let mask = [true, true, false, true, true];
        let markers = [1, 0, 0, 0, 0];
        let labels = marker_watershed(&priority, &mask, &markers, shape);
        assert_eq!(labels, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn result_is_deterministic() {
        let shape = [2, 3, 4];
        let priority: Vec<f64> = (0..24).map(|i| ((i * 7) % 5) as f64).collect();
        let mask = vec![true; 24];
        let mut markers = vec![0u32; 24];
        markers[0] = 1;
        markers[23] = 2;
        let a = marker_watershed(&priority, &mask, &markers, shape);
        let b = marker_watershed(&priority, &mask, &markers, shape);
        assert_eq!(a, b);
        assert!(a.iter().all(|l| *l == 1 || *l == 2));
    }
}
