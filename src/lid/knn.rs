//! Brute-force k-nearest-neighbor distances.
//!
//! `exact_lid` works on an in-memory row buffer (samples, benches);
//! `exact_lid_mapped` reads rows straight from a memory-mapped file so the
//! full dataset is never decoded into memory at once.

use rayon::prelude::*;

use crate::adapters::squared_l2;
use crate::codec::MappedDataset;
use crate::lid::mle::mle_lid;

/// The `k` smallest squared distances offered so far, ascending.
#[derive(Debug, Clone)]
struct Nearest {
    k: usize,
    squared: Vec<f32>,
}

impl Nearest {
    fn new(k: usize) -> Self {
        Self {
            k,
            squared: Vec::with_capacity(k + 1),
        }
    }

    fn clear(&mut self) {
        self.squared.clear();
    }

    fn offer(&mut self, d: f32) {
        if self.k == 0 {
            return;
        }
        if self.squared.len() == self.k {
            match self.squared.last() {
                Some(&worst) if d.total_cmp(&worst).is_lt() => {
                    self.squared.pop();
                }
                _ => return,
            }
        }
        let pos = self.squared.partition_point(|v| v.total_cmp(&d).is_le());
        self.squared.insert(pos, d);
    }

    fn distances(&self) -> Vec<f32> {
        self.squared.iter().map(|d| d.sqrt()).collect()
    }
}

/// Ascending Euclidean distances from row `index` to its `k` nearest rows.
///
/// The point itself is excluded by index, so exact duplicates of it still
/// count as neighbors at distance zero. `scratch` is reused between calls.
pub fn knn_distances(
    data: &[f32],
    dimension: usize,
    index: usize,
    k: usize,
    scratch: &mut Vec<f32>,
) -> Vec<f32> {
    let query = &data[index * dimension..(index + 1) * dimension];

    scratch.clear();
    scratch.extend(
        data.chunks_exact(dimension)
            .enumerate()
            .filter(|&(j, _)| j != index)
            .map(|(_, row)| squared_l2(query, row)),
    );

    let k = k.min(scratch.len());
    if k == 0 {
        return Vec::new();
    }
    if k < scratch.len() {
        scratch.select_nth_unstable_by(k - 1, f32::total_cmp);
    }

    let mut nearest: Vec<f32> = scratch[..k].iter().map(|d| d.sqrt()).collect();
    nearest.sort_unstable_by(f32::total_cmp);
    nearest
}

/// Clipped MLE LID for every row of `data`, in row order.
///
/// Runs on the current rayon pool; each worker keeps its own scratch buffer
/// and reads the shared rows without synchronization.
pub fn exact_lid(data: &[f32], dimension: usize, k: usize) -> Vec<f32> {
    let num_points = data.len() / dimension;
    (0..num_points)
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(num_points),
            |scratch, i| mle_lid(&knn_distances(data, dimension, i, k, scratch)),
        )
        .collect()
}

/// Clipped MLE LID for every row of a mapped Float32 dataset, in row order.
///
/// Each worker decodes one query row and then one candidate row at a time
/// from the map, so memory stays at O(threads x dimension) whatever N is.
/// Runtime is O(N^2 x D).
pub fn exact_lid_mapped(data: &MappedDataset<f32>, k: usize) -> Vec<f32> {
    let num_points = data.len();
    let dimension = data.dimension();
    (0..num_points)
        .into_par_iter()
        .map_init(
            || (vec![0.0f32; dimension], vec![0.0f32; dimension], Nearest::new(k)),
            |(query, row, nearest), i| {
                data.row_into(i, query);
                nearest.clear();
                for j in (0..num_points).filter(|&j| j != i) {
                    data.row_into(j, row);
                    nearest.offer(squared_l2(query, row));
                }
                mle_lid(&nearest.distances())
            },
        )
        .collect()
}
