//! Query and ground-truth generation from canonical base files.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use rayon::prelude::*;
use tracing::info;

use crate::codec::{DatasetHeader, VectorReader, VectorWriter, read_header};
use crate::error::{PipelineError, PipelineResult};

/// Copies the first `count` rows of `base` into a query file.
pub fn extract_queries(
    base: &Path,
    dst: &Path,
    count: usize,
    block_rows: usize,
) -> PipelineResult<DatasetHeader> {
    let mut reader = VectorReader::<f32>::open(base, block_rows)?;
    let source = reader.header();
    if count > source.num_points {
        return Err(PipelineError::InsufficientData {
            path: base.to_path_buf(),
            required: count,
            available: source.num_points,
        });
    }

    let header = DatasetHeader::new(count, source.dimension)?;
    let mut writer = VectorWriter::<f32>::create(dst, header)?;
    let step = reader.block_rows();
    let mut done = 0;
    while done < count {
        let take = step.min(count - done);
        writer.write_block(&reader.read_range(done, take)?)?;
        done += take;
    }
    writer.finish()?;

    info!(
        "Extracted {count} queries from {} -> {}",
        base.display(),
        dst.display()
    );
    Ok(header)
}

/// One neighbor candidate; ordered by distance, then id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f32,
    id: u32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Computes exact top-`k` L2 neighbors of every query over `base`.
///
/// Base rows are streamed in blocks, so memory stays at one block plus
/// `queries x k` heap entries. Output is a UInt32 file of shape (Q, k),
/// each row sorted nearest first.
pub fn compute_ground_truth(
    base: &Path,
    queries: &Path,
    dst: &Path,
    k: usize,
    block_rows: usize,
) -> PipelineResult<DatasetHeader> {
    let query_header = read_header(queries)?;
    let mut base_reader = VectorReader::<f32>::open(base, block_rows)?;
    let base_header = base_reader.header();

    if query_header.dimension != base_header.dimension {
        return Err(PipelineError::CorruptDataset {
            path: queries.to_path_buf(),
            reason: "query dimension differs from base dimension".to_string(),
            expected: base_header.dimension as u64,
            actual: query_header.dimension as u64,
        });
    }
    if k == 0 || base_header.num_points < k {
        return Err(PipelineError::InsufficientData {
            path: base.to_path_buf(),
            required: k.max(1),
            available: base_header.num_points,
        });
    }

    let dim = query_header.dimension;
    let query_values = VectorReader::<f32>::open(queries, block_rows)?.read_all()?;
    let mut heaps: Vec<BinaryHeap<Candidate>> = (0..query_header.num_points)
        .map(|_| BinaryHeap::with_capacity(k + 1))
        .collect();

    for block in base_reader.blocks()? {
        let block = block?;
        heaps
            .par_iter_mut()
            .zip(query_values.par_chunks_exact(dim))
            .for_each(|(heap, query)| {
                for (offset, row) in block.iter_rows().enumerate() {
                    let candidate = Candidate {
                        dist: squared_l2(query, row),
                        id: (block.start_row + offset) as u32,
                    };
                    if heap.len() < k {
                        heap.push(candidate);
                    } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                        heap.pop();
                        heap.push(candidate);
                    }
                }
            });
    }

    let header = DatasetHeader::new(query_header.num_points, k)?;
    let mut writer = VectorWriter::<u32>::create(dst, header)?;
    let mut ids = Vec::with_capacity(header.num_points * k);
    for heap in heaps {
        ids.extend(heap.into_sorted_vec().into_iter().map(|c| c.id));
    }
    writer.write_block(&ids)?;
    writer.finish()?;

    info!(
        "Ground truth for {} queries (top-{k}) over {} base points -> {}",
        header.num_points,
        base_header.num_points,
        dst.display()
    );
    Ok(header)
}
