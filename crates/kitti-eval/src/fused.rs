//! Thresholded statistics accumulated per partition.
//!
//! Buckets are plain sums, so filling them partition by partition gives the
//! same table as one pass over the whole dataset.

use ndarray::{s, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::filter::PreparedSample;
use crate::matching::{compute_statistics, MatchMode, MatchStats};
use crate::types::Metric;

/// Accumulated counts for one score threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PrBucket {
    pub true_pos: usize,
    pub false_pos: usize,
    pub false_neg: usize,
    pub similarity: f64,
}

impl PrBucket {
    pub fn add(&mut self, stats: &MatchStats) {
        self.true_pos += stats.true_pos;
        self.false_pos += stats.false_pos;
        self.false_neg += stats.false_neg;
        if let Some(sim) = stats.similarity {
            self.similarity += sim;
        }
    }
}

/// Run the thresholded matcher on every sample of one partition for every
/// threshold, adding the results into `buckets[threshold index]`.
///
/// `overlaps` is the partition's `[Σ gt, Σ dt]` matrix; `gt_counts` and
/// `dt_counts` give the per-sample block sizes, in the same order as `samples`.
///
/// Thresholds are processed in parallel. Each bucket is owned by one task and
/// receives its samples in dataset order, so similarity sums do not depend on
/// scheduling.
#[allow(clippy::too_many_arguments)]
pub fn fused_compute_statistics(
    overlaps: ArrayView2<'_, f64>,
    gt_counts: &[usize],
    dt_counts: &[usize],
    samples: &[PreparedSample],
    metric: Metric,
    min_overlap: f64,
    thresholds: &[f64],
    buckets: &mut [PrBucket],
    compute_aos: bool,
) -> Result<()> {
    if buckets.len() != thresholds.len() {
        return Err(EvalError::invalid(format!(
            "{} buckets for {} thresholds",
            buckets.len(),
            thresholds.len()
        )));
    }
    if gt_counts.len() != samples.len() || dt_counts.len() != samples.len() {
        return Err(EvalError::invalid(format!(
            "partition has {} samples but {} gt counts and {} dt counts",
            samples.len(),
            gt_counts.len(),
            dt_counts.len()
        )));
    }
    let (rows, cols) = overlaps.dim();
    let (total_gt, total_dt) = (gt_counts.iter().sum::<usize>(), dt_counts.iter().sum::<usize>());
    if (rows, cols) != (total_gt, total_dt) {
        return Err(EvalError::invalid(format!(
            "partition overlap is {rows}x{cols} but samples hold {total_gt} gt and {total_dt} dt"
        )));
    }

    let mut blocks = Vec::with_capacity(samples.len());
    let (mut row, mut col) = (0, 0);
    for (&g, &d) in gt_counts.iter().zip(dt_counts) {
        blocks.push(overlaps.slice(s![row..row + g, col..col + d]));
        row += g;
        col += d;
    }

    buckets
        .par_iter_mut()
        .zip(thresholds.par_iter())
        .try_for_each(|(bucket, &score_threshold)| {
            let mode = MatchMode::Thresholded { score_threshold };
            for (block, sample) in blocks.iter().zip(samples) {
                let stats = compute_statistics(
                    block.view(),
                    sample,
                    metric,
                    min_overlap,
                    mode,
                    compute_aos,
                )?;
                bucket.add(&stats);
            }
            Ok(())
        })
}
