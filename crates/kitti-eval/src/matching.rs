//! Greedy assignment of detections to ground truth within one sample.

use ndarray::ArrayView2;

use crate::error::{EvalError, Result};
use crate::filter::PreparedSample;
use crate::overlap::image_box_overlap;
use crate::types::{Criterion, IgnoreLabel, Metric};

/// How detections are picked for each ground truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchMode {
    /// Unthresholded pass: pick the highest-scoring overlapping detection and
    /// report matched scores. No false positives are counted.
    Harvest,
    /// Thresholded pass: detections scoring below `score_threshold` are
    /// invisible; pick the highest-overlap valid detection and count false
    /// positives.
    Thresholded { score_threshold: f64 },
}

/// Counts for one sample under one threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStats {
    pub true_pos: usize,
    pub false_pos: usize,
    pub false_neg: usize,
    /// Sum of `(1 + cos(gt_alpha - dt_alpha)) / 2` over true positives.
    /// `None` when not requested or when there are no true or false positives.
    pub similarity: Option<f64>,
    /// Scores of the detections counted as true positives, in ground-truth order.
    pub tp_scores: Vec<f64>,
}

fn check_shapes(overlaps: &ArrayView2<'_, f64>, sample: &PreparedSample) -> Result<()> {
    let (rows, cols) = overlaps.dim();
    if rows != sample.gt.len()
        || cols != sample.dt.len()
        || sample.ignored_gt.len() != sample.gt.len()
        || sample.ignored_dt.len() != sample.dt.len()
    {
        return Err(EvalError::invalid(format!(
            "overlap block is {rows}x{cols} but sample has {} gt / {} labels and {} dt / {} labels",
            sample.gt.len(),
            sample.ignored_gt.len(),
            sample.dt.len(),
            sample.ignored_dt.len()
        )));
    }
    Ok(())
}

/// Match one sample's detections against its ground truth.
///
/// `overlaps` is `[num_gt, num_dt]`. Ground-truth and detection order must
/// follow the source files: ties in [`MatchMode::Harvest`] go to the first
/// detection encountered.
pub fn compute_statistics(
    overlaps: ArrayView2<'_, f64>,
    sample: &PreparedSample,
    metric: Metric,
    min_overlap: f64,
    mode: MatchMode,
    compute_aos: bool,
) -> Result<MatchStats> {
    check_shapes(&overlaps, sample)?;
    let PreparedSample {
        gt,
        dt,
        ignored_gt,
        ignored_dt,
        dont_cares,
    } = sample;

    let below_threshold: Vec<bool> = match mode {
        MatchMode::Harvest => vec![false; dt.len()],
        MatchMode::Thresholded { score_threshold } => {
            dt.iter().map(|d| d.score < score_threshold).collect()
        }
    };
    let mut assigned = vec![false; dt.len()];
    let mut stats = MatchStats::default();
    let mut deltas = Vec::new();

    for (i, g) in gt.iter().enumerate() {
        if ignored_gt[i] == IgnoreLabel::Unknown {
            continue;
        }
        let mut det_idx: Option<usize> = None;
        let mut best_score = f64::NEG_INFINITY;
        let mut max_overlap = 0.0;
        let mut via_ignored = false;

        for (j, d) in dt.iter().enumerate() {
            if ignored_dt[j] == IgnoreLabel::Unknown || assigned[j] || below_threshold[j] {
                continue;
            }
            let overlap = overlaps[[i, j]];
            if !(overlap > min_overlap) {
                continue;
            }
            match mode {
                MatchMode::Harvest => {
                    if d.score > best_score {
                        det_idx = Some(j);
                        best_score = d.score;
                    }
                }
                MatchMode::Thresholded { .. } => {
                    if ignored_dt[j] == IgnoreLabel::Valid && (overlap > max_overlap || via_ignored)
                    {
                        max_overlap = overlap;
                        det_idx = Some(j);
                        via_ignored = false;
                    } else if det_idx.is_none() && ignored_dt[j] == IgnoreLabel::Ignored {
                        det_idx = Some(j);
                        via_ignored = true;
                    }
                }
            }
        }

        match det_idx {
            None => {
                if ignored_gt[i] == IgnoreLabel::Valid {
                    stats.false_neg += 1;
                }
            }
            Some(j)
                if ignored_gt[i] == IgnoreLabel::Ignored
                    || ignored_dt[j] == IgnoreLabel::Ignored =>
            {
                assigned[j] = true;
            }
            Some(j) => {
                stats.true_pos += 1;
                stats.tp_scores.push(dt[j].score);
                if compute_aos {
                    deltas.push(g.alpha - dt[j].alpha);
                }
                assigned[j] = true;
            }
        }
    }

    if let MatchMode::Thresholded { .. } = mode {
        let unmatched = |j: usize, assigned: &[bool]| {
            !assigned[j] && ignored_dt[j] == IgnoreLabel::Valid && !below_threshold[j]
        };
        stats.false_pos = (0..dt.len()).filter(|&j| unmatched(j, &assigned)).count();

        // Unmatched detections inside unlabeled regions are not penalised.
        if metric == Metric::Bbox && !dont_cares.is_empty() {
            let dt_boxes: Vec<[f64; 4]> = dt.iter().map(|d| d.bbox).collect();
            let overlaps_dc = image_box_overlap(&dt_boxes, dont_cares, Criterion::OverA);
            let mut suppressed = 0;
            for j in 0..dt.len() {
                for k in 0..dont_cares.len() {
                    if unmatched(j, &assigned) && overlaps_dc[[j, k]] > min_overlap {
                        assigned[j] = true;
                        suppressed += 1;
                    }
                }
            }
            stats.false_pos -= suppressed;
        }

        if compute_aos && (stats.true_pos > 0 || stats.false_pos > 0) {
            stats.similarity = Some(deltas.iter().map(|delta| (1.0 + delta.cos()) / 2.0).sum());
        }
    }

    Ok(stats)
}
