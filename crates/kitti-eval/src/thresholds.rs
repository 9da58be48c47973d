//! Score thresholds spaced at uniform recall steps.

use log::debug;

/// Pick score thresholds from the pooled true-positive scores so that
/// consecutive thresholds are about `1 / (num_sample_pts - 1)` recall apart.
///
/// Returns a non-increasing list of at most `num_sample_pts` scores, each taken
/// from `scores`.
pub fn sample_thresholds(scores: &[f64], num_gt: usize, num_sample_pts: usize) -> Vec<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let num_gt = num_gt as f64;
    let step = 1.0 / (num_sample_pts as f64 - 1.0);
    let last = sorted.len().saturating_sub(1);
    let mut current_recall = 0.0;
    let mut thresholds = Vec::with_capacity(num_sample_pts);

    for (i, &score) in sorted.iter().enumerate() {
        let l_recall = (i + 1) as f64 / num_gt;
        let r_recall = if i < last {
            (i + 2) as f64 / num_gt
        } else {
            l_recall
        };
        if r_recall - current_recall < current_recall - l_recall && i < last {
            continue;
        }
        thresholds.push(score);
        current_recall += step;
    }

    debug!(
        "sampled {} thresholds from {} true positives ({} valid gt)",
        thresholds.len(),
        sorted.len(),
        num_gt
    );
    thresholds
}
