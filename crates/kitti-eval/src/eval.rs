//! Evaluation engine: per (class, difficulty, overlap setting) precision /
//! recall curves and their AP reductions, for bbox, bev, 3d and orientation.

use log::{debug, info};
use ndarray::{s, Array3, Array4, ArrayView1, ArrayViewMut1, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::filter::{prepare_data, PreparedData};
use crate::fused::{fused_compute_statistics, PrBucket};
use crate::matching::{compute_statistics, MatchMode};
use crate::overlap::{GeoIntersector, PartitionedOverlaps, PolygonIntersector};
use crate::params::Params;
use crate::thresholds::sample_thresholds;
use crate::types::{Frame, Metric};

/// Alpha value marking "no observation angle" in result files.
const NO_ALPHA: f64 = -10.0;

/// Sampled thresholds and the statistics accumulated for each of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrTable {
    pub thresholds: Vec<f64>,
    pub buckets: Vec<PrBucket>,
}

/// Curves shaped `[class][difficulty][overlap setting][sample point]`.
///
/// Points past the number of sampled thresholds stay at zero. Degenerate
/// divisions (no valid ground truth, no detections) leave NaN in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curves {
    pub recall: Array4<f64>,
    pub precision: Array4<f64>,
    pub orientation: Array4<f64>,
}

/// AP values shaped `[class][difficulty][overlap setting]`, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApResult {
    pub ap: Array3<f64>,
    pub ap_r40: Array3<f64>,
}

impl ApResult {
    fn from_curve(curve: &Array4<f64>) -> Self {
        ApResult {
            ap: curve.map_axis(Axis(3), get_map),
            ap_r40: curve.map_axis(Axis(3), get_map_r40),
        }
    }
}

/// AP and curves for one overlap metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    #[serde(flatten)]
    pub ap: ApResult,
    pub curves: Curves,
}

/// Everything a report needs: evaluated classes, difficulties, thresholds
/// and per-metric results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub class_ids: Vec<usize>,
    pub class_names: Vec<String>,
    pub difficulties: Vec<usize>,
    /// Minimum overlaps actually used, `[setting][metric][class]`.
    pub min_overlaps: Array3<f64>,
    pub bbox: MetricResult,
    pub bev: MetricResult,
    pub three_d: MetricResult,
    /// Average orientation similarity, present when alphas were evaluated.
    pub aos: Option<ApResult>,
}

/// 11-point interpolated AP: precision at every 4th sample point.
pub fn get_map(prec: ArrayView1<'_, f64>) -> f64 {
    let sum: f64 = prec.iter().step_by(4).sum();
    sum / 11.0 * 100.0
}

/// 40-point AP: precision at sample points 1.., skipping the first.
pub fn get_map_r40(prec: ArrayView1<'_, f64>) -> f64 {
    let sum: f64 = prec.iter().skip(1).sum();
    sum / 40.0 * 100.0
}

/// Replace each value with the maximum of itself and everything after it.
/// NaN anywhere in the suffix makes the value NaN.
pub fn envelope(mut values: ArrayViewMut1<'_, f64>) {
    let mut running = f64::NEG_INFINITY;
    for v in values.iter_mut().rev() {
        running = if v.is_nan() || running.is_nan() {
            f64::NAN
        } else {
            running.max(*v)
        };
        *v = running;
    }
}

/// Whether the detections carry observation angles: decided by the first
/// detection of the first non-empty frame.
pub fn alphas_available(dt: &[Frame]) -> bool {
    dt.iter()
        .find(|f| !f.is_empty())
        .is_some_and(|f| f.objects[0].alpha != NO_ALPHA)
}

/// Evaluator over a ground-truth and a detection dataset of equal length.
pub struct KittiEval {
    gt: Vec<Frame>,
    dt: Vec<Frame>,
    pub params: Params,
    intersector: Box<dyn PolygonIntersector>,
}

impl KittiEval {
    pub fn new(gt: Vec<Frame>, dt: Vec<Frame>, params: Params) -> Result<Self> {
        if gt.len() != dt.len() {
            return Err(EvalError::invalid(format!(
                "ground truth has {} samples but detections have {}",
                gt.len(),
                dt.len()
            )));
        }
        params.validate()?;
        Ok(KittiEval {
            gt,
            dt,
            params,
            intersector: Box::new(GeoIntersector),
        })
    }

    /// Use a different rotated-rectangle overlap engine for bev and 3d.
    pub fn with_intersector(mut self, intersector: impl PolygonIntersector + 'static) -> Self {
        self.intersector = Box::new(intersector);
        self
    }

    pub fn num_samples(&self) -> usize {
        self.gt.len()
    }

    pub fn compute_aos(&self) -> bool {
        self.params
            .compute_aos
            .unwrap_or_else(|| alphas_available(&self.dt))
    }

    /// Overlap matrices of the whole dataset for one metric, batched per the
    /// configured partitioning.
    pub fn overlaps(&self, metric: Metric) -> Result<PartitionedOverlaps> {
        let plan = self.params.partition_plan(self.gt.len())?;
        PartitionedOverlaps::compute(&self.gt, &self.dt, metric, plan, self.intersector.as_ref())
    }

    /// Filtered per-sample arrays for one class id and difficulty.
    pub fn prepare(&self, class_id: usize, difficulty: usize) -> Result<PreparedData> {
        prepare_data(&self.gt, &self.dt, &self.params.tables, class_id, difficulty)
    }

    /// Two-pass statistics for one (class, difficulty, min overlap) triple:
    /// harvest true-positive scores without thresholds, sample thresholds from
    /// them, then accumulate thresholded counts partition by partition.
    pub fn pr_table(
        &self,
        overlaps: &PartitionedOverlaps,
        data: &PreparedData,
        metric: Metric,
        min_overlap: f64,
        compute_aos: bool,
    ) -> Result<PrTable> {
        if overlaps.num_samples() != data.samples.len() {
            return Err(EvalError::invalid(format!(
                "{} overlap blocks for {} prepared samples",
                overlaps.num_samples(),
                data.samples.len()
            )));
        }

        let harvested = data
            .samples
            .par_iter()
            .enumerate()
            .map(|(i, sample)| {
                compute_statistics(
                    overlaps.sample(i),
                    sample,
                    metric,
                    min_overlap,
                    MatchMode::Harvest,
                    false,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let scores: Vec<f64> = harvested.into_iter().flat_map(|s| s.tp_scores).collect();

        let thresholds = sample_thresholds(&scores, data.num_valid_gt, self.params.num_sample_pts);
        let mut buckets = vec![PrBucket::default(); thresholds.len()];
        for (part, range) in overlaps.plan().parts().iter().enumerate() {
            fused_compute_statistics(
                overlaps.part(part),
                &overlaps.gt_counts()[range.clone()],
                &overlaps.dt_counts()[range.clone()],
                &data.samples[range.clone()],
                metric,
                min_overlap,
                &thresholds,
                &mut buckets,
                compute_aos,
            )?;
        }
        Ok(PrTable {
            thresholds,
            buckets,
        })
    }

    /// Curves for every configured class, difficulty and overlap setting.
    pub fn eval_class(&self, metric: Metric, compute_aos: bool) -> Result<Curves> {
        let p = &self.params;
        let shape = (
            p.current_classes.len(),
            p.difficulties.len(),
            p.num_settings(),
            p.num_sample_pts,
        );
        let mut curves = Curves {
            recall: Array4::zeros(shape),
            precision: Array4::zeros(shape),
            orientation: Array4::zeros(shape),
        };

        let overlaps = self.overlaps(metric)?;
        for (m, &class_id) in p.current_classes.iter().enumerate() {
            for (l, &difficulty) in p.difficulties.iter().enumerate() {
                let data = self.prepare(class_id, difficulty)?;
                if metric == Metric::Bbox {
                    info!(
                        "valid ground truth objects of class {} in difficulty {}: {}",
                        class_id, difficulty, data.num_valid_gt
                    );
                }

                for k in 0..p.num_settings() {
                    let min_overlap = p.min_overlap(k, metric, class_id)?;
                    let table = self.pr_table(&overlaps, &data, metric, min_overlap, compute_aos)?;
                    debug!(
                        "{} class {} difficulty {} overlap {:.2}: {} thresholds",
                        metric.label(),
                        class_id,
                        difficulty,
                        min_overlap,
                        table.thresholds.len()
                    );

                    for (i, b) in table.buckets.iter().enumerate().take(p.num_sample_pts) {
                        let tp = b.true_pos as f64;
                        curves.recall[[m, l, k, i]] = tp / (tp + b.false_neg as f64);
                        curves.precision[[m, l, k, i]] = tp / (tp + b.false_pos as f64);
                        if compute_aos {
                            curves.orientation[[m, l, k, i]] =
                                b.similarity / (tp + b.false_pos as f64);
                        }
                    }
                    for curve in [
                        &mut curves.recall,
                        &mut curves.precision,
                        &mut curves.orientation,
                    ] {
                        envelope(curve.slice_mut(s![m, l, k, ..]));
                    }
                }
            }
        }
        Ok(curves)
    }

    /// Run bbox (with orientation when available), bev and 3d evaluation.
    pub fn evaluate(&self) -> Result<EvaluationResult> {
        let p = &self.params;
        let compute_aos = self.compute_aos();
        info!(
            "evaluating {} samples, classes {:?}, orientation {}",
            self.gt.len(),
            p.current_classes,
            if compute_aos { "on" } else { "off" }
        );

        let mut min_overlaps = Array3::zeros((p.num_settings(), 3, p.current_classes.len()));
        for k in 0..p.num_settings() {
            for metric in Metric::ALL {
                for (m, &class_id) in p.current_classes.iter().enumerate() {
                    min_overlaps[[k, metric.index(), m]] = p.min_overlap(k, metric, class_id)?;
                }
            }
        }

        let bbox_curves = self.eval_class(Metric::Bbox, compute_aos)?;
        let aos = compute_aos.then(|| ApResult::from_curve(&bbox_curves.orientation));
        let bbox = MetricResult {
            ap: ApResult::from_curve(&bbox_curves.precision),
            curves: bbox_curves,
        };
        let bev_curves = self.eval_class(Metric::Bev, false)?;
        let bev = MetricResult {
            ap: ApResult::from_curve(&bev_curves.precision),
            curves: bev_curves,
        };
        let d3_curves = self.eval_class(Metric::ThreeD, false)?;
        let three_d = MetricResult {
            ap: ApResult::from_curve(&d3_curves.precision),
            curves: d3_curves,
        };

        let class_names = p
            .current_classes
            .iter()
            .map(|&c| p.tables.class_name(c).unwrap_or_default().to_string())
            .collect();

        Ok(EvaluationResult {
            class_ids: p.current_classes.clone(),
            class_names,
            difficulties: p.difficulties.clone(),
            min_overlaps,
            bbox,
            bev,
            three_d,
            aos,
        })
    }
}
