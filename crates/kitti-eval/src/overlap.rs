//! Overlap matrices between ground truth and detections.
//!
//! Image-plane boxes are handled here. Rotated footprints are handed to a
//! [`PolygonIntersector`]; the default one delegates to `geo`'s boolean ops.

use geo::{Area, BooleanOps, LineString, Polygon};
use log::debug;
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

use crate::error::{EvalError, Result};
use crate::partition::PartitionPlan;
use crate::types::{BoxRecord, Criterion, Frame, Metric};

/// Axis-aligned overlap of `[x1, y1, x2, y2]` boxes, `[N, K]`.
pub fn image_box_overlap(
    boxes: &[[f64; 4]],
    query_boxes: &[[f64; 4]],
    criterion: Criterion,
) -> Array2<f64> {
    let mut overlaps = Array2::<f64>::zeros((boxes.len(), query_boxes.len()));
    for (k, q) in query_boxes.iter().enumerate() {
        let q_area = (q[2] - q[0]) * (q[3] - q[1]);
        for (n, b) in boxes.iter().enumerate() {
            let iw = b[2].min(q[2]) - b[0].max(q[0]);
            if iw <= 0.0 {
                continue;
            }
            let ih = b[3].min(q[3]) - b[1].max(q[1]);
            if ih <= 0.0 {
                continue;
            }
            let b_area = (b[2] - b[0]) * (b[3] - b[1]);
            overlaps[[n, k]] = criterion.normalise(iw * ih, b_area, q_area);
        }
    }
    overlaps
}

/// Overlap of rotated rectangles given as `[cx, cy, dx, dy, angle]`.
///
/// Implementations must return an `[N, K]` matrix normalised per `criterion`,
/// with `Criterion::Intersection` yielding raw intersection areas.
pub trait PolygonIntersector: Send + Sync {
    fn rotated_overlap(
        &self,
        boxes: &[[f64; 5]],
        query_boxes: &[[f64; 5]],
        criterion: Criterion,
    ) -> Array2<f64>;
}

/// Rotated-rectangle intersection backed by `geo::BooleanOps`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoIntersector;

fn rect_polygon(b: &[f64; 5]) -> Polygon<f64> {
    let (sin, cos) = b[4].sin_cos();
    let xs = [-b[2] / 2.0, -b[2] / 2.0, b[2] / 2.0, b[2] / 2.0];
    let ys = [-b[3] / 2.0, b[3] / 2.0, b[3] / 2.0, -b[3] / 2.0];
    let corners: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys.iter())
        .map(|(&x, &y)| (cos * x + sin * y + b[0], -sin * x + cos * y + b[1]))
        .collect();
    Polygon::new(LineString::from(corners), vec![])
}

impl PolygonIntersector for GeoIntersector {
    fn rotated_overlap(
        &self,
        boxes: &[[f64; 5]],
        query_boxes: &[[f64; 5]],
        criterion: Criterion,
    ) -> Array2<f64> {
        let polys: Vec<_> = boxes.iter().map(rect_polygon).collect();
        let query_polys: Vec<_> = query_boxes.iter().map(rect_polygon).collect();
        let radius = |b: &[f64; 5]| 0.5 * b[2].hypot(b[3]);

        let mut overlaps = Array2::<f64>::zeros((boxes.len(), query_boxes.len()));
        for (n, (b, pb)) in boxes.iter().zip(&polys).enumerate() {
            for (k, (q, pq)) in query_boxes.iter().zip(&query_polys).enumerate() {
                // Circumscribed circles apart: no intersection possible.
                if (b[0] - q[0]).hypot(b[1] - q[1]) > radius(b) + radius(q) {
                    continue;
                }
                let inter = pb.intersection(pq).unsigned_area();
                if inter > 0.0 {
                    overlaps[[n, k]] = criterion.normalise(inter, b[2] * b[3], q[2] * q[3]);
                }
            }
        }
        overlaps
    }
}

/// Ground-plane overlap of `[x, z, l, w, ry]` footprints.
pub fn bev_box_overlap(
    boxes: &[[f64; 5]],
    query_boxes: &[[f64; 5]],
    criterion: Criterion,
    intersector: &dyn PolygonIntersector,
) -> Array2<f64> {
    intersector.rotated_overlap(boxes, query_boxes, criterion)
}

/// 3D overlap of `[x, y, z, l, h, w, ry]` camera-frame boxes, where `y` is the
/// bottom of the box and height extends towards negative `y`.
pub fn d3_box_overlap(
    boxes: &[[f64; 7]],
    query_boxes: &[[f64; 7]],
    criterion: Criterion,
    intersector: &dyn PolygonIntersector,
) -> Array2<f64> {
    let footprint = |b: &[f64; 7]| [b[0], b[2], b[3], b[5], b[6]];
    let bev: Vec<_> = boxes.iter().map(footprint).collect();
    let query_bev: Vec<_> = query_boxes.iter().map(footprint).collect();
    let mut rinc = intersector.rotated_overlap(&bev, &query_bev, Criterion::Intersection);

    for (i, b) in boxes.iter().enumerate() {
        for (j, q) in query_boxes.iter().enumerate() {
            let area_inter = rinc[[i, j]];
            if area_inter <= 0.0 {
                continue;
            }
            let iw = b[1].min(q[1]) - (b[1] - b[4]).max(q[1] - q[4]);
            rinc[[i, j]] = if iw > 0.0 {
                let vol_b = b[3] * b[4] * b[5];
                let vol_q = q[3] * q[4] * q[5];
                criterion.normalise(iw * area_inter, vol_b, vol_q)
            } else {
                0.0
            };
        }
    }
    rinc
}

fn bev_box(r: &BoxRecord) -> [f64; 5] {
    [
        r.location[0],
        r.location[2],
        r.dimensions[0],
        r.dimensions[2],
        r.rotation_y,
    ]
}

fn d3_box(r: &BoxRecord) -> [f64; 7] {
    [
        r.location[0],
        r.location[1],
        r.location[2],
        r.dimensions[0],
        r.dimensions[1],
        r.dimensions[2],
        r.rotation_y,
    ]
}

/// Intersection-over-union of every ground truth against every detection of
/// the given frames, concatenated in frame order.
pub fn frames_overlap(
    gt: &[Frame],
    dt: &[Frame],
    metric: Metric,
    intersector: &dyn PolygonIntersector,
) -> Array2<f64> {
    let gt_boxes = gt.iter().flat_map(|f| f.objects.iter());
    let dt_boxes = dt.iter().flat_map(|f| f.objects.iter());
    match metric {
        Metric::Bbox => {
            let a: Vec<_> = gt_boxes.map(|r| r.bbox).collect();
            let b: Vec<_> = dt_boxes.map(|r| r.bbox).collect();
            image_box_overlap(&a, &b, Criterion::Union)
        }
        Metric::Bev => {
            let a: Vec<_> = gt_boxes.map(bev_box).collect();
            let b: Vec<_> = dt_boxes.map(bev_box).collect();
            bev_box_overlap(&a, &b, Criterion::Union, intersector)
        }
        Metric::ThreeD => {
            let a: Vec<_> = gt_boxes.map(d3_box).collect();
            let b: Vec<_> = dt_boxes.map(d3_box).collect();
            d3_box_overlap(&a, &b, Criterion::Union, intersector)
        }
    }
}

/// Where one sample's block lives inside its partition matrix.
#[derive(Debug, Clone, Copy)]
struct SampleBlock {
    part: usize,
    row: usize,
    col: usize,
}

/// One overlap matrix per partition, plus per-sample views into them.
pub struct PartitionedOverlaps {
    plan: PartitionPlan,
    parts: Vec<Array2<f64>>,
    gt_counts: Vec<usize>,
    dt_counts: Vec<usize>,
    blocks: Vec<SampleBlock>,
}

impl PartitionedOverlaps {
    /// Compute the overlap matrix of every partition in parallel.
    pub fn compute(
        gt: &[Frame],
        dt: &[Frame],
        metric: Metric,
        plan: PartitionPlan,
        intersector: &dyn PolygonIntersector,
    ) -> Result<Self> {
        if gt.len() != dt.len() {
            return Err(EvalError::invalid(format!(
                "ground truth has {} samples but detections have {}",
                gt.len(),
                dt.len()
            )));
        }
        let covered = plan.parts().last().map_or(0, |r| r.end);
        if covered != gt.len() {
            return Err(EvalError::invalid(format!(
                "partition plan covers {covered} samples, dataset has {}",
                gt.len()
            )));
        }
        debug!(
            "computing {} overlaps for {} samples in {} partitions",
            metric.label(),
            gt.len(),
            plan.len()
        );

        let parts: Vec<Array2<f64>> = plan
            .parts()
            .par_iter()
            .map(|range| {
                frames_overlap(&gt[range.clone()], &dt[range.clone()], metric, intersector)
            })
            .collect();

        let gt_counts: Vec<usize> = gt.iter().map(Frame::len).collect();
        let dt_counts: Vec<usize> = dt.iter().map(Frame::len).collect();
        let mut blocks = Vec::with_capacity(gt.len());
        for (part, range) in plan.parts().iter().enumerate() {
            let (mut row, mut col) = (0, 0);
            for i in range.clone() {
                blocks.push(SampleBlock { part, row, col });
                row += gt_counts[i];
                col += dt_counts[i];
            }
        }

        Ok(PartitionedOverlaps {
            plan,
            parts,
            gt_counts,
            dt_counts,
            blocks,
        })
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn num_samples(&self) -> usize {
        self.blocks.len()
    }

    /// Full `[Σ gt, Σ dt]` matrix of partition `part`.
    pub fn part(&self, part: usize) -> ArrayView2<'_, f64> {
        self.parts[part].view()
    }

    /// Ground-truth box counts per sample.
    pub fn gt_counts(&self) -> &[usize] {
        &self.gt_counts
    }

    /// Detection box counts per sample.
    pub fn dt_counts(&self) -> &[usize] {
        &self.dt_counts
    }

    /// `[gt, dt]` overlap block of sample `i`.
    pub fn sample(&self, i: usize) -> ArrayView2<'_, f64> {
        let b = self.blocks[i];
        self.parts[b.part].slice(s![
            b.row..b.row + self.gt_counts[i],
            b.col..b.col + self.dt_counts[i]
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::{FRAC_PI_4, SQRT_2};

    use approx::assert_abs_diff_eq;

    use super::*;

    fn record(bbox: [f64; 4], location: [f64; 3], dims: [f64; 3], ry: f64) -> BoxRecord {
        BoxRecord {
            name: "Car".into(),
            truncated: 0.0,
            occluded: 0,
            alpha: 0.0,
            bbox,
            dimensions: dims,
            location,
            rotation_y: ry,
            score: None,
        }
    }

    #[test]
    fn test_image_box_overlap_criteria() {
        let a = [[0.0, 0.0, 10.0, 10.0]];
        let b = [[5.0, 0.0, 15.0, 10.0], [20.0, 20.0, 30.0, 30.0]];
        let iou = image_box_overlap(&a, &b, Criterion::Union);
        assert_abs_diff_eq!(iou[[0, 0]], 50.0 / 150.0, epsilon = 1e-12);
        assert_eq!(iou[[0, 1]], 0.0);

        let over_a = image_box_overlap(&a, &[[0.0, 0.0, 20.0, 20.0]], Criterion::OverA);
        assert_abs_diff_eq!(over_a[[0, 0]], 1.0, epsilon = 1e-12);
        let over_b = image_box_overlap(&a, &[[0.0, 0.0, 20.0, 20.0]], Criterion::OverB);
        assert_abs_diff_eq!(over_b[[0, 0]], 0.25, epsilon = 1e-12);
        let raw = image_box_overlap(&a, &b, Criterion::Intersection);
        assert_abs_diff_eq!(raw[[0, 0]], 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_image_box_overlap_symmetric() {
        let a = [[0.0, 0.0, 10.0, 10.0], [3.0, 4.0, 9.0, 12.0]];
        let b = [[5.0, 1.0, 15.0, 11.0], [2.0, 2.0, 4.0, 4.0], [8.0, 8.0, 9.0, 9.5]];
        let ab = image_box_overlap(&a, &b, Criterion::Union);
        let ba = image_box_overlap(&b, &a, Criterion::Union);
        assert_eq!(ab, ba.t());
    }

    #[test]
    fn test_rotated_overlap() {
        let g = GeoIntersector;
        let square = [0.0, 0.0, 2.0, 2.0, 0.0];
        let turned = [0.0, 0.0, 2.0, 2.0, FRAC_PI_4];
        let shifted = [1.0, 0.0, 2.0, 2.0, 0.0];
        let far = [10.0, 10.0, 2.0, 2.0, 0.3];

        let iou = g.rotated_overlap(&[square], &[square, turned, shifted, far], Criterion::Union);
        assert_abs_diff_eq!(iou[[0, 0]], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(iou[[0, 1]], 1.0 / SQRT_2, epsilon = 1e-9);
        assert_abs_diff_eq!(iou[[0, 2]], 2.0 / 6.0, epsilon = 1e-9);
        assert_eq!(iou[[0, 3]], 0.0);

        let raw = g.rotated_overlap(&[square], &[shifted], Criterion::Intersection);
        assert_abs_diff_eq!(raw[[0, 0]], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_d3_overlap_height() {
        let g = GeoIntersector;
        // Same footprint, second box shifted up by half its height.
        let a = [0.0, 2.0, 0.0, 4.0, 2.0, 2.0, 0.0];
        let b = [0.0, 1.0, 0.0, 4.0, 2.0, 2.0, 0.0];
        let c = [0.0, -5.0, 0.0, 4.0, 2.0, 2.0, 0.0];
        let iou = d3_box_overlap(&[a], &[a, b, c], Criterion::Union, &g);
        assert_abs_diff_eq!(iou[[0, 0]], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(iou[[0, 1]], 8.0 / 24.0, epsilon = 1e-9);
        assert_eq!(iou[[0, 2]], 0.0);
    }

    #[test]
    fn test_partitioned_sample_views() {
        let gt = vec![
            Frame::new(vec![record([0.0, 0.0, 10.0, 10.0], [0.0; 3], [1.0; 3], 0.0)]),
            Frame::new(vec![
                record([0.0, 0.0, 10.0, 10.0], [0.0; 3], [1.0; 3], 0.0),
                record([50.0, 50.0, 60.0, 60.0], [0.0; 3], [1.0; 3], 0.0),
            ]),
            Frame::default(),
        ];
        let dt = vec![
            Frame::new(vec![record([0.0, 0.0, 10.0, 10.0], [0.0; 3], [1.0; 3], 0.0)]),
            Frame::new(vec![record([50.0, 50.0, 60.0, 60.0], [0.0; 3], [1.0; 3], 0.0)]),
            Frame::new(vec![record([0.0, 0.0, 1.0, 1.0], [0.0; 3], [1.0; 3], 0.0)]),
        ];
        let plan = PartitionPlan::by_size(3, 2).unwrap();
        let ov = PartitionedOverlaps::compute(&gt, &dt, Metric::Bbox, plan, &GeoIntersector)
            .unwrap();
        assert_eq!(ov.part(0).dim(), (3, 2));
        assert_eq!(ov.part(1).dim(), (0, 1));
        assert_eq!(ov.sample(0).dim(), (1, 1));
        assert_eq!(ov.sample(0)[[0, 0]], 1.0);
        assert_eq!(ov.sample(1).dim(), (2, 1));
        assert_eq!(ov.sample(1)[[0, 0]], 0.0);
        assert_eq!(ov.sample(1)[[1, 0]], 1.0);
        assert_eq!(ov.sample(2).dim(), (0, 1));
    }

    #[test]
    fn test_sample_count_mismatch() {
        let plan = PartitionPlan::by_size(1, 1).unwrap();
        let res = PartitionedOverlaps::compute(
            &[Frame::default()],
            &[],
            Metric::Bbox,
            plan,
            &GeoIntersector,
        );
        assert!(matches!(res, Err(EvalError::InvalidArgument(_))));
    }
}
