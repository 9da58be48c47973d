//! Per-sample ignore labelling and assembly of the arrays the matcher consumes.

use crate::error::{EvalError, Result};
use crate::params::LabelTables;
use crate::types::{BoxRecord, Frame, IgnoreLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassMatch {
    Exact,
    Alias,
    Other,
}

/// Output of [`GroundTruthFilter::classify`] for one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredLabels {
    pub num_valid_gt: usize,
    pub ignored_gt: Vec<IgnoreLabel>,
    pub ignored_dt: Vec<IgnoreLabel>,
    pub dont_cares: Vec<[f64; 4]>,
}

/// Labels ground truth and detections of one sample for a target class and
/// difficulty bucket.
#[derive(Debug, Clone)]
pub struct GroundTruthFilter<'a> {
    tables: &'a LabelTables,
    target: String,
    difficulty: usize,
}

impl<'a> GroundTruthFilter<'a> {
    pub fn new(tables: &'a LabelTables, class_id: usize, difficulty: usize) -> Result<Self> {
        let target = tables
            .class_name(class_id)
            .ok_or_else(|| EvalError::invalid(format!("unknown class id {class_id}")))?
            .to_lowercase();
        if difficulty >= tables.distance_bins.len() {
            return Err(EvalError::invalid(format!("unknown difficulty {difficulty}")));
        }
        Ok(GroundTruthFilter {
            tables,
            target,
            difficulty,
        })
    }

    fn class_match(&self, name: &str) -> ClassMatch {
        let name = name.to_lowercase();
        if name == self.target {
            ClassMatch::Exact
        } else if self
            .tables
            .aliases
            .iter()
            .any(|a| a.subtype == name && a.target == self.target)
        {
            ClassMatch::Alias
        } else {
            ClassMatch::Other
        }
    }

    fn in_difficulty(&self, gt: &BoxRecord) -> bool {
        let [x, _, z] = gt.location;
        let distance = (x * x + z * z).sqrt();
        self.tables.distance_bucket(distance) == Some(self.difficulty)
    }

    /// Label every box of the sample and collect its don't-care regions.
    pub fn classify(&self, gt: &Frame, dt: &Frame) -> FilteredLabels {
        let mut out = FilteredLabels {
            ignored_gt: Vec::with_capacity(gt.len()),
            ignored_dt: Vec::with_capacity(dt.len()),
            ..Default::default()
        };

        for obj in &gt.objects {
            let label = match (self.class_match(&obj.name), self.in_difficulty(obj)) {
                (ClassMatch::Exact, true) => {
                    out.num_valid_gt += 1;
                    IgnoreLabel::Valid
                }
                (ClassMatch::Exact, false) | (ClassMatch::Alias, _) => IgnoreLabel::Ignored,
                (ClassMatch::Other, _) => IgnoreLabel::Unknown,
            };
            out.ignored_gt.push(label);
            if obj.name == self.tables.dont_care {
                out.dont_cares.push(obj.bbox);
            }
        }

        out.ignored_dt.extend(dt.objects.iter().map(|obj| {
            if obj.name.to_lowercase() == self.target {
                IgnoreLabel::Valid
            } else {
                IgnoreLabel::Unknown
            }
        }));
        out
    }
}

/// Ground-truth box and observation angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GtEntry {
    pub bbox: [f64; 4],
    pub alpha: f64,
}

/// Detection box, observation angle, and confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DtEntry {
    pub bbox: [f64; 4],
    pub alpha: f64,
    pub score: f64,
}

/// Everything the matcher needs for one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedSample {
    pub gt: Vec<GtEntry>,
    pub dt: Vec<DtEntry>,
    pub ignored_gt: Vec<IgnoreLabel>,
    pub ignored_dt: Vec<IgnoreLabel>,
    pub dont_cares: Vec<[f64; 4]>,
}

/// Filtered samples for one (class, difficulty) pair.
#[derive(Debug, Clone, Default)]
pub struct PreparedData {
    pub samples: Vec<PreparedSample>,
    pub num_valid_gt: usize,
}

/// Run the filter over the whole dataset for one class and difficulty.
pub fn prepare_data(
    gt_frames: &[Frame],
    dt_frames: &[Frame],
    tables: &LabelTables,
    class_id: usize,
    difficulty: usize,
) -> Result<PreparedData> {
    if gt_frames.len() != dt_frames.len() {
        return Err(EvalError::invalid(format!(
            "ground truth has {} samples but detections have {}",
            gt_frames.len(),
            dt_frames.len()
        )));
    }
    let filter = GroundTruthFilter::new(tables, class_id, difficulty)?;

    let mut data = PreparedData {
        samples: Vec::with_capacity(gt_frames.len()),
        num_valid_gt: 0,
    };
    for (i, (gt, dt)) in gt_frames.iter().zip(dt_frames).enumerate() {
        let labels = filter.classify(gt, dt);
        data.num_valid_gt += labels.num_valid_gt;

        let gt_entries = gt
            .objects
            .iter()
            .map(|o| GtEntry {
                bbox: o.bbox,
                alpha: o.alpha,
            })
            .collect();
        let dt_entries = dt
            .objects
            .iter()
            .map(|o| {
                let score = o.score.ok_or_else(|| {
                    EvalError::invalid(format!("detection {:?} in sample {i} has no score", o.name))
                })?;
                Ok(DtEntry {
                    bbox: o.bbox,
                    alpha: o.alpha,
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        data.samples.push(PreparedSample {
            gt: gt_entries,
            dt: dt_entries,
            ignored_gt: labels.ignored_gt,
            ignored_dt: labels.ignored_dt,
            dont_cares: labels.dont_cares,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(name: &str, location: [f64; 3], score: Option<f64>) -> BoxRecord {
        BoxRecord {
            name: name.into(),
            truncated: 0.0,
            occluded: 0,
            alpha: 0.5,
            bbox: [0.0, 0.0, 10.0, 10.0],
            dimensions: [4.0, 1.5, 1.7],
            location,
            rotation_y: 0.0,
            score,
        }
    }

    #[test]
    fn test_ground_truth_labels() {
        let tables = LabelTables::default();
        let filter = GroundTruthFilter::new(&tables, 0, 0).unwrap();
        let gt = Frame::new(vec![
            obj("Car", [3.0, 1.0, 4.0], None),         // distance 5 -> bucket 0
            obj("car", [0.0, 1.0, 15.0], None),        // bucket 1
            obj("Van", [0.0, 1.0, 5.0], None),         // alias
            obj("Pedestrian", [0.0, 1.0, 5.0], None),  // other class
            obj("DontCare", [0.0, 0.0, 0.0], None),
            obj("Car", [0.0, 1.0, 95.0], None),        // beyond all bins
        ]);
        let labels = filter.classify(&gt, &Frame::default());
        assert_eq!(labels.num_valid_gt, 1);
        assert_eq!(
            labels.ignored_gt,
            vec![
                IgnoreLabel::Valid,
                IgnoreLabel::Ignored,
                IgnoreLabel::Ignored,
                IgnoreLabel::Unknown,
                IgnoreLabel::Unknown,
                IgnoreLabel::Ignored,
            ]
        );
        assert_eq!(labels.dont_cares, vec![[0.0, 0.0, 10.0, 10.0]]);
    }

    #[test]
    fn test_distance_rounds_like_squared_sum() {
        // x² + z² rounds to just under 900 here, so the box stays below 30 m.
        let tables = LabelTables::default();
        let gt = Frame::new(vec![obj("Car", [28.08, 1.7, 10.56], None)]);
        let near = GroundTruthFilter::new(&tables, 0, 2).unwrap();
        let far = GroundTruthFilter::new(&tables, 0, 3).unwrap();
        assert_eq!(near.classify(&gt, &Frame::default()).num_valid_gt, 1);
        assert_eq!(far.classify(&gt, &Frame::default()).num_valid_gt, 0);
    }

    #[test]
    fn test_alias_only_folds_into_its_target() {
        let tables = LabelTables::default();
        let pedestrian = GroundTruthFilter::new(&tables, 1, 0).unwrap();
        let gt = Frame::new(vec![
            obj("Person_sitting", [0.0, 1.0, 5.0], None),
            obj("Van", [0.0, 1.0, 5.0], None),
        ]);
        let labels = pedestrian.classify(&gt, &Frame::default());
        assert_eq!(labels.ignored_gt, vec![IgnoreLabel::Ignored, IgnoreLabel::Unknown]);
        assert_eq!(labels.num_valid_gt, 0);
    }

    #[test]
    fn test_detection_labels_ignore_distance() {
        let tables = LabelTables::default();
        let filter = GroundTruthFilter::new(&tables, 0, 3).unwrap();
        let dt = Frame::new(vec![
            obj("Car", [0.0, 1.0, 5.0], Some(0.9)),
            obj("Van", [0.0, 1.0, 35.0], Some(0.8)),
        ]);
        let labels = filter.classify(&Frame::default(), &dt);
        assert_eq!(labels.ignored_dt, vec![IgnoreLabel::Valid, IgnoreLabel::Unknown]);
    }

    #[test]
    fn test_prepare_data() {
        let tables = LabelTables::default();
        let gt = vec![
            Frame::new(vec![obj("Car", [0.0, 1.0, 5.0], None)]),
            Frame::new(vec![obj("Car", [0.0, 1.0, 6.0], None), obj("Car", [0.0, 1.0, 7.0], None)]),
        ];
        let dt = vec![
            Frame::new(vec![obj("Car", [0.0, 1.0, 5.0], Some(0.7))]),
            Frame::default(),
        ];
        let data = prepare_data(&gt, &dt, &tables, 0, 0).unwrap();
        assert_eq!(data.num_valid_gt, 3);
        assert_eq!(data.samples.len(), 2);
        assert_eq!(data.samples[0].dt[0].score, 0.7);
        assert_eq!(data.samples[1].ignored_gt.len(), 2);

        assert!(prepare_data(&gt, &dt[..1], &tables, 0, 0).is_err());
        let unscored = vec![Frame::new(vec![obj("Car", [0.0, 1.0, 5.0], None)]), Frame::default()];
        assert!(prepare_data(&gt, &unscored, &tables, 0, 0).is_err());
        assert!(prepare_data(&gt, &dt, &tables, 6, 0).is_err());
    }
}
