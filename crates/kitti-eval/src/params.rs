use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::partition::PartitionPlan;
use crate::types::Metric;

/// A ground-truth subtype that folds into another class as "ignored".
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassAlias {
    /// Lower-case subtype name, e.g. `van`.
    pub subtype: String,
    /// Lower-case target class, e.g. `car`.
    pub target: String,
}

/// Constant lookup tables the ground-truth filter needs.
///
/// These are data, not ambient state: every filter receives them explicitly.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelTables {
    /// Display names indexed by class id.
    pub class_names: Vec<String>,
    pub aliases: Vec<ClassAlias>,
    /// Exact (case-sensitive) name of unlabeled regions.
    pub dont_care: String,
    /// Half-open `[min, max)` ground-plane distance ranges, one per difficulty.
    pub distance_bins: Vec<[f64; 2]>,
}

impl Default for LabelTables {
    fn default() -> Self {
        let class_names = ["Car", "Pedestrian", "Cyclist", "Van", "Person_sitting", "Truck"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let aliases = vec![
            ClassAlias {
                subtype: "person_sitting".into(),
                target: "pedestrian".into(),
            },
            ClassAlias {
                subtype: "van".into(),
                target: "car".into(),
            },
        ];
        let distance_bins = (0..8)
            .map(|i| [10.0 * i as f64, 10.0 * (i + 1) as f64])
            .collect();
        LabelTables {
            class_names,
            aliases,
            dont_care: "DontCare".into(),
            distance_bins,
        }
    }
}

impl LabelTables {
    /// Case-insensitive lookup of a class id by name.
    pub fn class_id(&self, name: &str) -> Option<usize> {
        self.class_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn class_name(&self, id: usize) -> Option<&str> {
        self.class_names.get(id).map(String::as_str)
    }

    /// Difficulty bucket of a ground-plane distance, if it falls in any bin.
    pub fn distance_bucket(&self, distance: f64) -> Option<usize> {
        self.distance_bins
            .iter()
            .position(|&[lo, hi]| distance >= lo && distance < hi)
    }
}

/// Evaluation parameters: classes, difficulties, overlap thresholds, and
/// batching.
///
/// Defaults follow the official protocol: six classes, eight 10 m distance
/// difficulties, 41 sampled recall points, and two overlap settings (strict
/// and loose) per metric and class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Params {
    /// Class ids (into `tables.class_names`) to evaluate.
    pub current_classes: Vec<usize>,
    /// Difficulty buckets (into `tables.distance_bins`) to evaluate.
    pub difficulties: Vec<usize>,
    /// Minimum overlaps as `[setting][metric][class id]`.
    pub min_overlaps: Vec<[Vec<f64>; 3]>,
    /// Maximum number of score thresholds per curve.
    pub num_sample_pts: usize,
    /// Maximum number of samples per overlap batch.
    pub partition_size: usize,
    /// Split into this many equal batches plus a remainder batch instead of
    /// batching by `partition_size`.
    pub partition_count: Option<usize>,
    /// Force orientation similarity on or off (`None` = detect from alphas).
    pub compute_aos: Option<bool>,
    pub tables: LabelTables,
}

impl Default for Params {
    fn default() -> Self {
        let strict = [
            vec![0.7, 0.5, 0.5, 0.7, 0.5, 0.7],
            vec![0.7, 0.5, 0.5, 0.7, 0.5, 0.7],
            vec![0.7, 0.5, 0.5, 0.7, 0.5, 0.7],
        ];
        let loose = [
            vec![0.7, 0.5, 0.5, 0.7, 0.5, 0.5],
            vec![0.5, 0.25, 0.25, 0.5, 0.25, 0.5],
            vec![0.5, 0.25, 0.25, 0.5, 0.25, 0.5],
        ];
        Params {
            current_classes: vec![0],
            difficulties: (0..8).collect(),
            min_overlaps: vec![strict, loose],
            num_sample_pts: 41,
            partition_size: 50,
            partition_count: None,
            compute_aos: None,
            tables: LabelTables::default(),
        }
    }
}

impl Params {
    /// Load parameters from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| EvalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params: Params = serde_json::from_reader(std::io::BufReader::new(file))?;
        params.validate()?;
        Ok(params)
    }

    /// Resolve class names or numeric ids into `current_classes`.
    pub fn set_classes<S: AsRef<str>>(&mut self, classes: &[S]) -> Result<()> {
        let mut ids = Vec::with_capacity(classes.len());
        for c in classes {
            let c = c.as_ref();
            let id = match c.parse::<usize>() {
                Ok(id) => id,
                Err(_) => self
                    .tables
                    .class_id(c)
                    .ok_or_else(|| EvalError::invalid(format!("unknown class {c:?}")))?,
            };
            ids.push(id);
        }
        self.current_classes = ids;
        self.validate()
    }

    /// Batching of `num_samples` samples for overlap computation.
    pub fn partition_plan(&self, num_samples: usize) -> Result<PartitionPlan> {
        match self.partition_count {
            Some(parts) => PartitionPlan::by_count(num_samples, parts),
            None => PartitionPlan::by_size(num_samples, self.partition_size),
        }
    }

    pub fn num_settings(&self) -> usize {
        self.min_overlaps.len()
    }

    /// Minimum overlap for a setting, metric and class id.
    pub fn min_overlap(&self, setting: usize, metric: Metric, class_id: usize) -> Result<f64> {
        self.min_overlaps
            .get(setting)
            .and_then(|per_metric| per_metric[metric.index()].get(class_id))
            .copied()
            .ok_or_else(|| {
                EvalError::invalid(format!(
                    "no min overlap for setting {setting}, metric {}, class {class_id}",
                    metric.label()
                ))
            })
    }

    /// Check that every index refers to an entry of the tables.
    pub fn validate(&self) -> Result<()> {
        let num_classes = self.tables.class_names.len();
        if let Some(&c) = self.current_classes.iter().find(|&&c| c >= num_classes) {
            return Err(EvalError::invalid(format!(
                "class id {c} out of range (0..{num_classes})"
            )));
        }
        let num_bins = self.tables.distance_bins.len();
        if let Some(&d) = self.difficulties.iter().find(|&&d| d >= num_bins) {
            return Err(EvalError::invalid(format!(
                "difficulty {d} out of range (0..{num_bins})"
            )));
        }
        for (s, per_metric) in self.min_overlaps.iter().enumerate() {
            if per_metric.iter().any(|row| row.len() != num_classes) {
                return Err(EvalError::invalid(format!(
                    "min overlap setting {s} must list {num_classes} classes per metric"
                )));
            }
        }
        if self.num_sample_pts < 2 {
            return Err(EvalError::invalid("num_sample_pts must be at least 2"));
        }
        if self.partition_size == 0 || self.partition_count == Some(0) {
            return Err(EvalError::invalid("partitions must hold at least one sample"));
        }
        Ok(())
    }
}
