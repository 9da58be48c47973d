use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// One labelled or detected object.
///
/// Ground-truth records leave `score` empty; detection records carry the
/// confidence of the prediction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BoxRecord {
    /// Class name as written in the label file (e.g. `Car`, `DontCare`).
    pub name: String,
    #[serde(default)]
    pub truncated: f64,
    #[serde(default)]
    pub occluded: i32,
    /// Observation angle in `[-pi, pi]`; `-10` marks "not provided".
    pub alpha: f64,
    /// Image-plane box as `[x1, y1, x2, y2]`.
    pub bbox: [f64; 4],
    /// Box size as `[l, h, w]`.
    pub dimensions: [f64; 3],
    /// Bottom-centre of the box in camera coordinates, `[x, y, z]`.
    pub location: [f64; 3],
    /// Yaw around the camera y axis.
    pub rotation_y: f64,
    #[serde(default)]
    pub score: Option<f64>,
}

/// All records of one sample (image), in file order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Frame {
    pub objects: Vec<BoxRecord>,
}

impl Frame {
    pub fn new(objects: Vec<BoxRecord>) -> Self {
        Frame { objects }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Per-box participation in matching for one (class, difficulty) pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreLabel {
    /// Counted as tp / fp / fn.
    Valid,
    /// May be matched, but never counted.
    Ignored,
    /// Invisible to matching.
    Unknown,
}

/// Overlap criterion used to match ground truth against detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Metric {
    /// Axis-aligned image-plane boxes.
    Bbox,
    /// Rotated ground-plane footprints.
    Bev,
    /// Rotated 3D boxes.
    ThreeD,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Bbox, Metric::Bev, Metric::ThreeD];

    /// Numeric id used by the min-overlap table (0 = bbox, 1 = bev, 2 = 3d).
    pub fn index(self) -> usize {
        match self {
            Metric::Bbox => 0,
            Metric::Bev => 1,
            Metric::ThreeD => 2,
        }
    }

    pub fn from_index(id: usize) -> Result<Self> {
        match id {
            0 => Ok(Metric::Bbox),
            1 => Ok(Metric::Bev),
            2 => Ok(Metric::ThreeD),
            other => Err(EvalError::invalid(format!(
                "unknown metric {other}, expected 0 (bbox), 1 (bev) or 2 (3d)"
            ))),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Bbox => "bbox",
            Metric::Bev => "bev",
            Metric::ThreeD => "3d",
        }
    }
}

/// Denominator applied to an intersection area or volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    /// intersection / union
    Union,
    /// intersection / area of the first box
    OverA,
    /// intersection / area of the second box
    OverB,
    /// raw intersection
    Intersection,
}

impl Criterion {
    /// Map the integer convention `-1 / 0 / 1 / other`.
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Criterion::Union,
            0 => Criterion::OverA,
            1 => Criterion::OverB,
            _ => Criterion::Intersection,
        }
    }

    /// Normalise `inter` given the sizes of both operands.
    #[inline]
    pub fn normalise(self, inter: f64, size_a: f64, size_b: f64) -> f64 {
        match self {
            Criterion::Union => inter / (size_a + size_b - inter),
            Criterion::OverA => inter / size_a,
            Criterion::OverB => inter / size_b,
            Criterion::Intersection => inter,
        }
    }
}
