pub mod error;
pub mod eval;
pub mod filter;
pub mod fused;
pub mod kitti;
pub mod matching;
pub mod overlap;
pub mod params;
pub mod partition;
pub mod summary;
pub mod thresholds;
pub mod types;

pub use error::{EvalError, Result};
pub use eval::{ApResult, Curves, EvaluationResult, KittiEval, MetricResult};
pub use overlap::{GeoIntersector, PolygonIntersector};
pub use params::{LabelTables, Params};
pub use summary::summarize;
pub use types::{BoxRecord, Criterion, Frame, IgnoreLabel, Metric};
