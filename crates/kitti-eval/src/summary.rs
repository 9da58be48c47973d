//! Plain-text report in the official result layout.

use std::fmt::Write;

use ndarray::{s, Array3, ArrayView1};

use crate::eval::{ApResult, EvaluationResult};
use crate::types::Metric;

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        format!("{v:.4}")
    }
}

fn join_values(values: ArrayView1<'_, f64>) -> String {
    values
        .iter()
        .map(|&v| format_value(v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_block(
    out: &mut String,
    result: &EvaluationResult,
    class: usize,
    setting: usize,
    pick: fn(&ApResult) -> &Array3<f64>,
) {
    let rows = [
        ("bbox", Metric::Bbox, &result.bbox.ap),
        ("bev ", Metric::Bev, &result.bev.ap),
        ("3d  ", Metric::ThreeD, &result.three_d.ap),
    ];
    for (label, metric, ap) in rows {
        let ov = result.min_overlaps[[setting, metric.index(), class]];
        let values = pick(ap).slice(s![class, .., setting]);
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{label} ({ov:.2}): {}", join_values(values));
    }
    if let Some(aos) = &result.aos {
        let values = pick(aos).slice(s![class, .., setting]);
        let _ = writeln!(out, "aos        : {}", join_values(values));
    }
}

/// Render every class and overlap setting: an AP block followed by an AP_R40
/// block, one comma-separated value per difficulty. Undefined values print as
/// `nan`.
pub fn summarize(result: &EvaluationResult) -> String {
    let mut out = String::new();
    for (m, name) in result.class_names.iter().enumerate() {
        for setting in 0..result.min_overlaps.dim().0 {
            let _ = writeln!(out, "{name} AP:");
            write_block(&mut out, result, m, setting, |r| &r.ap);
            let _ = writeln!(out, "{name} AP_R40:");
            write_block(&mut out, result, m, setting, |r| &r.ap_r40);
        }
    }
    out
}
