//! Reading KITTI label and result files.
//!
//! Each sample is one text file with one object per line:
//!
//! ```text
//! type truncated occluded alpha x1 y1 x2 y2 h w l x y z rotation_y [score]
//! ```
//!
//! Dimensions are stored in the file as `h w l` and reordered to `[l, h, w]`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{EvalError, Result};
use crate::types::{BoxRecord, Frame};

const MIN_FIELDS: usize = 15;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> EvalError + '_ {
    move |source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse one label line. Returns `Ok(None)` for blank lines.
pub fn parse_label_line(line: &str) -> std::result::Result<Option<BoxRecord>, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }
    if fields.len() < MIN_FIELDS {
        return Err(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            fields.len()
        ));
    }

    let nums: Vec<f64> = fields[1..]
        .iter()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| format!("invalid number {s:?}"))
        })
        .collect::<std::result::Result<_, _>>()?;

    let [h, w, l] = [nums[7], nums[8], nums[9]];
    Ok(Some(BoxRecord {
        name: fields[0].to_string(),
        truncated: nums[0],
        occluded: nums[1] as i32,
        alpha: nums[2],
        bbox: [nums[3], nums[4], nums[5], nums[6]],
        dimensions: [l, h, w],
        location: [nums[10], nums[11], nums[12]],
        rotation_y: nums[13],
        score: nums.get(14).copied(),
    }))
}

/// Read every object of a single label file.
pub fn load_label_file(path: &Path) -> Result<Frame> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut objects = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        match parse_label_line(&line) {
            Ok(Some(record)) => objects.push(record),
            Ok(None) => {}
            Err(message) => {
                return Err(EvalError::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    message,
                })
            }
        }
    }
    Ok(Frame::new(objects))
}

/// Load a directory of label files.
///
/// With `image_ids`, reads `{id:06}.txt` for each id in the given order.
/// Without, reads every `*.txt` in the directory sorted by file name.
pub fn load_label_dir(dir: &Path, image_ids: Option<&[u64]>) -> Result<Vec<Frame>> {
    let paths: Vec<PathBuf> = match image_ids {
        Some(ids) => ids.iter().map(|id| dir.join(format!("{id:06}.txt"))).collect(),
        None => {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
                .map_err(io_err(dir))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
                .collect();
            paths.sort();
            paths
        }
    };
    debug!("reading {} label files from {:?}", paths.len(), dir);
    paths.iter().map(|p| load_label_file(p)).collect()
}

/// Read an image-set split file: one integer id per line.
pub fn read_imageset_file(path: &Path) -> Result<Vec<u64>> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut ids = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let id = trimmed.parse::<u64>().map_err(|_| EvalError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            message: format!("invalid image id {trimmed:?}"),
        })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Drop detections scoring below `threshold`; records without a score are kept.
pub fn filter_low_score(frames: Vec<Frame>, threshold: f64) -> Vec<Frame> {
    frames
        .into_iter()
        .map(|frame| {
            Frame::new(
                frame
                    .objects
                    .into_iter()
                    .filter(|o| o.score.map_or(true, |s| s >= threshold))
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ground_truth_line() {
        let line =
            "Car 0.00 0 -1.58 587.01 173.33 614.12 200.12 1.65 1.67 3.64 -0.65 1.71 46.70 -1.59";
        let rec = parse_label_line(line).unwrap().unwrap();
        assert_eq!(rec.name, "Car");
        assert_eq!(rec.occluded, 0);
        assert_eq!(rec.alpha, -1.58);
        assert_eq!(rec.bbox, [587.01, 173.33, 614.12, 200.12]);
        assert_eq!(rec.dimensions, [3.64, 1.65, 1.67]);
        assert_eq!(rec.location, [-0.65, 1.71, 46.70]);
        assert_eq!(rec.rotation_y, -1.59);
        assert_eq!(rec.score, None);
    }

    #[test]
    fn test_parse_detection_line() {
        let line = "Pedestrian -1 -1 0.2 10 20 30 60 1.8 0.6 0.9 1.0 1.6 8.0 0.1 0.87";
        let rec = parse_label_line(line).unwrap().unwrap();
        assert_eq!(rec.score, Some(0.87));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_label_line("   ").unwrap().is_none());
        assert!(parse_label_line("Car 0 0 0.1").is_err());
        let bad = "Car 0 0 x 1 2 3 4 1 1 1 0 0 5 0";
        let err = parse_label_line(bad).unwrap_err();
        assert!(err.contains("\"x\""));
    }

    #[test]
    fn test_filter_low_score() {
        let line_hi = "Car 0 0 0 0 0 10 10 1 1 1 0 0 5 0 0.9";
        let line_lo = "Car 0 0 0 0 0 10 10 1 1 1 0 0 5 0 0.1";
        let frame = Frame::new(vec![
            parse_label_line(line_hi).unwrap().unwrap(),
            parse_label_line(line_lo).unwrap().unwrap(),
        ]);
        let kept = filter_low_score(vec![frame], 0.5);
        assert_eq!(kept[0].len(), 1);
        assert_eq!(kept[0].objects[0].score, Some(0.9));
    }
}
