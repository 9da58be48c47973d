use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use kitti_eval::kitti::{filter_low_score, load_label_dir, read_imageset_file};
use kitti_eval::{summarize, Frame, KittiEval, Params};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(split: &str) -> (Vec<Frame>, Vec<Frame>) {
    let ids = read_imageset_file(&fixtures_dir().join(split)).expect("Failed to read split");
    let gt =
        load_label_dir(&fixtures_dir().join("label_2"), Some(&ids)).expect("Failed to load GT");
    let dt =
        load_label_dir(&fixtures_dir().join("results"), Some(&ids)).expect("Failed to load DT");
    (gt, dt)
}

#[test]
fn test_load_labels() {
    let (gt, dt) = load("val.txt");
    assert_eq!(gt.len(), 3);
    assert_eq!(dt.len(), 3);
    assert_eq!(gt[0].len(), 3);
    assert_eq!(gt[0].objects[2].name, "DontCare");
    // File order is h w l.
    assert_eq!(gt[0].objects[0].dimensions, [3.64, 1.65, 1.67]);
    assert!(gt.iter().flat_map(|f| &f.objects).all(|o| o.score.is_none()));
    assert!(dt.iter().flat_map(|f| &f.objects).all(|o| o.score.is_some()));
}

#[test]
fn test_load_all_files_matches_split() {
    let (gt, _) = load("val.txt");
    let all = load_label_dir(&fixtures_dir().join("label_2"), None).expect("Failed to load GT");
    assert_eq!(all, gt);

    let (subset, _) = load("subset.txt");
    assert_eq!(subset.len(), 2);
    assert_eq!(subset[0], gt[2]);
    assert_eq!(subset[1], gt[0]);
}

#[test]
fn test_car_evaluation() {
    let (gt, dt) = load("val.txt");
    let eval = KittiEval::new(gt, dt, Params::default()).expect("Failed to build evaluator");
    assert!(eval.compute_aos());
    let result = eval.evaluate().expect("Evaluation failed");

    // Two valid cars within 10 m, both found at scores 0.95 and 0.85: the
    // curve is [1, 1, 0, ...].
    let bbox = &result.bbox.ap;
    for setting in 0..2 {
        assert_abs_diff_eq!(bbox.ap[[0, 0, setting]], 100.0 / 11.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bbox.ap_r40[[0, 0, setting]], 2.5, epsilon = 1e-9);
        // One valid car in 10-20 m, found.
        assert_abs_diff_eq!(bbox.ap[[0, 1, setting]], 100.0 / 11.0, epsilon = 1e-9);
        // One valid car in 20-30 m, missed.
        assert_eq!(bbox.ap[[0, 2, setting]], 0.0);
    }
    assert!(bbox.ap.slice(ndarray::s![0, 3.., ..]).iter().all(|&v| v == 0.0));

    // The boxes also match under the loose bird's-eye and 3d thresholds.
    assert_abs_diff_eq!(result.bev.ap.ap[[0, 0, 1]], 100.0 / 11.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.three_d.ap.ap[[0, 0, 1]], 100.0 / 11.0, epsilon = 1e-9);

    let aos = result.aos.as_ref().expect("alphas are present");
    let easy = aos.ap[[0, 0, 0]];
    assert!(easy > 9.0 && easy <= bbox.ap[[0, 0, 0]]);
}

#[test]
fn test_low_score_detections_do_not_move_sampled_curves() {
    let (gt, dt) = load("val.txt");
    let baseline = KittiEval::new(gt.clone(), dt.clone(), Params::default())
        .unwrap()
        .evaluate()
        .unwrap();

    // Drops the 0.4 and 0.2 detections, which never became thresholds.
    let dt = filter_low_score(dt, 0.5);
    assert_eq!(dt.iter().map(Frame::len).sum::<usize>(), 5);
    let filtered = KittiEval::new(gt, dt, Params::default())
        .unwrap()
        .evaluate()
        .unwrap();
    assert_eq!(filtered.bbox.ap.ap, baseline.bbox.ap.ap);
    assert_eq!(filtered.bbox.ap.ap_r40, baseline.bbox.ap.ap_r40);
}

#[test]
fn test_summary_and_json() {
    let (gt, dt) = load("val.txt");
    let mut params = Params::default();
    params.set_classes(&["car", "pedestrian"]).unwrap();
    let result = KittiEval::new(gt, dt, params).unwrap().evaluate().unwrap();

    let text = summarize(&result);
    assert!(text.starts_with(
        "Car AP:\nbbox (0.70): 9.0909, 9.0909, 0.0000, 0.0000, 0.0000, 0.0000, 0.0000, 0.0000\n"
    ));
    assert!(text.contains("Car AP_R40:\nbbox (0.70): 2.5000, 0.0000, 0.0000"));
    assert!(text.contains("Pedestrian AP:\nbbox (0.50): "));
    assert!(text.contains("bev  (0.25): "));
    assert_eq!(text.matches("aos        : ").count(), 8);

    let json = serde_json::to_value(&result).expect("Failed to serialize");
    assert_eq!(json["class_names"][1], "Pedestrian");
    assert!(json["bbox"]["ap_r40"].is_object());
    assert!(json["three_d"]["curves"]["precision"].is_object());
}
