use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kitti_eval::kitti::{filter_low_score, load_label_dir, read_imageset_file};
use kitti_eval::{summarize, KittiEval, Params};

#[derive(Parser)]
#[command(name = "kitti-eval")]
#[command(about = "KITTI detection evaluation: bbox, BEV and 3D AP (11-point and R40)")]
struct Cli {
    /// Directory of ground-truth label files ({id:06}.txt)
    #[arg(long)]
    label_dir: PathBuf,

    /// Directory of detection result files, one per label file
    #[arg(long)]
    result_dir: PathBuf,

    /// Image-set file listing the ids to evaluate (default: every label file)
    #[arg(long)]
    split_file: Option<PathBuf>,

    /// Classes to evaluate, by name or id (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "Car")]
    classes: Vec<String>,

    /// Drop detections scoring below this value before evaluation
    #[arg(long)]
    score_thresh: Option<f64>,

    /// JSON file with evaluation parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Samples per overlap batch
    #[arg(long)]
    partition_size: Option<usize>,

    /// Write the full result (AP values and curves) as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    let mut params = match &cli.config {
        Some(path) => Params::from_json_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => Params::default(),
    };
    params.set_classes(&cli.classes)?;
    if let Some(size) = cli.partition_size {
        params.partition_size = size;
        params.partition_count = None;
    }

    let ids = match &cli.split_file {
        Some(path) => Some(
            read_imageset_file(path).with_context(|| format!("Failed to read split {:?}", path))?,
        ),
        None => None,
    };

    eprintln!("Loading ground truth from {:?}...", cli.label_dir);
    let gt = load_label_dir(&cli.label_dir, ids.as_deref())?;

    eprintln!("Loading detections from {:?}...", cli.result_dir);
    let mut dt = load_label_dir(&cli.result_dir, ids.as_deref())?;
    if let Some(thresh) = cli.score_thresh {
        dt = filter_low_score(dt, thresh);
    }

    eprintln!("Evaluating {} samples...", gt.len());
    let result = KittiEval::new(gt, dt, params)?.evaluate()?;

    print!("{}", summarize(&result));

    if let Some(path) = &cli.json {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {:?}", path))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &result)?;
        log::info!("wrote results to {:?}", path);
    }

    Ok(())
}
