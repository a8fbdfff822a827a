use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::manifest::Split;
use crate::selector::DEFAULT_MODELS_ROOT;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Display a random selection of dataset images
    Inspect(InspectArgs),
    /// Segment a dataset image with a trained model
    Segment(SegmentArgs),
}

#[derive(Args, Clone, Debug)]
pub struct DatasetArgs {
    /// Root of the Agriculture-Vision dataset
    #[arg(long, default_value = "data/Agriculture-Vision")]
    pub directory: PathBuf,

    /// Directory holding train.json, val.json and test.json
    #[arg(long, default_value = "data/Dataset")]
    pub manifest_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectMode {
    /// Every category of a handful of images
    General,
    /// One category of a grid of images
    Specific,
}

impl InspectMode {
    pub const fn output_name(self) -> &'static str {
        match self {
            InspectMode::General => "inspected-general.png",
            InspectMode::Specific => "inspected-specific.png",
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Save the figure to the output directory
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub save: bool,

    #[arg(long, value_enum, default_value_t = InspectMode::General)]
    pub mode: InspectMode,

    #[arg(long, default_value = "images")]
    pub output_dir: PathBuf,

    /// Grid rows in specific mode
    #[arg(long, default_value_t = 16)]
    pub rows: usize,

    /// Grid columns in specific mode
    #[arg(long, default_value_t = 10)]
    pub cols: usize,

    /// Category shown in specific mode
    #[arg(long, default_value = "boundary")]
    pub category: String,

    /// Number of images in general mode, between 5 and 9
    #[arg(long, default_value_t = 6)]
    pub count: usize,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Edge length in pixels of one figure cell
    #[arg(long, default_value_t = 128)]
    pub cell_size: u32,
}

#[derive(Args, Clone, Debug)]
pub struct SegmentArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Model shortcut (stage1, scl40, final, ...) or path to an .onnx file
    #[arg(short, long, default_value = "final")]
    pub model: String,

    #[arg(long, default_value = DEFAULT_MODELS_ROOT)]
    pub models_root: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, value_enum, default_value_t = Split::Val)]
    pub split: Split,

    /// Identifier of the image within the split
    #[arg(long)]
    pub id: String,

    /// Also draw the ground-truth contours and score the prediction
    #[arg(long)]
    pub with_truth: bool,

    /// Save the figure to the output directory
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub save: bool,

    #[arg(long, default_value = "images")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 256)]
    pub cell_size: u32,
}

impl SegmentArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("segmented-{}.png", self.id))
    }
}

/// Tracing filter level for a `-v` count.
pub const fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
