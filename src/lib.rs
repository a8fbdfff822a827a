pub mod assembler;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod figure;
pub mod loss;
pub mod manifest;
pub mod model;
pub mod sampler;
pub mod segment;
pub mod selector;
pub mod traits;

pub mod mocks;

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

pub use config::{Config, InspectArgs, InspectMode, SegmentArgs};
pub use dataset::{ClassDictionary, Dataset};
pub use errors::{AgriVisionError, Result};
pub use figure::{Figure, FigureViewer, LogViewer};
pub use manifest::{ManifestStore, PathRecord, Split};
pub use model::OnnxModel;
pub use segment::{FarmlandAnomalyModel, ModelInput, RawImageData, SegmentationMap};
pub use selector::{ModelSelector, Stage};
pub use traits::*;

use sampler::GridShape;

/// Validated inspection request. Building one touches no files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectPlan {
    General { count: usize },
    Specific { grid: GridShape, category: String },
}

impl InspectPlan {
    pub fn from_args(args: &InspectArgs) -> Result<Self> {
        figure::validate_cell_size(args.cell_size)?;
        match args.mode {
            InspectMode::General => Ok(Self::General {
                count: sampler::validate_general_count(args.count)?,
            }),
            InspectMode::Specific => {
                if args.category.is_empty() {
                    return Err(AgriVisionError::configuration("category must not be empty"));
                }
                Ok(Self::Specific {
                    grid: GridShape::try_from(&[args.rows, args.cols][..])?,
                    category: args.category.clone(),
                })
            }
        }
    }
}

/// Samples training images according to `args` and presents the figure.
pub fn run_inspection(args: &InspectArgs, viewer: &dyn FigureViewer) -> Result<Figure> {
    let plan = InspectPlan::from_args(args)?;

    let manifests = ManifestStore::load(&args.dataset.manifest_dir)?;
    let image_ids = dataset::image_names(&args.dataset.directory, &[Split::Train])?;
    let classes = ClassDictionary::from_dataset(&args.dataset.directory)?;
    info!(
        "{} training images, classes: {:?}",
        image_ids.len(),
        classes.iter().map(|(_, name)| name).collect::<Vec<_>>()
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let figure = match plan {
        InspectPlan::Specific { grid, category } => {
            sampler::sample_specific(grid, &image_ids, &category, manifests.records(), &mut rng)?
                .figure
        }
        InspectPlan::General { count } => {
            sampler::sample_general(count, &image_ids, manifests.records(), &mut rng)?.figure
        }
    };

    let output: Option<PathBuf> = args
        .save
        .then(|| args.output_dir.join(args.mode.output_name()));
    figure::present(&figure, viewer, output.as_deref(), args.cell_size)?;
    Ok(figure)
}

/// Segments the requested dataset item with `model`, scoring it when the
/// ground truth is requested.
pub fn run_segmentation<B: SegmentationBackend>(
    model: &FarmlandAnomalyModel<B>,
    dataset: &Dataset,
    args: &SegmentArgs,
    viewer: &dyn FigureViewer,
) -> Result<Figure> {
    figure::validate_cell_size(args.cell_size)?;
    info!("{model}");
    let input = ModelInput::reference(dataset, args.split, args.id.as_str());
    let output = args.save.then(|| args.output_path());
    let figure = model.show_segmented_predictions(
        &input,
        args.with_truth,
        viewer,
        output.as_deref(),
        args.cell_size,
    )?;

    if args.with_truth {
        for (name, loss) in model.evaluate(&input)? {
            info!("{name}: {loss:.4}");
        }
    }
    Ok(figure)
}
