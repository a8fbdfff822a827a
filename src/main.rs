use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agrivision_seg::{
    config::{log_level, Command},
    figure,
    run_inspection, run_segmentation, Config, Dataset, LogViewer, ModelSelector,
};

fn main() -> Result<()> {
    let config = Config::parse();

    let directive = log_level(config.verbose)
        .parse()
        .context("Invalid log directive")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    match &config.command {
        Command::Inspect(args) => {
            run_inspection(args, &LogViewer).context("Inspection failed")?;
        }
        Command::Segment(args) => {
            figure::validate_cell_size(args.cell_size).context("Invalid arguments")?;
            let dataset = Dataset::open(&args.dataset.directory, &args.dataset.manifest_dir)
                .context("Failed to open dataset")?;
            let model = ModelSelector::new(&args.models_root, args.device_id)
                .initialize(&args.model, None)
                .with_context(|| format!("Failed to initialize model {:?}", args.model))?;
            run_segmentation(&model, &dataset, args, &LogViewer).context("Segmentation failed")?;
        }
    }

    Ok(())
}
