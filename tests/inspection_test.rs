mod common;

use std::collections::HashSet;
use std::fs;

use clap::Parser;
use image::GenericImageView;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use agrivision_seg::{
    assembler::{assemble_all, assemble_one},
    config::Command,
    dataset::image_names,
    run_inspection,
    sampler::{sample_general, sample_specific, GridShape},
    AgriVisionError, Config, InspectArgs, LogViewer, ManifestStore, Split,
};
use common::{Fixture, SIZE};

const TRAIN_IDS: [&str; 7] = ["t0", "t1", "t2", "t3", "t4", "t5", "t6"];

fn inspect_args(fixture: &Fixture, output_dir: &std::path::Path, extra: &[&str]) -> InspectArgs {
    let directory = fixture.root.to_str().unwrap().to_string();
    let manifest_dir = fixture.manifest_dir.to_str().unwrap().to_string();
    let output = output_dir.to_str().unwrap().to_string();
    let mut argv = vec![
        "agrivision-seg".to_string(),
        "inspect".to_string(),
        "--directory".to_string(),
        directory,
        "--manifest-dir".to_string(),
        manifest_dir,
        "--output-dir".to_string(),
        output,
        "--seed".to_string(),
        "42".to_string(),
        "--cell-size".to_string(),
        "16".to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    match Config::parse_from(argv).command {
        Command::Inspect(args) => args,
        Command::Segment(_) => unreachable!(),
    }
}

#[test]
fn test_manifest_lookup_end_to_end() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &TRAIN_IDS);
    let store = ManifestStore::load(&fixture.manifest_dir)?;

    assert_eq!(store.records().len(), TRAIN_IDS.len() + 2);
    assert_eq!(store.records().last().map(|r| r.id.as_str()), Some("test-1"));

    let rgb = assemble_one("val-1", "rgb", store.records())?;
    assert_eq!(rgb.dimensions(), (SIZE, SIZE));
    assert!(matches!(
        assemble_one("missing", "rgb", store.records()),
        Err(AgriVisionError::NotFound { .. })
    ));

    let all = assemble_all("t3", store.records())?;
    let categories: HashSet<_> = all.categories().collect();
    assert_eq!(
        categories,
        HashSet::from(["rgb", "nir", "boundary", "label_water", "label_double_plant"])
    );
    Ok(())
}

#[test]
fn test_sample_specific_draws_distinct_images() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &TRAIN_IDS);
    let store = ManifestStore::load(&fixture.manifest_dir)?;
    let ids = image_names(&fixture.root, &[Split::Train])?;
    let mut rng = StdRng::seed_from_u64(3);

    for (rows, cols) in [(1, 1), (2, 3), (7, 1)] {
        let sample = sample_specific(
            GridShape::new(rows, cols)?,
            &ids,
            "boundary",
            store.records(),
            &mut rng,
        )?;
        let unique: HashSet<_> = sample.identifiers.iter().collect();
        assert_eq!(sample.images.len(), rows * cols);
        assert_eq!(unique.len(), rows * cols);
        assert!(sample.identifiers.iter().all(|id| ids.contains(id)));
        assert_eq!(sample.figure.shape(), (rows, cols));
    }

    assert!(sample_specific(
        GridShape::new(4, 2)?,
        &ids,
        "boundary",
        store.records(),
        &mut rng
    )
    .is_err());
    Ok(())
}

#[test]
fn test_sample_general_lays_out_categories() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &TRAIN_IDS);
    let store = ManifestStore::load(&fixture.manifest_dir)?;
    let ids = image_names(&fixture.root, &[Split::Train])?;
    let mut rng = StdRng::seed_from_u64(11);

    for count in [4, 10] {
        assert!(matches!(
            sample_general(count, &ids, store.records(), &mut rng),
            Err(AgriVisionError::Configuration { .. })
        ));
    }

    let sample = sample_general(5, &ids, store.records(), &mut rng)?;
    assert_eq!(sample.images.len(), 5);
    assert_eq!(sample.identifiers.iter().collect::<HashSet<_>>().len(), 5);
    assert_eq!(sample.figure.shape(), (5, sample.columns.len()));
    assert_eq!(sample.columns.len(), 5);

    let first_row_titles: Vec<_> = (0..sample.columns.len())
        .filter_map(|col| sample.figure.panel(0, col).and_then(|p| p.title.clone()))
        .collect();
    assert_eq!(first_row_titles.len(), sample.columns.len());
    assert!(first_row_titles.contains(&"water".to_string()));
    assert!(first_row_titles.contains(&"double_plant".to_string()));
    assert!(sample.figure.panel(1, 0).and_then(|p| p.title.clone()).is_none());
    Ok(())
}

#[test]
fn test_run_inspection_persists_figure() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &TRAIN_IDS);
    let output_dir = temp_dir.path().join("images");

    let args = inspect_args(&fixture, &output_dir, &["--mode", "specific", "--rows", "2", "--cols", "2"]);
    let figure = run_inspection(&args, &LogViewer)?;
    assert_eq!(figure.shape(), (2, 2));
    assert!(output_dir.join("inspected-specific.png").exists());

    let args = inspect_args(&fixture, &output_dir, &["--mode", "general", "--save", "false"]);
    run_inspection(&args, &LogViewer)?;
    assert!(!output_dir.join("inspected-general.png").exists());
    Ok(())
}

#[test]
fn test_run_inspection_requires_manifests() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &TRAIN_IDS);
    std::fs::remove_file(fixture.manifest_dir.join("val.json"))?;

    let args = inspect_args(&fixture, temp_dir.path(), &[]);
    assert!(matches!(
        run_inspection(&args, &LogViewer),
        Err(AgriVisionError::MissingResource { .. })
    ));
    Ok(())
}

#[test]
fn test_image_names_across_all_splits() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = Fixture::new(temp_dir.path(), &["t1", "t0"]);

    let ids = image_names(&fixture.root, &Split::ALL)?;
    assert_eq!(ids, vec!["t0", "t1", "val-1", "test-1"]);
    Ok(())
}

#[test]
fn test_general_sample_rejects_mismatched_categories() -> agrivision_seg::Result<()> {
    let temp_dir = TempDir::new()?;
    let ids = ["t0", "t1", "t2", "t3", "t4"];
    let fixture = Fixture::new(temp_dir.path(), &ids);

    let train_manifest = fixture.manifest_dir.join("train.json");
    let mut records: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&train_manifest)?).unwrap();
    records[2]
        .as_object_mut()
        .and_then(|record| record.remove("nir"))
        .expect("fixture records carry nir");
    fs::write(&train_manifest, records.to_string())?;

    let store = ManifestStore::load(&fixture.manifest_dir)?;
    let ids = image_names(&fixture.root, &[Split::Train])?;
    let mut rng = StdRng::seed_from_u64(5);
    assert!(matches!(
        sample_general(ids.len(), &ids, store.records(), &mut rng),
        Err(AgriVisionError::InconsistentCategories { .. })
    ));
    Ok(())
}
