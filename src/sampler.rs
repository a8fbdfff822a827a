//! Random sampling of dataset images into inspection figures.

use std::time::Instant;

use image::DynamicImage;
use indexmap::IndexSet;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::assembler::{assemble_all, assemble_one, AssembledImage};
use crate::dataset::LABEL_PREFIX;
use crate::errors::{AgriVisionError, Result};
use crate::figure::{Figure, Panel};
use crate::manifest::PathRecord;

/// Exclusive bounds on the number of items in a general sample.
pub const GENERAL_COUNT_RANGE: (usize, usize) = (4, 10);

/// Rows × columns of a specific-category sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        Self::try_from(&[rows, cols][..])
    }

    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<&[usize]> for GridShape {
    type Error = AgriVisionError;

    fn try_from(shape: &[usize]) -> Result<Self> {
        match *shape {
            [rows, cols] if rows > 0 && cols > 0 => Ok(Self { rows, cols }),
            [_, _] => Err(AgriVisionError::configuration(format!(
                "grid shape {shape:?} must be positive"
            ))),
            _ => Err(AgriVisionError::configuration(format!(
                "grid shape {shape:?} should have 2 elements, got {}",
                shape.len()
            ))),
        }
    }
}

pub fn validate_general_count(count: usize) -> Result<usize> {
    let (low, high) = GENERAL_COUNT_RANGE;
    if low < count && count < high {
        Ok(count)
    } else {
        Err(AgriVisionError::configuration(format!(
            "number of images should be in range ({low}, {high}), got {count}"
        )))
    }
}

/// Draws `amount` distinct identifiers uniformly without replacement.
pub fn choose_distinct<R: Rng + ?Sized>(
    identifiers: &[String],
    amount: usize,
    rng: &mut R,
) -> Result<Vec<String>> {
    let unique = identifiers.iter().collect::<IndexSet<_>>();
    if amount > unique.len() {
        return Err(AgriVisionError::validation(
            "identifiers",
            format!(
                "cannot draw {amount} distinct images from {} available",
                unique.len()
            ),
        ));
    }
    let pool = unique.into_iter().collect::<Vec<_>>();
    Ok(pool
        .choose_multiple(rng, amount)
        .map(|id| (*id).clone())
        .collect())
}

fn gather<T>(
    identifiers: &[String],
    mut load: impl FnMut(&str) -> Result<T>,
) -> Result<Vec<T>> {
    let progress_bar = ProgressBar::new(identifiers.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        progress_bar.set_style(style.progress_chars("#>-"));
    }

    let start = Instant::now();
    let loaded = identifiers
        .iter()
        .map(|id| {
            let item = load(id)?;
            progress_bar.inc(1);
            Ok(item)
        })
        .collect::<Result<Vec<_>>>();
    progress_bar.finish_and_clear();
    let loaded = loaded?;
    info!("Gathered images to display, took {:?}", start.elapsed());
    Ok(loaded)
}

/// A sample of one category for each drawn identifier.
#[derive(Debug, Clone)]
pub struct SpecificSample {
    pub identifiers: Vec<String>,
    pub images: Vec<DynamicImage>,
    pub figure: Figure,
}

/// A sample of every category for each drawn identifier.
#[derive(Debug, Clone)]
pub struct GeneralSample {
    pub identifiers: Vec<String>,
    pub columns: Vec<String>,
    pub images: Vec<AssembledImage>,
    pub figure: Figure,
}

/// Draws `grid.rows * grid.cols` identifiers and lays out their `category`
/// images in draw order.
pub fn sample_specific<R: Rng + ?Sized>(
    grid: GridShape,
    identifiers: &[String],
    category: &str,
    records: &[PathRecord],
    rng: &mut R,
) -> Result<SpecificSample> {
    let chosen = choose_distinct(identifiers, grid.len(), rng)?;
    let images = gather(&chosen, |id| assemble_one(id, category, records))?;

    let panels = images
        .iter()
        .map(|image| Panel {
            title: None,
            image: image.clone(),
        })
        .collect();
    let figure = Figure::new(grid.rows, grid.cols, panels)?;

    Ok(SpecificSample {
        identifiers: chosen,
        images,
        figure,
    })
}

/// Draws `count` identifiers, one figure row each, one column per category.
pub fn sample_general<R: Rng + ?Sized>(
    count: usize,
    identifiers: &[String],
    records: &[PathRecord],
    rng: &mut R,
) -> Result<GeneralSample> {
    let count = validate_general_count(count)?;
    let chosen = choose_distinct(identifiers, count, rng)?;
    let images = gather(&chosen, |id| assemble_all(id, records))?;

    let columns = images
        .first()
        .map(|first| first.categories().map(str::to_owned).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut panels = Vec::with_capacity(count * columns.len());
    for (row, (id, assembled)) in chosen.iter().zip(&images).enumerate() {
        if assembled.len() != columns.len() {
            return Err(AgriVisionError::InconsistentCategories { id: id.clone() });
        }
        for category in &columns {
            let image = assembled
                .get(category)
                .ok_or_else(|| AgriVisionError::InconsistentCategories { id: id.clone() })?;
            panels.push(Panel {
                title: (row == 0).then(|| column_title(category).to_string()),
                image: image.clone(),
            });
        }
    }
    let figure = Figure::new(count, columns.len(), panels)?;

    Ok(GeneralSample {
        identifiers: chosen,
        columns,
        images,
        figure,
    })
}

/// Display title of a category: `label_` categories lose their prefix.
pub fn column_title(category: &str) -> &str {
    if category.contains("label") {
        category.get(LABEL_PREFIX.len()..).unwrap_or(category)
    } else {
        category
    }
}
