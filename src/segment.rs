//! Running a farmland anomaly model on images or dataset items, scoring it
//! and drawing its segmentation contours.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use imageproc::contours::find_contours;
use ndarray::prelude::*;
use tracing::{debug, info};

use crate::assembler::decode_category;
use crate::dataset::Dataset;
use crate::errors::{AgriVisionError, Result};
use crate::figure::{present, Figure, FigureViewer, Panel};
use crate::loss::CustomObjects;
use crate::manifest::{PathRecord, Split};
use crate::model::preprocess;
use crate::traits::SegmentationBackend;

/// Probability above which a pixel is considered part of a class.
pub const THRESHOLD: f32 = 0.5;

/// Contour colours, cycled per class.
const PALETTE: [Rgb<u8>; 9] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([255, 225, 25]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
    Rgb([210, 245, 60]),
];

/// Image data handed directly to the model.
#[derive(Debug, Clone)]
pub enum RawImageData {
    /// Decoded pixels that still need resizing and scaling.
    Pixels(DynamicImage),
    /// A `1 × H × W × C` tensor already in the model's input layout.
    Tensor(Array4<f32>),
}

/// What to run the model on.
#[derive(Debug, Clone)]
pub enum ModelInput<'a> {
    DatasetReference {
        dataset: &'a Dataset,
        split: Split,
        identifier: String,
    },
    RawImage(RawImageData),
}

impl<'a> ModelInput<'a> {
    pub fn reference(dataset: &'a Dataset, split: Split, identifier: impl Into<String>) -> Self {
        Self::DatasetReference {
            dataset,
            split,
            identifier: identifier.into(),
        }
    }

    pub fn image(image: DynamicImage) -> Self {
        Self::RawImage(RawImageData::Pixels(image))
    }

    fn label(&self) -> String {
        match self {
            ModelInput::DatasetReference {
                split, identifier, ..
            } => format!("{split}/{identifier}"),
            ModelInput::RawImage(_) => "raw image".to_string(),
        }
    }
}

/// Binary `H × W × C` segmentation, one channel per class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMap {
    masks: Array3<u8>,
}

impl SegmentationMap {
    pub const fn new(masks: Array3<u8>) -> Self {
        Self { masks }
    }

    pub fn from_probabilities(probabilities: ArrayView3<f32>, threshold: f32) -> Self {
        Self {
            masks: probabilities.mapv(|p| u8::from(p > threshold)),
        }
    }

    pub fn masks(&self) -> ArrayView3<u8> {
        self.masks.view()
    }

    pub fn channels(&self) -> usize {
        self.masks.len_of(Axis(2))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width, _) = self.masks.dim();
        (width as u32, height as u32)
    }

    /// Channel `index` as a 0/255 mask image.
    pub fn channel_image(&self, index: usize) -> Option<GrayImage> {
        if index >= self.channels() {
            return None;
        }
        let (width, height) = self.dimensions();
        let channel = self.masks.index_axis(Axis(2), index);
        Some(GrayImage::from_fn(width, height, |x, y| {
            Luma([if channel[[y as usize, x as usize]] > 0 { 255 } else { 0 }])
        }))
    }

    pub fn to_probabilities(&self) -> Array3<f32> {
        self.masks.mapv(f32::from)
    }
}

/// Outlines every non-background channel of `segmentation` on `base`.
pub fn draw_segmentation_map(base: &RgbImage, segmentation: &SegmentationMap) -> RgbImage {
    let mut annotated = base.clone();
    let (width, height) = base.dimensions();
    for index in 1..segmentation.channels() {
        let Some(mask) = segmentation.channel_image(index) else {
            continue;
        };
        let mask = if mask.dimensions() == (width, height) {
            mask
        } else {
            imageops::resize(&mask, width, height, FilterType::Nearest)
        };
        let colour = PALETTE[(index - 1) % PALETTE.len()];
        for contour in find_contours::<u32>(&mask) {
            for point in contour.points {
                if point.x < width && point.y < height {
                    annotated.put_pixel(point.x, point.y, colour);
                }
            }
        }
    }
    annotated
}

/// Ground truth of a dataset record: channel 0 is background, channel `i`
/// is `label_<class i>`, all resized to `width × height`.
pub fn ground_truth(dataset: &Dataset, record: &PathRecord, width: u32, height: u32) -> Result<SegmentationMap> {
    let classes = dataset.classes();
    let mut masks = Array3::<u8>::zeros((height as usize, width as usize, classes.len()));
    for index in 1..classes.len() {
        let Some(category) = classes.label_category(index) else {
            continue;
        };
        let label = decode_category(record, &category)?.to_luma8();
        let label = if label.dimensions() == (width, height) {
            label
        } else {
            imageops::resize(&label, width, height, FilterType::Nearest)
        };
        for (x, y, Luma([value])) in label.enumerate_pixels() {
            if *value > 0 {
                masks[[y as usize, x as usize, index]] = 1;
            }
        }
    }
    let labelled = masks.slice(s![.., .., 1..]).map_axis(Axis(2), |v| v.iter().any(|&m| m > 0));
    masks
        .index_axis_mut(Axis(2), 0)
        .zip_mut_with(&labelled, |bg, &set| *bg = u8::from(!set));
    Ok(SegmentationMap::new(masks))
}

/// A segmentation network together with the auxiliary functions it was
/// trained against.
pub struct FarmlandAnomalyModel<B: SegmentationBackend> {
    backend: B,
    custom_objects: CustomObjects,
    artifact: Option<PathBuf>,
}

impl<B: SegmentationBackend> FarmlandAnomalyModel<B> {
    pub const fn new(backend: B, custom_objects: CustomObjects) -> Self {
        Self {
            backend,
            custom_objects,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub const fn custom_objects(&self) -> &CustomObjects {
        &self.custom_objects
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn summary(&self) -> String {
        let objects = self.custom_objects.keys().cloned().collect::<Vec<_>>();
        format!("{} (custom objects: [{}])", self.backend.summary(), objects.join(", "))
    }

    fn resolve_tensor(&self, input: &ModelInput<'_>) -> Result<Array4<f32>> {
        let shape = self.backend.input_shape();
        let tensor = match input {
            ModelInput::DatasetReference {
                dataset,
                split,
                identifier,
            } => {
                let record = dataset.record(*split, identifier)?;
                preprocess(&dataset_input(record, shape.channels)?, shape)?
            }
            ModelInput::RawImage(RawImageData::Pixels(image)) => preprocess(&image.to_rgba8(), shape)?,
            ModelInput::RawImage(RawImageData::Tensor(tensor)) => tensor.clone(),
        };

        let expected = [1, shape.height as usize, shape.width as usize, shape.channels];
        if tensor.shape() != &expected[..] {
            return Err(AgriVisionError::validation(
                "model input",
                format!("has shape {:?}, expected {:?}", tensor.shape(), expected),
            ));
        }
        Ok(tensor)
    }

    /// Per-pixel class probabilities, `H × W × classes`.
    pub fn predict_probabilities(&self, input: &ModelInput<'_>) -> Result<Array3<f32>> {
        let tensor = self.resolve_tensor(input)?;
        debug!("Running inference on {}", input.label());
        let output = self.backend.predict(tensor.view())?;
        if output.len_of(Axis(0)) != 1 {
            return Err(AgriVisionError::validation(
                "model output",
                format!("has batch size {}, expected 1", output.len_of(Axis(0))),
            ));
        }
        Ok(output.index_axis_move(Axis(0), 0))
    }

    /// Thresholded multi-channel segmentation of `input`.
    pub fn predict(&self, input: &ModelInput<'_>) -> Result<SegmentationMap> {
        let probabilities = self.predict_probabilities(input)?;
        Ok(SegmentationMap::from_probabilities(probabilities.view(), THRESHOLD))
    }

    /// Ground truth of a dataset reference at the model's output resolution.
    pub fn ground_truth(&self, input: &ModelInput<'_>) -> Result<SegmentationMap> {
        let ModelInput::DatasetReference {
            dataset,
            split,
            identifier,
        } = input
        else {
            return Err(AgriVisionError::configuration(
                "ground truth is only available for dataset references",
            ));
        };
        let shape = self.backend.input_shape();
        let record = dataset.record(*split, identifier)?;
        ground_truth(dataset, record, shape.width, shape.height)
    }

    /// Scores the prediction for a dataset item with every attached
    /// auxiliary function.
    pub fn evaluate(&self, input: &ModelInput<'_>) -> Result<BTreeMap<String, f32>> {
        let truth = self.ground_truth(input)?.to_probabilities();
        let predicted = self.predict_probabilities(input)?;
        self.custom_objects
            .iter()
            .map(|(name, function)| Ok((name.clone(), function.compute(truth.view(), predicted.view())?)))
            .collect()
    }

    /// Draws predicted (and optionally true) contours on the input image and
    /// presents the composed figure.
    pub fn show_segmented_predictions(
        &self,
        input: &ModelInput<'_>,
        with_truth: bool,
        viewer: &dyn FigureViewer,
        persist_to: Option<&Path>,
        cell_size: u32,
    ) -> Result<Figure> {
        if with_truth && matches!(input, ModelInput::RawImage(_)) {
            return Err(AgriVisionError::configuration(
                "with_truth requires a dataset reference",
            ));
        }

        let predicted = self.predict(input)?;
        let base = displayable_image(input)?;
        let mut panels = vec![
            Panel {
                title: Some("Image".to_string()),
                image: DynamicImage::ImageRgb8(base.clone()),
            },
            Panel {
                title: Some("Predicted".to_string()),
                image: DynamicImage::ImageRgb8(draw_segmentation_map(&base, &predicted)),
            },
        ];
        if with_truth {
            let truth = self.ground_truth(input)?;
            panels.push(Panel {
                title: Some("Ground Truth".to_string()),
                image: DynamicImage::ImageRgb8(draw_segmentation_map(&base, &truth)),
            });
        }

        let figure = Figure::new(1, panels.len(), panels)?;
        info!("Segmented {}", input.label());
        present(&figure, viewer, persist_to, cell_size)?;
        Ok(figure)
    }
}

impl<B: SegmentationBackend> fmt::Display for FarmlandAnomalyModel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Stacks `rgb` with `nir` for 4-channel models; 3-channel models use `rgb`
/// alone.
fn dataset_input(record: &PathRecord, channels: usize) -> Result<RgbaImage> {
    let rgb = decode_category(record, "rgb")?.to_rgb8();
    if channels != 4 {
        return Ok(DynamicImage::ImageRgb8(rgb).to_rgba8());
    }

    let nir = decode_category(record, "nir")?.to_luma8();
    if nir.dimensions() != rgb.dimensions() {
        return Err(AgriVisionError::validation(
            "nir image",
            format!(
                "of {} is {:?}, rgb is {:?}",
                record.id,
                nir.dimensions(),
                rgb.dimensions()
            ),
        ));
    }
    Ok(RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        let Luma([n]) = *nir.get_pixel(x, y);
        image::Rgba([r, g, b, n])
    }))
}

/// RGB rendering of the model input for annotation.
fn displayable_image(input: &ModelInput<'_>) -> Result<RgbImage> {
    match input {
        ModelInput::DatasetReference {
            dataset,
            split,
            identifier,
        } => {
            let record = dataset.record(*split, identifier)?;
            Ok(decode_category(record, "rgb")?.to_rgb8())
        }
        ModelInput::RawImage(RawImageData::Pixels(image)) => Ok(image.to_rgb8()),
        ModelInput::RawImage(RawImageData::Tensor(tensor)) => {
            let (_, height, width, channels) = tensor.dim();
            if channels < 3 {
                return Err(AgriVisionError::validation(
                    "input tensor",
                    format!("has {channels} channels, cannot display"),
                ));
            }
            Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let pixel = |c: usize| {
                    (tensor[[0, y as usize, x as usize, c]].clamp(0.0, 1.0) * 255.0).round() as u8
                };
                Rgb([pixel(0), pixel(1), pixel(2)])
            }))
        }
    }
}
