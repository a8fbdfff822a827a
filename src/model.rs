use std::path::Path;

use crate::{
    errors::{AgriVisionError, Result},
    traits::{InputShape, SegmentationBackend},
};
use image::{imageops, imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Spatial size used when the exported graph leaves height or width dynamic.
pub const DEFAULT_IMAGE_SIZE: u32 = 512;

pub struct OnnxModel {
    input_shape: InputShape,
    input_name: String,
    output_name: String,
    summary: String,
    session: Mutex<Session>,
}

fn model_error(operation: impl Into<String>, source: ort::Error) -> AgriVisionError {
    AgriVisionError::Model {
        operation: operation.into(),
        source: Box::new(source),
    }
}

impl OnnxModel {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        if !model_path.exists() {
            return Err(AgriVisionError::missing("model file", model_path));
        }

        let mut session = SessionBuilder::new()
            .map_err(|e| model_error("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| model_error("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| model_error("memory pattern setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| model_error(format!("model load: {}", model_path.display()), e))?;

        let input = session.inputs.first().ok_or_else(|| {
            AgriVisionError::validation("model", "declares no inputs")
        })?;
        let output = session.outputs.first().ok_or_else(|| {
            AgriVisionError::validation("model", "declares no outputs")
        })?;
        let dims: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| AgriVisionError::validation("model input", "is not a tensor"))?;
        let input_shape = input_shape_from_dims(&dims)?;

        let input_name = input.name.clone();
        let output_name = output.name.clone();
        let summary = format!(
            "{}: input {:?} {:?} -> output {:?} {:?}",
            model_path.display(),
            input_name,
            dims,
            output_name,
            output.output_type.tensor_shape().map(|s| s.iter().copied().collect::<Vec<i64>>()),
        );

        // warm up
        let data = Array4::<f32>::zeros((
            1,
            input_shape.height as usize,
            input_shape.width as usize,
            input_shape.channels,
        ));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| model_error("warm-up tensor creation", e))?])
            .map_err(|e| model_error("warm-up run", e))?;

        info!("Loaded model {}", model_path.display());
        debug!("{summary}");
        Ok(Self {
            input_shape,
            input_name,
            output_name,
            summary,
            session: Mutex::new(session),
        })
    }
}

impl SegmentationBackend for OnnxModel {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?],
        )?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }

    fn summary(&self) -> String {
        self.summary.clone()
    }
}

/// Reads `[batch, height, width, channels]`, substituting
/// [`DEFAULT_IMAGE_SIZE`] for dynamic spatial dimensions.
pub fn input_shape_from_dims(dims: &[i64]) -> Result<InputShape> {
    let [_, height, width, channels] = *dims else {
        return Err(AgriVisionError::validation(
            "model input",
            format!("should be NHWC with 4 dimensions, got {dims:?}"),
        ));
    };
    let spatial = |d: i64| if d > 0 { d as u32 } else { DEFAULT_IMAGE_SIZE };
    if channels != 3 && channels != 4 {
        return Err(AgriVisionError::validation(
            "model input",
            format!("should take 3 (RGB) or 4 (RGB+NIR) channels, got {channels}"),
        ));
    }
    Ok(InputShape::new(spatial(height), spatial(width), channels as usize))
}

fn to_tensor(chw: ArrayView3<u8>) -> Array4<f32> {
    chw.permuted_axes([1, 2, 0])
        .insert_axis(Axis(0))
        .mapv(|v| f32::from(v) / 255.0)
}

/// Resizes an RGB or RGB+NIR image to the network input and scales it into
/// a `1 × H × W × C` tensor in `[0, 1]`.
pub fn preprocess(image: &RgbaImage, shape: InputShape) -> Result<Array4<f32>> {
    let resized = if image.dimensions() == (shape.width, shape.height) {
        image.clone()
    } else {
        imageops::resize(image, shape.width, shape.height, FilterType::Lanczos3)
    };
    match shape.channels {
        4 => Ok(to_tensor(resized.as_ndarray3())),
        3 => {
            let rgb: RgbImage = DynamicImage::ImageRgba8(resized).to_rgb8();
            Ok(to_tensor(rgb.as_ndarray3()))
        }
        channels => Err(AgriVisionError::validation(
            "model input",
            format!("cannot be built with {channels} channels"),
        )),
    }
}
