use crate::errors::Result;
use ndarray::prelude::*;

/// Spatial size and channel count a segmentation network expects (NHWC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    pub channels: usize,
}

impl InputShape {
    pub const fn new(height: u32, width: u32, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

/// Inference backend behind a farmland anomaly model.
pub trait SegmentationBackend: Send + Sync {
    /// Shape of a single NHWC input item.
    fn input_shape(&self) -> InputShape;

    /// Raw network output, `N × H × W × classes` probabilities.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Human-readable description of the network's inputs and outputs.
    fn summary(&self) -> String;
}
