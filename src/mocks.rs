use crate::errors::Result;
use crate::traits::{InputShape, SegmentationBackend};
use ndarray::prelude::*;

/// Test backend that marks every pixel whose first input channel is above
/// one half as class 1 and everything else as background.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub input_shape: InputShape,
    pub classes: usize,
}

impl MockSegmentationModel {
    pub const fn new(input_shape: InputShape, classes: usize) -> Self {
        Self {
            input_shape,
            classes,
        }
    }
}

impl SegmentationBackend for MockSegmentationModel {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch, height, width, _) = tensor.dim();
        let mut output = Array4::<f32>::zeros((batch, height, width, self.classes));
        for ((n, y, x, _), value) in tensor.slice(s![.., .., .., 0..1]).indexed_iter() {
            let class = usize::from(*value > 0.5);
            if class < self.classes {
                output[[n, y, x, class]] = 1.0;
            }
        }
        Ok(output)
    }

    fn summary(&self) -> String {
        format!("mock: input {:?} -> {} classes", self.input_shape, self.classes)
    }
}

/// Mock with a 3-channel 8×8 input and `classes` outputs.
pub const fn create_mock_model(classes: usize) -> MockSegmentationModel {
    MockSegmentationModel::new(InputShape::new(8, 8, 3), classes)
}
