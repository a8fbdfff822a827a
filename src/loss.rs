//! Auxiliary loss functions the trained artifacts are paired with.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::prelude::*;

use crate::errors::{AgriVisionError, Result};

const SMOOTH: f32 = 1.0;

/// A named auxiliary function, scored on `H × W × C` maps in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossFunction {
    Dice,
    SurfaceChannel,
}

impl LossFunction {
    /// Name the function is registered under in a custom object mapping.
    pub const fn registered_name(self) -> &'static str {
        match self {
            LossFunction::Dice => "dice_loss_2d",
            LossFunction::SurfaceChannel => "surface_loss_2d",
        }
    }

    pub fn compute(self, truth: ArrayView3<f32>, predicted: ArrayView3<f32>) -> Result<f32> {
        if truth.shape() != predicted.shape() {
            return Err(AgriVisionError::validation(
                "loss inputs",
                format!(
                    "have mismatched shapes {:?} and {:?}",
                    truth.shape(),
                    predicted.shape()
                ),
            ));
        }
        Ok(match self {
            LossFunction::Dice => dice_loss_2d(truth, predicted),
            LossFunction::SurfaceChannel => surface_channel_loss_2d(truth, predicted),
        })
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registered_name())
    }
}

/// Mapping of registered name to auxiliary function attached to a model.
pub type CustomObjects = BTreeMap<String, LossFunction>;

/// Custom objects as supplied by a caller: an explicit mapping or a shortcut
/// keyword understood by [`resolve_auxiliary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomObjectsSpec {
    Mapping(CustomObjects),
    Shortcut(String),
}

impl CustomObjectsSpec {
    pub fn into_objects(self) -> Result<CustomObjects> {
        match self {
            CustomObjectsSpec::Mapping(objects) => Ok(objects),
            CustomObjectsSpec::Shortcut(token) => resolve_auxiliary(&token),
        }
    }
}

/// `"dice"` resolves to the dice loss; `"scl"` and `"surface"` to the
/// surface channel loss.
pub fn resolve_auxiliary(token: &str) -> Result<CustomObjects> {
    let function = match token.to_lowercase().as_str() {
        "dice" => LossFunction::Dice,
        "scl" | "surface" => LossFunction::SurfaceChannel,
        _ => {
            return Err(AgriVisionError::InvalidShortcut {
                kind: "custom object".to_string(),
                value: token.to_string(),
            })
        }
    };
    Ok(CustomObjects::from([(
        function.registered_name().to_string(),
        function,
    )]))
}

/// Smoothed soft dice loss over every pixel and channel at once.
pub fn dice_loss_2d(truth: ArrayView3<f32>, predicted: ArrayView3<f32>) -> f32 {
    let intersection = (&truth * &predicted).sum();
    let total = truth.sum() + predicted.sum();
    1.0 - (2.0 * intersection + SMOOTH) / (total + SMOOTH)
}

/// Dice loss computed per channel and averaged over channels.
pub fn surface_channel_loss_2d(truth: ArrayView3<f32>, predicted: ArrayView3<f32>) -> f32 {
    let channels = truth.len_of(Axis(2));
    if channels == 0 {
        return 0.0;
    }
    let total: f32 = truth
        .axis_iter(Axis(2))
        .zip(predicted.axis_iter(Axis(2)))
        .map(|(t, p)| {
            let t = t.insert_axis(Axis(2));
            let p = p.insert_axis(Axis(2));
            dice_loss_2d(t, p)
        })
        .sum();
    total / channels as f32
}
