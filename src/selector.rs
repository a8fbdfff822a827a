//! Choosing a trained model artifact by shortcut name or path.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{AgriVisionError, Result};
use crate::loss::{resolve_auxiliary, CustomObjects, CustomObjectsSpec};
use crate::model::OnnxModel;
use crate::segment::FarmlandAnomalyModel;
use crate::traits::SegmentationBackend;

pub const MODEL_EXTENSION: &str = "onnx";
pub const DEFAULT_MODELS_ROOT: &str = "logs/save";

/// The three checkpoints saved over the course of training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Dice loss, 20 epochs.
    Stage1,
    /// Dice then surface channel loss, 40 epochs.
    Stage2,
    /// Dice, surface channel, then dice again, 60 epochs.
    Stage3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Stage1, Stage::Stage2, Stage::Stage3];

    pub const fn shortcuts(self) -> &'static [&'static str] {
        match self {
            Stage::Stage1 => &["dice20", "20", "first", "stage1"],
            Stage::Stage2 => &["scl40", "40", "middle", "stage2", "intermediate"],
            Stage::Stage3 => &["dice60", "60", "last", "final", "stage3"],
        }
    }

    pub fn from_shortcut(token: &str) -> Option<Self> {
        let token = token.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.shortcuts().contains(&token.as_str()))
    }

    pub const fn artifact_name(self) -> &'static str {
        match self {
            Stage::Stage1 => "Model-Dice2D-20.onnx",
            Stage::Stage2 => "Model-Dice-SCL-40.onnx",
            Stage::Stage3 => "Model-Dice-SCL-Dice-60.onnx",
        }
    }

    pub const fn auxiliary(self) -> &'static str {
        match self {
            Stage::Stage1 | Stage::Stage3 => "dice",
            Stage::Stage2 => "scl",
        }
    }
}

/// A resolved model choice, before anything is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub artifact: PathBuf,
    pub custom_objects: CustomObjects,
    pub stage: Option<Stage>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    models_root: PathBuf,
    device_id: i32,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MODELS_ROOT, 0)
    }
}

impl ModelSelector {
    pub fn new(models_root: impl Into<PathBuf>, device_id: i32) -> Self {
        Self {
            models_root: models_root.into(),
            device_id,
        }
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Maps `token` to an artifact and its custom objects. Tokens ending in
    /// `.onnx` are paths and must exist; anything else must be a stage
    /// shortcut.
    pub fn select(
        &self,
        token: &str,
        custom_objects: Option<CustomObjectsSpec>,
    ) -> Result<ModelSelection> {
        if is_model_path(token) {
            let artifact = PathBuf::from(token);
            if !artifact.is_file() {
                return Err(AgriVisionError::missing("model file", artifact));
            }
            let custom_objects = custom_objects
                .map(CustomObjectsSpec::into_objects)
                .transpose()?
                .unwrap_or_default();
            return Ok(ModelSelection {
                artifact,
                custom_objects,
                stage: None,
            });
        }

        let stage = Stage::from_shortcut(token).ok_or_else(|| AgriVisionError::InvalidShortcut {
            kind: "model".to_string(),
            value: token.to_string(),
        })?;
        if custom_objects.is_some() {
            warn!("Ignoring custom objects for shortcut {token:?}; {stage:?} carries its own");
        }
        Ok(ModelSelection {
            artifact: self.models_root.join(stage.artifact_name()),
            custom_objects: resolve_auxiliary(stage.auxiliary())?,
            stage: Some(stage),
        })
    }

    /// Selects and loads `token` with `load`.
    pub fn initialize_with<B, F>(
        &self,
        token: &str,
        custom_objects: Option<CustomObjectsSpec>,
        load: F,
    ) -> Result<FarmlandAnomalyModel<B>>
    where
        B: SegmentationBackend,
        F: FnOnce(&Path) -> Result<B>,
    {
        let selection = self.select(token, custom_objects)?;
        debug!(
            "Selected {} for {token:?} with custom objects {:?}",
            selection.artifact.display(),
            selection.custom_objects.keys().collect::<Vec<_>>()
        );
        let backend = load(&selection.artifact)?;
        Ok(FarmlandAnomalyModel::new(backend, selection.custom_objects).with_artifact(selection.artifact))
    }

    /// Selects `token` and loads it into an ONNX Runtime session.
    pub fn initialize(
        &self,
        token: &str,
        custom_objects: Option<CustomObjectsSpec>,
    ) -> Result<FarmlandAnomalyModel<OnnxModel>> {
        self.initialize_with(token, custom_objects, |path| {
            OnnxModel::new(path, self.device_id)
        })
    }

    /// Loads one model per token with `load`, stopping at the first failure.
    pub fn initialize_many_with<S, B, F>(
        &self,
        tokens: &[S],
        mut load: F,
    ) -> Result<Vec<FarmlandAnomalyModel<B>>>
    where
        S: AsRef<str>,
        B: SegmentationBackend,
        F: FnMut(&Path) -> Result<B>,
    {
        tokens
            .iter()
            .map(|token| self.initialize_with(token.as_ref(), None, &mut load))
            .collect()
    }

    /// Initializes one ONNX model per token, stopping at the first failure.
    pub fn initialize_many<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<Vec<FarmlandAnomalyModel<OnnxModel>>> {
        self.initialize_many_with(tokens, |path| OnnxModel::new(path, self.device_id))
    }
}

fn is_model_path(token: &str) -> bool {
    Path::new(token)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LossFunction;
    use crate::mocks::create_mock_model;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_shortcut_groups_select_identical_artifacts() -> Result<()> {
        let selector = ModelSelector::default();

        assert_eq!(selector.select("stage1", None)?, selector.select("dice20", None)?);
        assert_eq!(selector.select("FIRST", None)?, selector.select("20", None)?);
        assert_eq!(
            selector.select("intermediate", None)?,
            selector.select("scl40", None)?
        );
        assert_eq!(selector.select("final", None)?, selector.select("60", None)?);

        let stage2 = selector.select("middle", None)?;
        assert_eq!(stage2.artifact, Path::new("logs/save/Model-Dice-SCL-40.onnx"));
        assert_eq!(
            stage2.custom_objects.get("surface_loss_2d"),
            Some(&LossFunction::SurfaceChannel)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_shortcut_fails_loudly() {
        match ModelSelector::default().select("stage4", None) {
            Err(AgriVisionError::InvalidShortcut { kind, value }) => {
                assert_eq!(kind, "model");
                assert_eq!(value, "stage4");
            }
            other => panic!("expected invalid shortcut, got {other:?}"),
        }
    }

    #[test]
    fn test_path_token_must_exist() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let missing = temp_dir.path().join("missing.onnx");
        assert!(matches!(
            ModelSelector::default().select(missing.to_str().unwrap(), None),
            Err(AgriVisionError::MissingResource { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_path_token_attaches_custom_objects() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model_path = temp_dir.path().join("custom.ONNX");
        fs::write(&model_path, b"dummy_model")?;
        let token = model_path.to_str().unwrap();
        let selector = ModelSelector::default();

        let plain = selector.select(token, None)?;
        assert!(plain.custom_objects.is_empty());
        assert_eq!(plain.stage, None);

        let with_shortcut =
            selector.select(token, Some(CustomObjectsSpec::Shortcut("surface".into())))?;
        assert_eq!(with_shortcut.custom_objects, resolve_auxiliary("scl")?);

        assert!(matches!(
            selector.select(token, Some(CustomObjectsSpec::Shortcut("bogus".into()))),
            Err(AgriVisionError::InvalidShortcut { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_initialize_with_loads_selected_artifact() -> Result<()> {
        let selector = ModelSelector::new("weights", 0);
        let mut loaded = None;

        let model = selector.initialize_with("last", None, |path| {
            loaded = Some(path.to_path_buf());
            Ok(create_mock_model(3))
        })?;

        assert_eq!(loaded.as_deref(), Some(Path::new("weights/Model-Dice-SCL-Dice-60.onnx")));
        assert_eq!(model.artifact(), loaded.as_deref());
        assert!(model.custom_objects().contains_key("dice_loss_2d"));
        assert!(model.to_string().contains("dice_loss_2d"));
        Ok(())
    }
}
