//! On-disk Agriculture-Vision layout: image enumeration and the class
//! dictionary, plus the [`Dataset`] context that bundles them with the
//! manifests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{AgriVisionError, Result};
use crate::manifest::{ManifestStore, PathRecord, Split};

pub const BACKGROUND: &str = "background";
pub const LABEL_PREFIX: &str = "label_";

/// Label index to class name. Index 0 is always background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDictionary {
    classes: BTreeMap<usize, String>,
}

impl ClassDictionary {
    /// Builds the dictionary from the subdirectories of
    /// `<dataset_dir>/train/labels`, sorted by name.
    pub fn from_dataset(dataset_dir: &Path) -> Result<Self> {
        let label_dir = dataset_dir.join(Split::Train.as_str()).join("labels");
        if !label_dir.is_dir() {
            return Err(AgriVisionError::missing("label directory", label_dir));
        }

        let mut names = WalkDir::new(&label_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_owned))
            .filter(|name| !name.starts_with('.'))
            .collect::<Vec<_>>();
        names.sort();

        debug!("Found {} label classes in {}", names.len(), label_dir.display());
        Ok(Self::from_names(names))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes = std::iter::once(BACKGROUND.to_string())
            .chain(names.into_iter().map(Into::into))
            .enumerate()
            .collect();
        Self { classes }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.classes.get(&index).map(String::as_str)
    }

    /// Manifest category holding the mask of class `index`; `None` for
    /// background, which has no file of its own.
    pub fn label_category(&self, index: usize) -> Option<String> {
        match index {
            0 => None,
            _ => self.get(index).map(|name| format!("{LABEL_PREFIX}{name}")),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.classes.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Identifiers of every image under `<dataset_dir>/<split>/images/rgb` for
/// each requested split, in split order then name order.
pub fn image_names(dataset_dir: &Path, splits: &[Split]) -> Result<Vec<String>> {
    let mut image_ids = Vec::new();
    for split in splits {
        let rgb_dir = dataset_dir.join(split.as_str()).join("images").join("rgb");
        if !rgb_dir.is_dir() {
            return Err(AgriVisionError::missing("rgb image directory", rgb_dir));
        }

        let mut ids = WalkDir::new(&rgb_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| image::ImageFormat::from_path(e.path()).is_ok())
            .filter_map(|e| e.path().file_stem().and_then(|s| s.to_str()).map(str::to_owned))
            .collect::<Vec<_>>();
        ids.sort();
        image_ids.extend(ids);
    }
    Ok(image_ids)
}

/// Everything needed to turn a `(split, identifier)` pair into pixels.
#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    manifests: ManifestStore,
    classes: ClassDictionary,
}

impl Dataset {
    pub const fn new(root: PathBuf, manifests: ManifestStore, classes: ClassDictionary) -> Self {
        Self {
            root,
            manifests,
            classes,
        }
    }

    /// Loads the manifests from `manifest_dir` and the class dictionary from
    /// `root`.
    pub fn open(root: impl Into<PathBuf>, manifest_dir: impl AsRef<Path>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AgriVisionError::missing("dataset directory", root));
        }
        let manifests = ManifestStore::load(manifest_dir)?;
        let classes = ClassDictionary::from_dataset(&root)?;
        Ok(Self::new(root, manifests, classes))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub const fn classes(&self) -> &ClassDictionary {
        &self.classes
    }

    pub fn record(&self, split: Split, identifier: &str) -> Result<&PathRecord> {
        crate::manifest::resolve(identifier, self.manifests.split(split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_class_dictionary_is_sorted_with_background_first() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let labels = temp_dir.path().join("train").join("labels");
        for name in ["weed_cluster", "double_plant", "water", ".DS_Store"] {
            fs::create_dir_all(labels.join(name))?;
        }

        let classes = ClassDictionary::from_dataset(temp_dir.path())?;
        let collected: Vec<_> = classes.iter().collect();
        assert_eq!(
            collected,
            vec![
                (0, "background"),
                (1, "double_plant"),
                (2, "water"),
                (3, "weed_cluster")
            ]
        );
        assert_eq!(classes.label_category(0), None);
        assert_eq!(classes.label_category(2).as_deref(), Some("label_water"));
        Ok(())
    }

    #[test]
    fn test_class_dictionary_requires_label_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(matches!(
            ClassDictionary::from_dataset(temp_dir.path()),
            Err(AgriVisionError::MissingResource { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_image_names_strip_extension() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let rgb = temp_dir.path().join("train").join("images").join("rgb");
        fs::create_dir_all(&rgb)?;
        fs::write(rgb.join("B2.jpg"), b"")?;
        fs::write(rgb.join("A1.jpg"), b"")?;
        fs::write(rgb.join("notes.txt"), b"")?;

        let names = image_names(temp_dir.path(), &[Split::Train])?;
        assert_eq!(names, vec!["A1".to_string(), "B2".to_string()]);

        assert!(matches!(
            image_names(temp_dir.path(), &[Split::Val]),
            Err(AgriVisionError::MissingResource { .. })
        ));
        Ok(())
    }
}
