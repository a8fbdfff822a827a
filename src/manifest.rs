//! Per-split path manifests and identifier resolution.
//!
//! A manifest is a JSON array of records, one per dataset image, mapping each
//! semantic category (`rgb`, `nir`, `boundary`, `mask`, `label_<class>`) to the
//! file that holds it. The three split manifests are loaded once into a
//! [`ManifestStore`], which is then passed by reference to everything that needs
//! to look an image up.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AgriVisionError, Result};

/// Dataset split a manifest or an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub const fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    pub fn manifest_file(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dataset image's file locations, keyed by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: String,

    #[serde(default)]
    pub classes: serde_json::Value,

    /// Category name to file path, in document order.
    #[serde(flatten)]
    pub paths: IndexMap<String, PathBuf>,
}

impl PathRecord {
    pub fn path(&self, category: &str) -> Option<&Path> {
        self.paths.get(category).map(PathBuf::as_path)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }
}

/// Records of a single split, in file order.
pub type Manifest = Vec<PathRecord>;

/// The three split manifests plus their train→val→test concatenation.
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    train: Manifest,
    val: Manifest,
    test: Manifest,
    complete: Manifest,
}

impl ManifestStore {
    /// Reads `train.json`, `val.json` and `test.json` from `directory`.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        let train = read_manifest(&directory.join(Split::Train.manifest_file()))?;
        let val = read_manifest(&directory.join(Split::Val.manifest_file()))?;
        let test = read_manifest(&directory.join(Split::Test.manifest_file()))?;

        let store = Self::from_splits(train, val, test)?;
        info!(
            train = store.train.len(),
            val = store.val.len(),
            test = store.test.len(),
            "Loaded manifests from {}",
            directory.display()
        );
        Ok(store)
    }

    /// Builds the store from already parsed manifests, rejecting identifiers
    /// that occur more than once across the merged table.
    pub fn from_splits(train: Manifest, val: Manifest, test: Manifest) -> Result<Self> {
        let mut seen: HashMap<&str, Split> = HashMap::new();
        for (split, manifest) in [(Split::Train, &train), (Split::Val, &val), (Split::Test, &test)]
        {
            for record in manifest {
                if let Some(first) = seen.insert(record.id.as_str(), split) {
                    return Err(AgriVisionError::DuplicateIdentifier {
                        id: record.id.clone(),
                        first: first.to_string(),
                        second: split.to_string(),
                    });
                }
            }
        }

        let complete = train
            .iter()
            .chain(val.iter())
            .chain(test.iter())
            .cloned()
            .collect();

        Ok(Self {
            train,
            val,
            test,
            complete,
        })
    }

    pub fn split(&self, split: Split) -> &[PathRecord] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// The merged table in train→val→test order.
    pub fn records(&self) -> &[PathRecord] {
        &self.complete
    }

    pub fn len(&self) -> usize {
        self.complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_empty()
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Err(AgriVisionError::missing("manifest file", path));
    }
    let contents = fs::read_to_string(path).map_err(|e| AgriVisionError::FileSystem {
        path: path.to_path_buf(),
        operation: "manifest read".to_string(),
        source: e,
    })?;
    let manifest: Manifest =
        serde_json::from_str(&contents).map_err(|e| AgriVisionError::Manifest {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Parsed {} records from {}", manifest.len(), path.display());
    Ok(manifest)
}

/// Returns the first record in `records` whose id is `identifier`.
pub fn resolve<'a>(identifier: &str, records: &'a [PathRecord]) -> Result<&'a PathRecord> {
    records
        .iter()
        .find(|record| record.id == identifier)
        .ok_or_else(|| AgriVisionError::not_found("image", identifier))
}
