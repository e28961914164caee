//! Class label table.
//!
//! Labels are index-aligned with the classifier output. They come either from
//! a configured list or from the sorted names of the sub-directories of a
//! training directory. If both are given they have to agree, since a silent
//! reordering would map every prediction to the wrong gesture.
use std::{fs, path::Path};

use crate::error::LoadError;

/// Labels of the ASL alphabet dataset in sorted directory order.
pub const ASL_ALPHABET: [&str; 29] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z", "del", "nothing", "space",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabelTable {
    labels: Vec<String>,
}

impl ClassLabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self, LoadError> {
        if labels.is_empty() {
            return Err(LoadError::NoLabels);
        }
        Ok(Self { labels })
    }

    /// Sorted names of all sub-directories of `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let dir = dir.as_ref();
        let to_err = |err: std::io::Error| LoadError::LabelDir {
            path: dir.to_path_buf(),
            reason: err.to_string(),
        };

        let mut labels = vec![];
        for entry in fs::read_dir(dir).map_err(to_err)? {
            let entry = entry.map_err(to_err)?;
            if entry.file_type().map_err(to_err)?.is_dir() {
                labels.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        labels.sort();

        Self::new(labels)
    }

    /// Resolve the table from the configured sources.
    ///
    /// With both sources present they must match exactly. With none, the ASL
    /// alphabet is used.
    pub fn resolve(configured: Option<Vec<String>>, dir: Option<&Path>) -> Result<Self, LoadError> {
        match (configured, dir) {
            (Some(configured), Some(dir)) => {
                let from_dir = Self::from_dir(dir)?;
                if configured != from_dir.labels {
                    return Err(LoadError::LabelMismatch {
                        configured,
                        from_dir: from_dir.labels,
                    });
                }
                Ok(from_dir)
            }
            (Some(configured), None) => Self::new(configured),
            (None, Some(dir)) => Self::from_dir(dir),
            (None, None) => Ok(Self::default()),
        }
    }

    /// Check the table against the model's declared output width.
    pub fn check_model_outputs(&self, model_outputs: Option<usize>) -> Result<(), LoadError> {
        match model_outputs {
            Some(n) if n != self.labels.len() => Err(LoadError::LabelCount {
                labels: self.labels.len(),
                model_outputs: n,
            }),
            _ => Ok(()),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for ClassLabelTable {
    fn default() -> Self {
        Self {
            labels: ASL_ALPHABET.iter().map(|l| l.to_string()).collect(),
        }
    }
}
