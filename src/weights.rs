//! Regression weights for the linear-regression mapping
//!
//! A [`WeightTable`] holds one [`WeightEntry`] per feature-vector length. Two
//! tables exist at runtime, one trained on L2-normalized features and one on raw
//! features; [`WeightSet`] picks between them by the normalize flag.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Coordinate, FeatureVector};

/// Bias term followed by MFCCs 2 through 25.
pub const BUILTIN_LENGTH: usize = 25;

const BUILTIN_HEIGHT: [f64; BUILTIN_LENGTH] = [
    1.104270, 0.120389, 0.271996, 0.246571, 0.029848, -0.489273, -0.734283, -0.796145, -0.441830,
    -0.033330, 0.415667, 0.341943, 0.380445, 0.260451, 0.092989, -0.161122, -0.173544, -0.015523,
    0.251668, 0.022534, 0.054093, 0.005430, -0.035820, -0.057551, 0.161558,
];

const BUILTIN_BACKNESS: [f64; BUILTIN_LENGTH] = [
    0.995437, 0.540693, 0.121922, -0.585859, -0.443847, 0.170546, 0.188879, -0.306358, -0.308599,
    -0.212987, 0.012301, 0.574838, 0.681862, 0.229355, -0.222245, -0.222203, -0.129962, 0.329717,
    0.142439, -0.132018, 0.103092, 0.052337, -0.034299, -0.041558, 0.141547,
];

/// Coefficients for both output dimensions, one per feature (bias included).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEntry {
    backness: Vec<f64>,
    height: Vec<f64>,
}

impl WeightEntry {
    /// # Errors
    ///
    /// Returns error if the vectors are empty or differ in length
    pub fn new(backness: Vec<f64>, height: Vec<f64>) -> Result<Self> {
        if backness.len() != height.len() {
            return Err(Error::WeightLength {
                backness: backness.len(),
                height: height.len(),
            });
        }
        if backness.is_empty() {
            return Err(Error::WeightDocument("no weights listed".to_string()));
        }
        Ok(Self { backness, height })
    }

    /// Feature-vector length these weights apply to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backness.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backness.is_empty()
    }

    #[must_use]
    pub fn backness(&self) -> &[f64] {
        &self.backness
    }

    #[must_use]
    pub fn height(&self) -> &[f64] {
        &self.height
    }

    /// Linear prediction of both dimensions.
    #[must_use]
    pub fn predict(&self, features: &FeatureVector) -> Coordinate {
        Coordinate::new(features.dot(&self.backness), features.dot(&self.height))
    }
}

/// On-disk form: `{"backness": [...], "height": [...]}`.
#[derive(Debug, Deserialize)]
struct WeightDocument {
    backness: Vec<f64>,
    height: Vec<f64>,
}

impl TryFrom<WeightDocument> for WeightEntry {
    type Error = Error;

    fn try_from(doc: WeightDocument) -> Result<Self> {
        Self::new(doc.backness, doc.height)
    }
}

/// Weight entries keyed by the feature-vector length they expect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    entries: BTreeMap<usize, WeightEntry>,
}

impl WeightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the crate: a single entry of length 25.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(WeightEntry {
            backness: BUILTIN_BACKNESS.to_vec(),
            height: BUILTIN_HEIGHT.to_vec(),
        });
        table
    }

    /// Adds `entry` under its length, returning any entry it replaced.
    pub fn insert(&mut self, entry: WeightEntry) -> Option<WeightEntry> {
        self.entries.insert(entry.len(), entry)
    }

    #[must_use]
    pub fn get(&self, len: usize) -> Option<&WeightEntry> {
        self.entries.get(&len)
    }

    /// Like [`get`](Self::get), but a missing length is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingWeights`] if no entry has length `len`
    pub fn lookup(&self, len: usize) -> Result<&WeightEntry> {
        self.get(len).ok_or(Error::MissingWeights { len })
    }

    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a single weight entry from a JSON document
///
/// # Errors
///
/// Returns error if the document is malformed or the two lists disagree
pub fn parse_entry(contents: &str) -> Result<WeightEntry> {
    let doc: WeightDocument = serde_json::from_str(contents)?;
    WeightEntry::try_from(doc)
}

/// Load a single weight entry from a JSON file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_entry(path: &Path) -> Result<WeightEntry> {
    let contents = std::fs::read_to_string(path)?;
    let entry = parse_entry(&contents)?;
    tracing::debug!(path = %path.display(), len = entry.len(), "loaded regression weights");
    Ok(entry)
}

/// Which training run a weight document comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    /// Trained on raw MFCCs
    Raw,
    /// Trained on L2-normalized MFCCs
    Normalized,
}

impl WeightSource {
    #[must_use]
    pub const fn for_normalize(normalize: bool) -> Self {
        if normalize {
            Self::Normalized
        } else {
            Self::Raw
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Raw => "weights.json",
            Self::Normalized => "weights_norm_mfcc.json",
        }
    }
}

/// The raw and normalized weight tables, shared read-only between sessions.
#[derive(Debug, Clone)]
pub struct WeightSet {
    raw: Arc<WeightTable>,
    normalized: Arc<WeightTable>,
}

impl WeightSet {
    #[must_use]
    pub fn new(raw: WeightTable, normalized: WeightTable) -> Self {
        Self {
            raw: Arc::new(raw),
            normalized: Arc::new(normalized),
        }
    }

    /// Built-in weights for both variants.
    #[must_use]
    pub fn builtin() -> Self {
        let table = Arc::new(WeightTable::builtin());
        Self {
            raw: Arc::clone(&table),
            normalized: table,
        }
    }

    /// Loads `weights.json` and `weights_norm_mfcc.json` from `dir`.
    ///
    /// Each loaded entry is added to the built-in table, replacing the built-in
    /// entry of the same length. A variant whose file is absent keeps the
    /// built-in table.
    ///
    /// # Errors
    ///
    /// Returns error if a present file cannot be read or parsed
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let raw = Self::load_variant(dir, WeightSource::Raw)?;
        let normalized = Self::load_variant(dir, WeightSource::Normalized)?;
        Ok(Self::new(raw, normalized))
    }

    fn load_variant(dir: &Path, source: WeightSource) -> Result<WeightTable> {
        let mut table = WeightTable::builtin();
        let path = dir.join(source.file_name());
        if path.exists() {
            let entry = load_entry(&path)?;
            table.insert(entry);
        } else {
            tracing::debug!(path = %path.display(), "weight file absent, using built-in table");
        }
        Ok(table)
    }

    #[must_use]
    pub fn get(&self, source: WeightSource) -> &Arc<WeightTable> {
        match source {
            WeightSource::Raw => &self.raw,
            WeightSource::Normalized => &self.normalized,
        }
    }

    #[must_use]
    pub fn for_normalize(&self, normalize: bool) -> &Arc<WeightTable> {
        self.get(WeightSource::for_normalize(normalize))
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        Self::builtin()
    }
}
