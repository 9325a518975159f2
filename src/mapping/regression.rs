use crate::config::MappingConfig;
use crate::error::Result;
use crate::mapping::{MappingMode, MappingStrategy};
use crate::processing::FeatureExtractor;
use crate::types::{Coordinate, FeatureVector};
use crate::weights::WeightSet;

/// Multiple linear regression from MFCCs straight to (backness, height).
pub struct LinearRegressionMapping {
    weights: WeightSet,
}

impl LinearRegressionMapping {
    pub fn new(weights: WeightSet) -> Self {
        Self { weights }
    }

    /// Regression step on already-extracted MFCCs: select, optionally
    /// normalize, add the bias term, then predict.
    pub fn predict(&self, mfccs: &FeatureVector, config: &MappingConfig) -> Result<Coordinate> {
        let mut features = mfccs.select(config.mfcc_range());
        if config.normalize {
            features.normalize()?;
        }
        let features = features.with_bias();

        let table = self.weights.for_normalize(config.normalize);
        let entry = table.lookup(features.len())?;
        Ok(entry.predict(&features))
    }
}

impl MappingStrategy for LinearRegressionMapping {
    fn mode(&self) -> MappingMode {
        MappingMode::LinearRegression
    }

    fn map(
        &self,
        frame: &[f32],
        config: &MappingConfig,
        extractor: &dyn FeatureExtractor,
    ) -> Result<Option<Coordinate>> {
        let mfccs = extractor.mfcc(frame, config);
        if mfccs.is_empty() {
            return Ok(None);
        }
        self.predict(&mfccs, config).map(Some)
    }
}
