pub(crate) mod cepstrum;
pub(crate) mod formants;
pub(crate) mod regression;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use cepstrum::CepstrumFormantMapping;
pub use formants::MfccFormantMapping;
pub use regression::LinearRegressionMapping;

use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::processing::{FeatureExtractor, FormantBounds};
use crate::types::{Coordinate, FormantPair};
use crate::weights::WeightSet;

pub const BACKNESS_MIN: f64 = 0.0;
pub const BACKNESS_MAX: f64 = 4.0;
pub const HEIGHT_MIN: f64 = 0.0;
pub const HEIGHT_MAX: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    #[default]
    LinearRegression,
    MfccFormants,
    CepstrumFormants,
}

impl MappingMode {
    pub const ALL: [Self; 3] = [
        Self::LinearRegression,
        Self::MfccFormants,
        Self::CepstrumFormants,
    ];

    pub fn as_usize(self) -> usize {
        match self {
            MappingMode::LinearRegression => 0,
            MappingMode::MfccFormants => 1,
            MappingMode::CepstrumFormants => 2,
        }
    }

    pub fn from_usize(value: usize) -> Self {
        match value {
            1 => MappingMode::MfccFormants,
            2 => MappingMode::CepstrumFormants,
            _ => MappingMode::LinearRegression,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MappingMode::LinearRegression => "linear_regression",
            MappingMode::MfccFormants => "mfcc_formants",
            MappingMode::CepstrumFormants => "cepstrum_formants",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MappingMode::LinearRegression => "Linear regression",
            MappingMode::MfccFormants => "MFCC formants",
            MappingMode::CepstrumFormants => "Cepstrum formants",
        }
    }
}

impl fmt::Display for MappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MappingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == wanted)
            .ok_or_else(|| Error::UnknownMode(s.to_string()))
    }
}

/// Turns one frame into a raw vowel-space coordinate.
///
/// `Ok(None)` means the frame carried nothing to map; it is skipped, not an error.
pub trait MappingStrategy: Send {
    fn mode(&self) -> MappingMode;

    fn map(
        &self,
        frame: &[f32],
        config: &MappingConfig,
        extractor: &dyn FeatureExtractor,
    ) -> Result<Option<Coordinate>>;
}

/// Builds the strategy for `mode`. Only the regression strategy reads `weights`.
pub fn strategy_for(mode: MappingMode, weights: &WeightSet) -> Box<dyn MappingStrategy> {
    match mode {
        MappingMode::LinearRegression => Box::new(LinearRegressionMapping::new(weights.clone())),
        MappingMode::MfccFormants => Box::new(MfccFormantMapping::new()),
        MappingMode::CepstrumFormants => Box::new(CepstrumFormantMapping::new()),
    }
}

/// Linear map sending `from_start` to `to_start` and `from_end` to `to_end`.
/// Values outside the source range land outside the target range.
pub fn map_to_scale(value: f64, from_start: f64, from_end: f64, to_start: f64, to_end: f64) -> f64 {
    to_start + (value - from_start) * (to_end - to_start) / (from_end - from_start)
}

/// High F2 is front (backness 0); high F1 is open (height 0).
pub fn formants_to_vowel_space(formants: FormantPair, bounds: &FormantBounds) -> Coordinate {
    let backness = map_to_scale(
        formants.f2,
        bounds.f2_max,
        bounds.f2_min,
        BACKNESS_MIN,
        BACKNESS_MAX,
    );
    let height = map_to_scale(
        formants.f1,
        bounds.f1_max,
        bounds.f1_min,
        HEIGHT_MIN,
        HEIGHT_MAX,
    );
    Coordinate::new(backness, height)
}
