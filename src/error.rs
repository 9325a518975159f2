//! Error types for vowel tracking

use thiserror::Error;

/// Result type alias for vowel tracking operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mapping and tracking vowel positions
#[derive(Debug, Error)]
pub enum Error {
    /// No regression weights exist for feature vectors of this length
    #[error(
        "no regression weights for feature vectors of length {len}; \
         the filter bank count and MFCC range must produce a length present in the weight table"
    )]
    MissingWeights { len: usize },

    /// Feature normalization hit a zero (or non-finite) norm
    #[error("feature vector has zero norm and cannot be normalized")]
    DegenerateFeatures,

    /// A mapping produced a coordinate that is NaN or infinite
    #[error("mapping produced a non-finite coordinate")]
    NonFiniteCoordinate,

    /// Weight document could not be interpreted
    #[error("weight document error: {0}")]
    WeightDocument(String),

    /// Backness and height weight vectors disagree in length
    #[error("weight vectors differ in length: backness {backness}, height {height}")]
    WeightLength { backness: usize, height: usize },

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Extension registration error
    #[error("extension error: {0}")]
    Extension(String),

    /// Unknown mapping strategy name
    #[error("unknown mapping mode: {0}")]
    UnknownMode(String),

    /// The session has no frame source
    #[error("no frame source attached")]
    NotAttached,

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Setup mismatches that will fail every frame until the settings change.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingWeights { .. } | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_configuration_errors() {
        assert!(Error::MissingWeights { len: 13 }.is_configuration());
        assert!(Error::InvalidConfig("window".into()).is_configuration());
        assert!(!Error::DegenerateFeatures.is_configuration());
        assert!(!Error::NotAttached.is_configuration());
    }

    #[test]
    fn missing_weights_names_the_length() {
        let msg = Error::MissingWeights { len: 13 }.to_string();
        assert!(msg.contains("length 13"));
    }
}
