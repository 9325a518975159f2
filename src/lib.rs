//! Maps a live audio stream onto the vowel space.
//!
//! Every analysis frame (decibel magnitudes of one transform) is turned into a
//! raw (backness, height) [`Coordinate`] by one of the [`mapping`] strategies and
//! smoothed by a [`PositionSmoother`] owned by a [`VowelTrackingSession`].

pub mod analyser;
#[cfg(feature = "capture")]
pub mod audio;
pub mod config;
pub mod error;
pub mod extensions;
pub mod mapping;
pub mod processing;
pub mod session;
pub mod smoothing;
pub mod types;
pub mod weights;

pub use analyser::Analyser;
pub use config::{MappingConfig, SessionParams, SessionSettings, SettingsFile};
pub use error::{Error, Result};
pub use extensions::{ExtensionRegistry, SessionExtension};
pub use mapping::{MappingMode, MappingStrategy};
pub use processing::{FeatureExtractor, FormantBounds, FormantQuery, SpectralExtractor};
pub use session::{FrameSource, VowelTrackingSession};
pub use smoothing::PositionSmoother;
pub use types::{Coordinate, FeatureVector, FormantPair, Frame};
pub use weights::{WeightEntry, WeightSet, WeightSource, WeightTable};
