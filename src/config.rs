//! Mapping configuration, live session settings and the optional settings file
//!
//! [`SessionParams`] is shared between whatever drives the controls and the
//! session; the session takes a [`SessionSettings`] snapshot at the start of
//! every frame, so changes land on the next callback.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mapping::MappingMode;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_MIN_HZ: f32 = 0.0;
pub const DEFAULT_MAX_HZ: f32 = 8_000.0;
pub const DEFAULT_FILTER_BANKS: usize = 40;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;
/// Analysis window length; the transform size is the next power of two.
pub const WINDOW_SECONDS: f64 = 0.016;
/// First MFCC (1-based) fed to the regression.
pub const FIRST_MFCC: usize = 2;
/// Last MFCC (1-based, inclusive) fed to the regression.
pub const LAST_MFCC: usize = 25;

/// Transform size for a sample rate: the next power of two of one analysis window.
#[must_use]
pub fn transform_size_for(sample_rate: u32, window_seconds: f64) -> usize {
    let samples = (f64::from(sample_rate) * window_seconds).ceil().max(2.0) as usize;
    samples.next_power_of_two()
}

/// Everything a mapping strategy needs to interpret one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingConfig {
    pub transform_size: usize,
    pub min_hz: f64,
    pub max_hz: f64,
    pub sample_rate: u32,
    pub filter_banks: usize,
    pub normalize: bool,
    pub first_mfcc: usize,
    pub last_mfcc: usize,
}

impl MappingConfig {
    #[must_use]
    pub fn new(sample_rate: u32, transform_size: usize) -> Self {
        Self {
            transform_size,
            min_hz: f64::from(DEFAULT_MIN_HZ),
            max_hz: f64::from(DEFAULT_MAX_HZ),
            sample_rate,
            filter_banks: DEFAULT_FILTER_BANKS,
            normalize: false,
            first_mfcc: FIRST_MFCC,
            last_mfcc: LAST_MFCC,
        }
    }

    /// Number of magnitude bins in a frame.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.transform_size / 2
    }

    /// Width of one frequency bin in Hz.
    #[must_use]
    pub fn bin_hz(&self) -> f64 {
        f64::from(self.sample_rate) / self.transform_size as f64
    }

    /// Zero-based index range of the regression coefficients.
    #[must_use]
    pub fn mfcc_range(&self) -> Range<usize> {
        self.first_mfcc.saturating_sub(1)..self.last_mfcc
    }
}

/// Point-in-time copy of [`SessionParams`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub mode: MappingMode,
    pub min_hz: f32,
    pub max_hz: f32,
    pub filter_banks: usize,
    pub smoothing_window: usize,
    pub normalize: bool,
    pub generation: u64,
}

impl SessionSettings {
    #[must_use]
    pub fn mapping_config(&self, sample_rate: u32, transform_size: usize) -> MappingConfig {
        MappingConfig {
            min_hz: f64::from(self.min_hz),
            max_hz: f64::from(self.max_hz),
            filter_banks: self.filter_banks,
            normalize: self.normalize,
            ..MappingConfig::new(sample_rate, transform_size)
        }
    }
}

/// Runtime-adjustable settings, readable from the audio thread without locking.
pub struct SessionParams {
    mode: AtomicUsize,
    min_hz: AtomicU32,
    max_hz: AtomicU32,
    filter_banks: AtomicUsize,
    smoothing_window: AtomicUsize,
    normalize: AtomicBool,
    generation: AtomicU64,
}

impl SessionParams {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: AtomicUsize::new(MappingMode::default().as_usize()),
            min_hz: AtomicU32::new(DEFAULT_MIN_HZ.to_bits()),
            max_hz: AtomicU32::new(DEFAULT_MAX_HZ.to_bits()),
            filter_banks: AtomicUsize::new(DEFAULT_FILTER_BANKS),
            smoothing_window: AtomicUsize::new(DEFAULT_SMOOTHING_WINDOW),
            normalize: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// The generation is read before the values, so a snapshot's values are
    /// never older than its generation.
    #[must_use]
    pub fn snapshot(&self) -> SessionSettings {
        let generation = self.generation();
        SessionSettings {
            mode: self.mode(),
            min_hz: self.min_hz(),
            max_hz: self.max_hz(),
            filter_banks: self.filter_banks(),
            smoothing_window: self.smoothing_window(),
            normalize: self.normalize(),
            generation,
        }
    }

    /// Bumped by every setter after it stores its value.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn mode(&self) -> MappingMode {
        MappingMode::from_usize(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: MappingMode) {
        self.mode.store(mode.as_usize(), Ordering::Relaxed);
        self.touch();
    }

    pub fn min_hz(&self) -> f32 {
        f32::from_bits(self.min_hz.load(Ordering::Relaxed))
    }

    pub fn set_min_hz(&self, value: f32) {
        self.min_hz.store(value.max(0.0).to_bits(), Ordering::Relaxed);
        self.touch();
    }

    pub fn max_hz(&self) -> f32 {
        f32::from_bits(self.max_hz.load(Ordering::Relaxed))
    }

    pub fn set_max_hz(&self, value: f32) {
        self.max_hz.store(value.max(0.0).to_bits(), Ordering::Relaxed);
        self.touch();
    }

    pub fn filter_banks(&self) -> usize {
        self.filter_banks.load(Ordering::Relaxed)
    }

    pub fn set_filter_banks(&self, value: usize) {
        self.filter_banks.store(value.max(1), Ordering::Relaxed);
        self.touch();
    }

    pub fn smoothing_window(&self) -> usize {
        self.smoothing_window.load(Ordering::Relaxed)
    }

    pub fn set_smoothing_window(&self, value: usize) {
        self.smoothing_window.store(value.max(1), Ordering::Relaxed);
        self.touch();
    }

    pub fn normalize(&self) -> bool {
        self.normalize.load(Ordering::Relaxed)
    }

    pub fn set_normalize(&self, value: bool) {
        self.normalize.store(value, Ordering::Relaxed);
        self.touch();
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self::new()
    }
}

/// TOML settings file. Every field is optional and overlays the defaults.
///
/// ```toml
/// [analysis]
/// min_hz = 0.0
/// max_hz = 8000.0
/// filter_banks = 40
/// normalize = false
///
/// [smoothing]
/// window = 10
///
/// [mapping]
/// mode = "linear_regression"
/// weights_dir = "training"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub analysis: AnalysisFileConfig,

    #[serde(default)]
    pub smoothing: SmoothingFileConfig,

    #[serde(default)]
    pub mapping: MappingFileConfig,
}

/// Spectral analysis settings
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisFileConfig {
    pub min_hz: Option<f32>,
    pub max_hz: Option<f32>,
    pub filter_banks: Option<usize>,
    pub normalize: Option<bool>,
}

/// Position smoothing settings
#[derive(Debug, Default, Deserialize)]
pub struct SmoothingFileConfig {
    pub window: Option<usize>,
}

/// Strategy selection and weight location
#[derive(Debug, Default, Deserialize)]
pub struct MappingFileConfig {
    pub mode: Option<MappingMode>,
    pub weights_dir: Option<PathBuf>,
}

impl SettingsFile {
    /// Load settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML for this schema
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Checks ranges and pushes the present values into `params`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] without touching `params` when a value is
    /// out of range
    pub fn apply(&self, params: &SessionParams) -> Result<()> {
        let min_hz = self.analysis.min_hz.unwrap_or_else(|| params.min_hz());
        let max_hz = self.analysis.max_hz.unwrap_or_else(|| params.max_hz());
        if min_hz < 0.0 || min_hz >= max_hz {
            return Err(Error::InvalidConfig(format!(
                "analysis range {min_hz}..{max_hz} Hz is empty"
            )));
        }
        if self.analysis.filter_banks == Some(0) {
            return Err(Error::InvalidConfig("filter_banks must be at least 1".into()));
        }
        if self.smoothing.window == Some(0) {
            return Err(Error::InvalidConfig("smoothing window must be at least 1".into()));
        }

        if let Some(v) = self.analysis.min_hz {
            params.set_min_hz(v);
        }
        if let Some(v) = self.analysis.max_hz {
            params.set_max_hz(v);
        }
        if let Some(v) = self.analysis.filter_banks {
            params.set_filter_banks(v);
        }
        if let Some(v) = self.analysis.normalize {
            params.set_normalize(v);
        }
        if let Some(v) = self.smoothing.window {
            params.set_smoothing_window(v);
        }
        if let Some(v) = self.mapping.mode {
            params.set_mode(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn transform_size_is_next_power_of_two() {
        assert_eq!(transform_size_for(44_100, WINDOW_SECONDS), 1024);
        assert_eq!(transform_size_for(48_000, WINDOW_SECONDS), 1024);
        assert_eq!(transform_size_for(22_050, WINDOW_SECONDS), 512);
    }

    #[test]
    fn default_mfcc_range_skips_first_coefficient() {
        let cfg = MappingConfig::new(44_100, 1024);
        assert_eq!(cfg.mfcc_range(), 1..25);
        assert_eq!(cfg.frame_len(), 512);
    }

    #[test]
    fn setters_bump_generation_and_clamp() {
        let params = SessionParams::new();
        let before = params.generation();
        params.set_smoothing_window(0);
        assert_eq!(params.smoothing_window(), 1);
        params.set_mode(MappingMode::CepstrumFormants);
        let snap = params.snapshot();
        assert_eq!(snap.mode, MappingMode::CepstrumFormants);
        assert_eq!(snap.generation, before + 2);
    }

    #[test]
    fn snapshot_generation_never_runs_ahead_of_values() {
        use std::sync::Arc;

        const WRITES: usize = 20_000;
        let params = Arc::new(SessionParams::new());
        let writer = {
            let params = Arc::clone(&params);
            std::thread::spawn(move || {
                // Generation i is published by the write of filter_banks = i.
                for i in 1..=WRITES {
                    params.set_filter_banks(i);
                }
            })
        };

        loop {
            let snap = params.snapshot();
            assert!(
                snap.filter_banks as u64 >= snap.generation,
                "generation {} paired with filter_banks {}",
                snap.generation,
                snap.filter_banks
            );
            if snap.generation == WRITES as u64 {
                break;
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn snapshot_feeds_mapping_config() {
        let params = SessionParams::new();
        params.set_min_hz(300.0);
        params.set_max_hz(5000.0);
        params.set_normalize(true);
        params.set_filter_banks(26);
        let cfg = params.snapshot().mapping_config(16_000, 512);
        assert_eq!(cfg.min_hz, 300.0);
        assert_eq!(cfg.max_hz, 5000.0);
        assert!(cfg.normalize);
        assert_eq!(cfg.filter_banks, 26);
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.transform_size, 512);
    }

    #[test]
    fn settings_file_overlays_params() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[analysis]\nmax_hz = 5000.0\nnormalize = true\n\n[smoothing]\nwindow = 4\n\n[mapping]\nmode = \"mfcc_formants\""
        )
        .unwrap();

        let settings = SettingsFile::load(file.path()).unwrap();
        let params = SessionParams::new();
        settings.apply(&params).unwrap();

        assert_eq!(params.max_hz(), 5000.0);
        assert_eq!(params.min_hz(), DEFAULT_MIN_HZ);
        assert!(params.normalize());
        assert_eq!(params.smoothing_window(), 4);
        assert_eq!(params.mode(), MappingMode::MfccFormants);
    }

    #[test]
    fn settings_file_rejects_empty_range() {
        let settings = SettingsFile::from_toml("[analysis]\nmin_hz = 4000.0\nmax_hz = 300.0").unwrap();
        let params = SessionParams::new();
        let err = settings.apply(&params).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(params.generation(), 0);
    }

    #[test]
    fn settings_file_rejects_zero_window() {
        let settings = SettingsFile::from_toml("[smoothing]\nwindow = 0").unwrap();
        assert!(settings.apply(&SessionParams::new()).is_err());
    }

    #[test]
    fn empty_settings_file_is_default() {
        let settings = SettingsFile::from_toml("").unwrap();
        assert!(settings.mapping.mode.is_none());
        assert!(settings.mapping.weights_dir.is_none());
    }
}
