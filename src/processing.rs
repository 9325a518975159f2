//! Spectral feature extraction
//!
//! Mapping strategies reach the MFCC, cepstrum and formant computations through
//! the [`FeatureExtractor`] trait. [`SpectralExtractor`] is the built-in
//! implementation; it works on decibel magnitude frames of `transform_size / 2`
//! bins.

use std::f64::consts::{LN_10, PI};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::config::MappingConfig;
use crate::types::FeatureVector;

/// Floor applied to filterbank energies before the logarithm.
const LOG_FLOOR: f64 = 1e-22;
/// Stand-in for silent (`-inf`) bins when a finite log magnitude is required.
pub const DB_FLOOR: f64 = -160.0;
/// Cepstral coefficients kept when rebuilding an envelope from MFCCs.
const MFCC_LIFTER: usize = 13;
/// Minimum rise (natural-log units) of an envelope peak over its surroundings.
const MIN_PROMINENCE: f64 = 0.05;

/// Frequency ranges the formant-to-vowel-space transform scales between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantBounds {
    pub f1_min: f64,
    pub f1_max: f64,
    pub f2_min: f64,
    pub f2_max: f64,
}

impl FormantBounds {
    pub const F1_MIN: f64 = 100.0;

    #[must_use]
    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.f1_min && freq_hz <= self.f2_max
    }
}

impl Default for FormantBounds {
    fn default() -> Self {
        Self {
            f1_min: Self::F1_MIN,
            f1_max: 1200.0,
            f2_min: 600.0,
            f2_max: 3100.0,
        }
    }
}

/// Parameters for picking formants out of a cepstrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantQuery {
    pub num_formants: usize,
    pub sample_rate: u32,
    pub transform_size: usize,
    /// Lowest pitch the lifter separates from the envelope.
    pub cutoff_hz: f64,
}

/// Feature computations the mapping strategies depend on.
///
/// Every method returns an empty result rather than an error when the frame
/// carries nothing usable; strategies treat that as "no position this frame".
pub trait FeatureExtractor: Send + Sync {
    /// Mel-frequency cepstral coefficients, `config.filter_banks` of them.
    fn mfcc(&self, frame: &[f32], config: &MappingConfig) -> FeatureVector;

    /// Ascending formant frequencies (Hz) estimated from MFCCs.
    fn formants_from_mfcc(&self, mfccs: &FeatureVector, config: &MappingConfig) -> Vec<f64>;

    /// Real cepstrum of the frame, `transform_size / 2` quefrency samples.
    fn cepstrum(&self, frame: &[f32], config: &MappingConfig) -> Vec<f64>;

    /// Ascending formant frequencies (Hz) from a cepstrum, at most
    /// `query.num_formants` of them.
    fn formants_from_cepstrum(&self, cepstrum: &[f64], query: &FormantQuery) -> Vec<f64>;

    fn formant_bounds(&self) -> FormantBounds;
}

/// Layout a cached filterbank was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FilterbankKey {
    sample_rate: u32,
    transform_size: usize,
    bins: usize,
    bands: usize,
    min_hz: f64,
    max_hz: f64,
}

impl FilterbankKey {
    fn new(config: &MappingConfig, bins: usize) -> Self {
        Self {
            sample_rate: config.sample_rate,
            transform_size: config.transform_size,
            bins,
            bands: config.filter_banks,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
        }
    }
}

type Filterbank = Arc<Vec<Vec<f64>>>;

/// FFT plans and the last filterbank, reused across frames.
struct PlanCache {
    planner: FftPlanner<f64>,
    filterbank: Option<(FilterbankKey, Filterbank)>,
}

impl PlanCache {
    fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            filterbank: None,
        }
    }
}

/// Mel filterbank / DCT / cepstral-lifter implementation of [`FeatureExtractor`].
pub struct SpectralExtractor {
    bounds: FormantBounds,
    cache: Mutex<PlanCache>,
}

impl SpectralExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(FormantBounds::default())
    }

    #[must_use]
    pub fn with_bounds(bounds: FormantBounds) -> Self {
        Self {
            bounds,
            cache: Mutex::new(PlanCache::new()),
        }
    }

    /// Rebuilt only when the layout changes.
    fn filterbank(&self, config: &MappingConfig, bins: usize) -> Filterbank {
        let key = FilterbankKey::new(config, bins);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match &cache.filterbank {
            Some((cached, filters)) if *cached == key => Arc::clone(filters),
            _ => {
                let filters = Arc::new(mel_filterbank(config, bins));
                cache.filterbank = Some((key, Arc::clone(&filters)));
                filters
            }
        }
    }

    fn forward_fft(&self, n: usize) -> Arc<dyn Fft<f64>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.planner.plan_fft_forward(n)
    }

    fn inverse_fft(&self, n: usize) -> Arc<dyn Fft<f64>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.planner.plan_fft_inverse(n)
    }
}

impl Default for SpectralExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SpectralExtractor {
    fn clone(&self) -> Self {
        Self::with_bounds(self.bounds)
    }
}

impl fmt::Debug for SpectralExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralExtractor")
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl FeatureExtractor for SpectralExtractor {
    fn mfcc(&self, frame: &[f32], config: &MappingConfig) -> FeatureVector {
        if !usable(frame, config) || config.filter_banks == 0 {
            return FeatureVector::default();
        }

        let power: Vec<f64> = frame.iter().map(|&db| db_to_power(db)).collect();
        let filters = self.filterbank(config, frame.len());
        let log_energies: Vec<f64> = filters
            .iter()
            .map(|weights| {
                let energy: f64 = weights.iter().zip(&power).map(|(w, p)| w * p).sum();
                energy.max(LOG_FLOOR).ln()
            })
            .collect();

        FeatureVector::new(dct_ii(&log_energies))
    }

    fn formants_from_mfcc(&self, mfccs: &FeatureVector, config: &MappingConfig) -> Vec<f64> {
        let bands = mfccs.len();
        if bands < 3 || !(config.min_hz < config.max_hz) {
            return Vec::new();
        }

        let envelope = inverse_dct(mfccs.as_slice(), MFCC_LIFTER.min(bands), bands);
        let edges = mel_edges_hz(config.min_hz, config.max_hz, bands);

        prominent_peaks(&envelope, MIN_PROMINENCE)
            .into_iter()
            .map(|band| edges[band + 1])
            .filter(|f| self.bounds.contains(*f))
            .collect()
    }

    fn cepstrum(&self, frame: &[f32], config: &MappingConfig) -> Vec<f64> {
        let n = config.transform_size;
        if !usable(frame, config) || n < 2 {
            return Vec::new();
        }

        let last = frame.len() - 1;
        let mut spectrum: Vec<Complex64> = (0..n)
            .map(|k| {
                let bin = if k <= n / 2 { k } else { n - k };
                Complex64::new(db_to_ln_magnitude(frame[bin.min(last)]), 0.0)
            })
            .collect();

        self.inverse_fft(n).process(&mut spectrum);

        let scale = 1.0 / n as f64;
        spectrum.iter().take(n / 2).map(|c| c.re * scale).collect()
    }

    fn formants_from_cepstrum(&self, cepstrum: &[f64], query: &FormantQuery) -> Vec<f64> {
        let n = query.transform_size;
        if cepstrum.is_empty() || n < 4 || query.sample_rate == 0 || query.num_formants == 0 {
            return Vec::new();
        }

        let half = n / 2;
        let kept = cepstrum.len().min(half);
        let lifter = if query.cutoff_hz > 0.0 {
            ((f64::from(query.sample_rate) / query.cutoff_hz) as usize).clamp(1, kept)
        } else {
            kept
        };

        // Symmetric, Hann-tapered low-quefrency lifter; its transform is the
        // smoothed log spectrum.
        let mut buf = vec![Complex64::new(0.0, 0.0); n];
        buf[0] = Complex64::new(cepstrum[0], 0.0);
        for q in 1..lifter {
            let taper = 0.5 * (1.0 + (PI * q as f64 / lifter as f64).cos());
            let c = Complex64::new(cepstrum[q] * taper, 0.0);
            buf[q] = c;
            buf[n - q] = c;
        }
        self.forward_fft(n).process(&mut buf);

        let envelope: Vec<f64> = buf.iter().take(half + 1).map(|c| c.re).collect();
        let bin_hz = f64::from(query.sample_rate) / n as f64;

        prominent_peaks(&envelope, MIN_PROMINENCE)
            .into_iter()
            .map(|k| k as f64 * bin_hz)
            .filter(|f| self.bounds.contains(*f))
            .take(query.num_formants)
            .collect()
    }

    fn formant_bounds(&self) -> FormantBounds {
        self.bounds
    }
}

fn usable(frame: &[f32], config: &MappingConfig) -> bool {
    !frame.is_empty()
        && config.sample_rate > 0
        && config.transform_size > 0
        && frame.iter().any(|db| db.is_finite())
}

fn db_to_power(db: f32) -> f64 {
    if db.is_finite() {
        10f64.powf(f64::from(db) / 10.0)
    } else {
        0.0
    }
}

fn db_to_ln_magnitude(db: f32) -> f64 {
    let db = if db.is_finite() {
        f64::from(db).max(DB_FLOOR)
    } else {
        DB_FLOOR
    };
    db / 20.0 * LN_10
}

pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// `bands + 2` filter edges, evenly spaced on the mel scale.
fn mel_edges_hz(min_hz: f64, max_hz: f64, bands: usize) -> Vec<f64> {
    let mel_min = hz_to_mel(min_hz);
    let mel_max = hz_to_mel(max_hz);
    let step = (mel_max - mel_min) / (bands + 1) as f64;
    (0..bands + 2)
        .map(|i| mel_to_hz(mel_min + step * i as f64))
        .collect()
}

/// Triangular filters over the frame's bins, one row per band.
fn mel_filterbank(config: &MappingConfig, bins: usize) -> Vec<Vec<f64>> {
    let bands = config.filter_banks;
    if !(config.min_hz < config.max_hz) {
        return vec![vec![0.0; bins]; bands];
    }
    let edges = mel_edges_hz(config.min_hz, config.max_hz, bands);
    let bin_hz = config.bin_hz();

    (0..bands)
        .map(|m| {
            let (lo, centre, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            (0..bins)
                .map(|k| {
                    let f = k as f64 * bin_hz;
                    if f >= lo && f <= centre && centre > lo {
                        (f - lo) / (centre - lo)
                    } else if f > centre && f <= hi && hi > centre {
                        (hi - f) / (hi - centre)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Unnormalized DCT-II.
fn dct_ii(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    (0..n)
        .map(|k| {
            x.iter()
                .enumerate()
                .map(|(i, v)| v * (PI / n as f64 * (i as f64 + 0.5) * k as f64).cos())
                .sum()
        })
        .collect()
}

/// Inverse of [`dct_ii`] using only the first `keep` coefficients.
fn inverse_dct(c: &[f64], keep: usize, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let tail: f64 = (1..keep)
                .map(|k| c[k] * (PI / n as f64 * (i as f64 + 0.5) * k as f64).cos())
                .sum();
            (c[0] + 2.0 * tail) / n as f64
        })
        .collect()
}

/// Interior local maxima that rise at least `min_prominence` above the lowest
/// point on each side before a higher sample is reached.
fn prominent_peaks(x: &[f64], min_prominence: f64) -> Vec<usize> {
    (1..x.len().saturating_sub(1))
        .filter(|&i| x[i] > x[i - 1] && x[i] >= x[i + 1])
        .filter(|&i| {
            let peak = x[i];
            let left = x[..i]
                .iter()
                .rev()
                .take_while(|v| **v <= peak)
                .fold(peak, |lo, v| lo.min(*v));
            let right = x[i + 1..]
                .iter()
                .take_while(|v| **v <= peak)
                .fold(peak, |lo, v| lo.min(*v));
            (peak - left).min(peak - right) >= min_prominence
        })
        .collect()
}
