//! Time-domain samples to decibel magnitude frames
//!
//! [`Analyser`] keeps the most recent `transform_size` samples. Each
//! [`compute`](Analyser::compute) windows them, runs a forward FFT and rewrites
//! the frame in place, so readers copy it out before the next call.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::transform_size_for;
use crate::error::{Error, Result};
use crate::session::FrameSource;
use crate::types::Frame;

type Complex32 = Complex<f32>;

pub struct Analyser {
    sample_rate: u32,
    transform_size: usize,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    frame: Frame,
}

impl Analyser {
    /// Transform size is the next power of two of `sample_rate * window_seconds`.
    pub fn new(sample_rate: u32, window_seconds: f64) -> Self {
        let transform_size = transform_size_for(sample_rate, window_seconds);
        Self::build(sample_rate, transform_size)
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `transform_size` is below 2
    pub fn with_transform_size(sample_rate: u32, transform_size: usize) -> Result<Self> {
        if transform_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "transform size {transform_size} is too small"
            )));
        }
        Ok(Self::build(sample_rate, transform_size))
    }

    fn build(sample_rate: u32, transform_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            sample_rate,
            transform_size,
            samples: VecDeque::with_capacity(transform_size),
            window: hann_window(transform_size),
            fft: planner.plan_fft_forward(transform_size),
            scratch: vec![Complex32::new(0.0, 0.0); transform_size],
            frame: vec![f32::NEG_INFINITY; transform_size / 2],
        }
    }

    /// Appends mono samples, keeping only the last `transform_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
        let excess = self.samples.len().saturating_sub(self.transform_size);
        self.samples.drain(..excess);
    }

    /// Whether a full transform's worth of samples is buffered.
    pub fn is_primed(&self) -> bool {
        self.samples.len() == self.transform_size
    }

    /// Recomputes the frame from the buffered samples. A short buffer is
    /// zero-padded at the end.
    pub fn compute(&mut self) -> &[f32] {
        for (i, v) in self.scratch.iter_mut().enumerate() {
            let sample = self.samples.get(i).copied().unwrap_or(0.0);
            *v = Complex32::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let n = self.transform_size as f32;
        for (db, bin) in self.frame.iter_mut().zip(&self.scratch) {
            *db = 20.0 * (bin.norm() / n).log10();
        }
        &self.frame
    }

    /// Latest frame; all bins are `-inf` before the first [`compute`](Self::compute).
    pub fn frame(&self) -> &[f32] {
        &self.frame
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.frame.fill(f32::NEG_INFINITY);
    }
}

impl FrameSource for Analyser {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn transform_size(&self) -> usize {
        self.transform_size
    }

    fn copy_frame(&self, out: &mut Frame) {
        out.clear();
        out.extend_from_slice(&self.frame);
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    let denom = (n.max(2) - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / denom).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WINDOW_SECONDS;

    fn tone(sample_rate: u32, freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn sizes_follow_window_length() {
        let analyser = Analyser::new(44_100, WINDOW_SECONDS);
        assert_eq!(analyser.transform_size(), 1024);
        assert_eq!(analyser.frame().len(), 512);
        assert!(analyser.frame().iter().all(|db| *db == f32::NEG_INFINITY));
        assert!(Analyser::with_transform_size(44_100, 1).is_err());
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyser = Analyser::with_transform_size(44_100, 1024).unwrap();
        let bin_hz = 44_100.0 / 1024.0;
        analyser.push_samples(&tone(44_100, 23.0 * bin_hz, 1.0, 1024));
        assert!(analyser.is_primed());
        let frame = analyser.compute();

        let (peak, level) = frame
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (k, &db)| {
                if db > best.1 {
                    (k, db)
                } else {
                    best
                }
            });
        assert_eq!(peak, 23);
        // A unit sine through a Hann window lands a quarter of full scale.
        assert!((level - 20.0 * 0.25f32.log10()).abs() < 0.5, "level {level}");
        assert!(frame[200] < level - 40.0);
    }

    #[test]
    fn keeps_only_the_latest_samples() {
        let mut analyser = Analyser::with_transform_size(8_000, 64).unwrap();
        analyser.push_samples(&vec![1.0; 100]);
        assert!(analyser.is_primed());
        analyser.push_samples(&vec![0.0; 64]);
        assert!(analyser.compute().iter().all(|db| *db == f32::NEG_INFINITY));
    }

    #[test]
    fn copies_frame_for_sessions() {
        let mut analyser = Analyser::with_transform_size(8_000, 64).unwrap();
        analyser.push_samples(&tone(8_000, 1_000.0, 0.5, 64));
        analyser.compute();
        let mut out = vec![0.0; 3];
        analyser.copy_frame(&mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(out.as_slice(), analyser.frame());

        analyser.clear();
        assert!(!analyser.is_primed());
        assert!(analyser.frame().iter().all(|db| *db == f32::NEG_INFINITY));
    }
}
