use crate::error::{Error, Result};

/// Decibel magnitudes of one transform, `transform_size / 2` bins.
pub type Frame = Vec<f32>;

/// A point in the vowel space. Backness nominally spans 0..=4 and height
/// 0..=3, but mappings are linear and never clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub backness: f64,
    pub height: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(backness: f64, height: f64) -> Self {
        Self { backness, height }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.backness.is_finite() && self.height.is_finite()
    }

    /// Applies `f` to each dimension pair of `self` and `other`.
    #[must_use]
    pub fn zip_with(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            backness: f(self.backness, other.backness),
            height: f(self.height, other.height),
        }
    }
}

/// First and second formant frequencies in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantPair {
    pub f1: f64,
    pub f2: f64,
}

impl FormantPair {
    /// Takes the two lowest entries of an ascending formant list.
    #[must_use]
    pub fn from_sorted(formants: &[f64]) -> Option<Self> {
        match formants {
            [f1, f2, ..] => Some(Self { f1: *f1, f2: *f2 }),
            _ => None,
        }
    }
}

/// Ordered scalar features extracted from one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Copies out `range`, truncated to the available coefficients.
    #[must_use]
    pub fn select(&self, range: std::ops::Range<usize>) -> Self {
        let end = range.end.min(self.0.len());
        let start = range.start.min(end);
        Self(self.0[start..end].to_vec())
    }

    /// Divides every element by the Euclidean norm, in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateFeatures`] when the norm is zero or not finite;
    /// the vector is left unchanged.
    pub fn normalize(&mut self) -> Result<()> {
        let norm = self.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(Error::DegenerateFeatures);
        }
        for v in &mut self.0 {
            *v /= norm;
        }
        Ok(())
    }

    /// Prepends the constant regression intercept.
    #[must_use]
    pub fn with_bias(&self) -> Self {
        let mut values = Vec::with_capacity(self.0.len() + 1);
        values.push(1.0);
        values.extend_from_slice(&self.0);
        Self(values)
    }

    /// Sum of elementwise products. Lengths are expected to match.
    #[must_use]
    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.0.iter().zip(weights).map(|(x, w)| x * w).sum()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_norm() {
        let mut v = FeatureVector::new(vec![3.0, 4.0]);
        v.normalize().unwrap();
        assert_eq!(v.as_slice(), &[0.6, 0.8]);
    }

    #[test]
    fn normalize_rejects_zero_vector() {
        let mut v = FeatureVector::new(vec![0.0; 24]);
        assert!(matches!(v.normalize(), Err(Error::DegenerateFeatures)));
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn select_truncates_to_available() {
        let v = FeatureVector::new((0..10).map(f64::from).collect());
        assert_eq!(v.select(1..25).len(), 9);
        assert_eq!(v.select(1..4).as_slice(), &[1.0, 2.0, 3.0]);
        assert!(v.select(20..25).is_empty());
    }

    #[test]
    fn bias_is_prepended() {
        let v = FeatureVector::new(vec![2.0, 3.0]).with_bias();
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(v.dot(&[1.0, 1.0, 1.0]), 6.0);
    }

    #[test]
    fn formant_pair_needs_two() {
        assert!(FormantPair::from_sorted(&[500.0]).is_none());
        let pair = FormantPair::from_sorted(&[500.0, 1500.0, 2500.0]).unwrap();
        assert_eq!(pair.f1, 500.0);
        assert_eq!(pair.f2, 1500.0);
    }
}
