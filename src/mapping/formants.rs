use crate::config::MappingConfig;
use crate::error::Result;
use crate::mapping::{formants_to_vowel_space, MappingMode, MappingStrategy};
use crate::processing::FeatureExtractor;
use crate::types::{Coordinate, FormantPair};

/// Estimates F1/F2 from the MFCC envelope and places them in vowel space.
#[derive(Debug, Default)]
pub struct MfccFormantMapping;

impl MfccFormantMapping {
    pub fn new() -> Self {
        Self
    }
}

impl MappingStrategy for MfccFormantMapping {
    fn mode(&self) -> MappingMode {
        MappingMode::MfccFormants
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
        let formants = extractor.formants_from_mfcc(&mfccs, config);
        let Some(pair) = FormantPair::from_sorted(&formants) else {
            tracing::trace!(found = formants.len(), "not enough mfcc formants");
            return Ok(None);
        };
        Ok(Some(formants_to_vowel_space(pair, &extractor.formant_bounds())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{FormantBounds, FormantQuery, SpectralExtractor};
    use crate::types::FeatureVector;

    struct Scripted {
        mfccs: Vec<f64>,
        formants: Vec<f64>,
    }

    impl FeatureExtractor for Scripted {
        fn mfcc(&self, _frame: &[f32], _config: &MappingConfig) -> FeatureVector {
            FeatureVector::new(self.mfccs.clone())
        }

        fn formants_from_mfcc(&self, _mfccs: &FeatureVector, _config: &MappingConfig) -> Vec<f64> {
            self.formants.clone()
        }

        fn cepstrum(&self, _frame: &[f32], _config: &MappingConfig) -> Vec<f64> {
            unreachable!("mfcc mapping never asks for a cepstrum")
        }

        fn formants_from_cepstrum(&self, _cepstrum: &[f64], _query: &FormantQuery) -> Vec<f64> {
            unreachable!("mfcc mapping never asks for cepstral formants")
        }

        fn formant_bounds(&self) -> FormantBounds {
            FormantBounds {
                f1_min: 100.0,
                f1_max: 1000.0,
                f2_min: 500.0,
                f2_max: 2500.0,
            }
        }
    }

    fn cfg() -> MappingConfig {
        MappingConfig::new(44_100, 1024)
    }

    #[test]
    fn maps_first_two_formants() {
        let extractor = Scripted {
            mfccs: vec![1.0; 40],
            formants: vec![550.0, 1500.0, 2400.0],
        };
        let c = MfccFormantMapping::new()
            .map(&[0.0; 512], &cfg(), &extractor)
            .unwrap()
            .unwrap();
        // F2 1500 is halfway between 2500 and 500; F1 550 is halfway between 1000 and 100.
        assert_eq!(c.backness, 2.0);
        assert_eq!(c.height, 1.5);
    }

    #[test]
    fn single_formant_is_skipped() {
        let extractor = Scripted {
            mfccs: vec![1.0; 40],
            formants: vec![700.0],
        };
        let result = MfccFormantMapping::new()
            .map(&[0.0; 512], &cfg(), &extractor)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_mfccs_are_skipped() {
        let extractor = Scripted {
            mfccs: Vec::new(),
            formants: vec![500.0, 1500.0],
        };
        let result = MfccFormantMapping::new()
            .map(&[0.0; 512], &cfg(), &extractor)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn silent_frame_through_spectral_extractor_is_skipped() {
        let frame = vec![f32::NEG_INFINITY; 512];
        let result = MfccFormantMapping::new()
            .map(&frame, &cfg(), &SpectralExtractor::new())
            .unwrap();
        assert!(result.is_none());
    }
}
