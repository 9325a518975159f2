use crate::config::MappingConfig;
use crate::error::Result;
use crate::mapping::{formants_to_vowel_space, MappingMode, MappingStrategy};
use crate::processing::{FeatureExtractor, FormantQuery};
use crate::types::{Coordinate, FormantPair};

/// Formants requested from the cepstral envelope.
pub const CEPSTRUM_FORMANTS: usize = 2;
/// Lifter cutoff separating envelope from pitch structure.
pub const CEPSTRUM_CUTOFF_HZ: f64 = 200.0;

/// Reads F1/F2 off the liftered real cepstrum.
#[derive(Debug, Default)]
pub struct CepstrumFormantMapping;

impl CepstrumFormantMapping {
    pub fn new() -> Self {
        Self
    }

    fn query(config: &MappingConfig) -> FormantQuery {
        FormantQuery {
            num_formants: CEPSTRUM_FORMANTS,
            sample_rate: config.sample_rate,
            transform_size: config.transform_size,
            cutoff_hz: CEPSTRUM_CUTOFF_HZ,
        }
    }
}

impl MappingStrategy for CepstrumFormantMapping {
    fn mode(&self) -> MappingMode {
        MappingMode::CepstrumFormants
    }

    fn map(
        &self,
        frame: &[f32],
        config: &MappingConfig,
        extractor: &dyn FeatureExtractor,
    ) -> Result<Option<Coordinate>> {
        let cepstrum = extractor.cepstrum(frame, config);
        if cepstrum.is_empty() {
            return Ok(None);
        }
        let formants = extractor.formants_from_cepstrum(&cepstrum, &Self::query(config));
        let Some(pair) = FormantPair::from_sorted(&formants) else {
            tracing::trace!(found = formants.len(), "not enough cepstral formants");
            return Ok(None);
        };
        Ok(Some(formants_to_vowel_space(pair, &extractor.formant_bounds())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::mapping::{BACKNESS_MIN, HEIGHT_MIN};
    use crate::processing::{FormantBounds, SpectralExtractor};
    use crate::types::FeatureVector;

    /// Records the query it was handed.
    struct Recording {
        cepstrum: Vec<f64>,
        formants: Vec<f64>,
        seen: Mutex<Option<FormantQuery>>,
    }

    impl FeatureExtractor for Recording {
        fn mfcc(&self, _frame: &[f32], _config: &MappingConfig) -> FeatureVector {
            FeatureVector::default()
        }

        fn formants_from_mfcc(&self, _mfccs: &FeatureVector, _config: &MappingConfig) -> Vec<f64> {
            Vec::new()
        }

        fn cepstrum(&self, _frame: &[f32], _config: &MappingConfig) -> Vec<f64> {
            self.cepstrum.clone()
        }

        fn formants_from_cepstrum(&self, _cepstrum: &[f64], query: &FormantQuery) -> Vec<f64> {
            *self.seen.lock().unwrap() = Some(*query);
            self.formants.clone()
        }

        fn formant_bounds(&self) -> FormantBounds {
            FormantBounds::default()
        }
    }

    fn recording(cepstrum: Vec<f64>, formants: Vec<f64>) -> Recording {
        Recording {
            cepstrum,
            formants,
            seen: Mutex::new(None),
        }
    }

    #[test]
    fn asks_for_two_formants_above_cutoff() {
        let extractor = recording(vec![0.0; 256], vec![1200.0, 3100.0]);
        let cfg = MappingConfig::new(22_050, 512);
        let c = CepstrumFormantMapping::new()
            .map(&[0.0; 256], &cfg, &extractor)
            .unwrap()
            .unwrap();

        let query = extractor.seen.lock().unwrap().unwrap();
        assert_eq!(query.num_formants, 2);
        assert_eq!(query.cutoff_hz, 200.0);
        assert_eq!(query.sample_rate, 22_050);
        assert_eq!(query.transform_size, 512);

        // F1 at its maximum is fully open; F2 at 3100 is fully front.
        assert_eq!(c.height, HEIGHT_MIN);
        assert_eq!(c.backness, BACKNESS_MIN);
    }

    #[test]
    fn empty_cepstrum_is_skipped_before_formant_search() {
        let extractor = recording(Vec::new(), vec![500.0, 1500.0]);
        let result = CepstrumFormantMapping::new()
            .map(&[0.0; 256], &MappingConfig::new(22_050, 512), &extractor)
            .unwrap();
        assert!(result.is_none());
        assert!(extractor.seen.lock().unwrap().is_none());
    }

    #[test]
    fn missing_formants_are_skipped() {
        let extractor = recording(vec![0.0; 256], vec![500.0]);
        let result = CepstrumFormantMapping::new()
            .map(&[0.0; 256], &MappingConfig::new(22_050, 512), &extractor)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn flat_spectrum_has_no_formants() {
        let frame = vec![-40.0f32; 512];
        let result = CepstrumFormantMapping::new()
            .map(&frame, &MappingConfig::new(44_100, 1024), &SpectralExtractor::new())
            .unwrap();
        assert!(result.is_none());
    }
}
