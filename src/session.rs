//! Per-source tracking engine
//!
//! The audio side calls [`VowelTrackingSession::on_audio_callback`] once per
//! analysis frame. The session copies the frame out of its source, maps it with
//! the strategy selected in [`SessionParams`], and folds the result into its
//! [`PositionSmoother`]. The smoother is only touched by a fully successful
//! mapping.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{SessionParams, SessionSettings};
use crate::error::{Error, Result};
use crate::extensions::{ExtensionRegistry, SessionExtension};
use crate::mapping::{strategy_for, MappingMode, MappingStrategy};
use crate::processing::{FeatureExtractor, SpectralExtractor};
use crate::smoothing::PositionSmoother;
use crate::types::{Coordinate, Frame};
use crate::weights::WeightSet;

/// Something that holds the latest frequency-domain frame.
pub trait FrameSource: Send {
    fn sample_rate(&self) -> u32;

    fn transform_size(&self) -> usize;

    /// Replaces the contents of `out` with the current frame.
    fn copy_frame(&self, out: &mut Frame);
}

impl<T: FrameSource> FrameSource for Arc<Mutex<T>> {
    fn sample_rate(&self) -> u32 {
        self.lock().unwrap_or_else(PoisonError::into_inner).sample_rate()
    }

    fn transform_size(&self) -> usize {
        self.lock().unwrap_or_else(PoisonError::into_inner).transform_size()
    }

    fn copy_frame(&self, out: &mut Frame) {
        self.lock().unwrap_or_else(PoisonError::into_inner).copy_frame(out);
    }
}

/// A configuration error already reported for one settings generation.
struct LatchedFault {
    generation: u64,
    message: String,
}

pub struct VowelTrackingSession {
    source: Option<Box<dyn FrameSource>>,
    params: Arc<SessionParams>,
    weights: WeightSet,
    extractor: Arc<dyn FeatureExtractor>,
    strategy: Box<dyn MappingStrategy>,
    smoother: PositionSmoother,
    extensions: Vec<(String, Box<dyn SessionExtension>)>,
    fault: Option<LatchedFault>,
    frame: Frame,
}

impl VowelTrackingSession {
    pub fn new(params: Arc<SessionParams>, weights: WeightSet) -> Self {
        let settings = params.snapshot();
        Self {
            source: None,
            strategy: strategy_for(settings.mode, &weights),
            smoother: PositionSmoother::new(settings.smoothing_window),
            params,
            weights,
            extractor: Arc::new(SpectralExtractor::new()),
            extensions: Vec::new(),
            fault: None,
            frame: Frame::new(),
        }
    }

    /// Swaps the built-in spectral extractor for another implementation.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Instantiates every extension currently in `registry`.
    #[must_use]
    pub fn with_extensions(mut self, registry: &ExtensionRegistry) -> Self {
        self.extensions.extend(registry.instantiate());
        self
    }

    pub fn attach(&mut self, source: impl FrameSource + 'static) {
        if self.source.is_some() {
            self.detach();
        }
        tracing::info!(
            sample_rate = source.sample_rate(),
            transform_size = source.transform_size(),
            "frame source attached"
        );
        self.source = Some(Box::new(source));
    }

    /// Releases the source and clears all per-source state.
    pub fn detach(&mut self) -> Option<Box<dyn FrameSource>> {
        let source = self.source.take()?;
        self.clear();
        self.frame.clear();
        tracing::info!("frame source detached");
        Some(source)
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.source.as_ref().map(|s| s.sample_rate())
    }

    pub fn transform_size(&self) -> Option<usize> {
        self.source.as_ref().map(|s| s.transform_size())
    }

    /// Processes the attached source's current frame.
    ///
    /// Returns the new smoothed position, or `Ok(None)` when the frame was
    /// skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAttached`] without a source
    /// - A configuration error such as [`Error::MissingWeights`], once per
    ///   settings generation; later frames are skipped until a setting changes
    /// - [`Error::DegenerateFeatures`] or [`Error::NonFiniteCoordinate`] for a
    ///   frame that could not be mapped; the smoother is left untouched
    pub fn on_audio_callback(&mut self) -> Result<Option<Coordinate>> {
        let source = self.source.as_ref().ok_or(Error::NotAttached)?;
        let sample_rate = source.sample_rate();
        let transform_size = source.transform_size();
        source.copy_frame(&mut self.frame);

        let frame = std::mem::take(&mut self.frame);
        let result = self.process_frame(&frame, sample_rate, transform_size);
        self.frame = frame;
        result
    }

    /// Like [`on_audio_callback`](Self::on_audio_callback) for a frame the
    /// caller already holds.
    ///
    /// # Errors
    ///
    /// Same as [`on_audio_callback`](Self::on_audio_callback), minus
    /// [`Error::NotAttached`]
    pub fn process_frame(
        &mut self,
        frame: &[f32],
        sample_rate: u32,
        transform_size: usize,
    ) -> Result<Option<Coordinate>> {
        let settings = self.params.snapshot();
        self.sync_settings(&settings);

        if let Some(fault) = &self.fault {
            if fault.generation == settings.generation {
                return Ok(None);
            }
            tracing::info!(previous = %fault.message, "settings changed, retrying");
            self.fault = None;
        }

        let config = settings.mapping_config(sample_rate, transform_size);
        let mapped = if config.min_hz >= config.max_hz {
            Err(Error::InvalidConfig(format!(
                "analysis range {}..{} Hz is empty",
                config.min_hz, config.max_hz
            )))
        } else {
            self.strategy.map(frame, &config, &*self.extractor)
        };

        match mapped {
            Ok(Some(raw)) if raw.is_finite() => {
                let position = self.smoother.push(raw);
                for (_, extension) in &mut self.extensions {
                    extension.on_position(&position);
                }
                Ok(Some(position))
            }
            Ok(Some(raw)) => {
                tracing::warn!(?raw, mode = %settings.mode, "non-finite coordinate dropped");
                Err(Error::NonFiniteCoordinate)
            }
            Ok(None) => {
                tracing::trace!(mode = %settings.mode, "frame skipped");
                Ok(None)
            }
            Err(err) if err.is_configuration() => {
                tracing::error!(error = %err, mode = %settings.mode, "session misconfigured");
                self.fault = Some(LatchedFault {
                    generation: settings.generation,
                    message: err.to_string(),
                });
                Err(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, mode = %settings.mode, "frame rejected");
                Err(err)
            }
        }
    }

    fn sync_settings(&mut self, settings: &SessionSettings) {
        if settings.mode != self.strategy.mode() {
            tracing::info!(from = %self.strategy.mode(), to = %settings.mode, "switching mapping");
            self.strategy = strategy_for(settings.mode, &self.weights);
        }
        if settings.smoothing_window.max(1) != self.smoother.window() {
            tracing::debug!(window = settings.smoothing_window, "smoothing window changed");
            self.smoother.set_window(settings.smoothing_window);
            self.notify_reset();
        }
    }

    /// Smoothed position, `None` before the first accepted frame.
    pub fn position(&self) -> Option<Coordinate> {
        self.smoother.current()
    }

    pub fn reset_position(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.smoother.reset();
        self.fault = None;
        self.notify_reset();
    }

    fn notify_reset(&mut self) {
        for (_, extension) in &mut self.extensions {
            extension.on_reset();
        }
    }

    /// Strategy in use for the most recent frame.
    pub fn mode(&self) -> MappingMode {
        self.strategy.mode()
    }

    pub fn params(&self) -> &Arc<SessionParams> {
        &self.params
    }

    /// Message of the configuration error currently suppressing frames.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_ref().map(|f| f.message.as_str())
    }

    pub fn history_len(&self) -> usize {
        self.smoother.len()
    }

    pub fn extension(&self, name: &str) -> Option<&dyn SessionExtension> {
        self.extensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.as_ref())
    }

    pub fn extension_mut(&mut self, name: &str) -> Option<&mut (dyn SessionExtension + 'static)> {
        self.extensions
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.as_mut())
    }

    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(|(n, _)| n.as_str())
    }
}
