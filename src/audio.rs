//! Microphone capture feeding a tracking session
//!
//! The cpal callback pushes mono samples into a lock-free ring buffer. A
//! processing thread drains it into a shared [`Analyser`], recomputes the
//! frame every hop and runs the session's per-frame update, sending each new
//! smoothed position over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::analyser::Analyser;
use crate::config::WINDOW_SECONDS;
use crate::error::{Error, Result};
use crate::session::{FrameSource, VowelTrackingSession};
use crate::types::Coordinate;

const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Running capture. Dropping it stops the stream and the processing thread.
pub struct Capture {
    pub positions: Receiver<Coordinate>,
    /// Configuration errors raised by the session, once per settings generation.
    pub faults: Receiver<Error>,
    pub device_name: String,
    pub sample_rate: u32,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    _stream: cpal::Stream,
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Opens the default input device and attaches it to `session`.
///
/// # Errors
///
/// Returns [`Error::Audio`] if no usable input device or stream is available
pub fn start_capture(mut session: VowelTrackingSession) -> Result<Capture> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".into()))?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let config = choose_input_config(&device, TARGET_SAMPLE_RATE)?;
    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels());

    let capacity = (sample_rate as usize).saturating_mul(2);
    let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

    let stream_config: cpal::StreamConfig = config.clone().into();
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>,
        cpal::SampleFormat::I16 => build_stream::<i16>,
        cpal::SampleFormat::U16 => build_stream::<u16>,
        other => return Err(Error::Audio(format!("unsupported sample format {other:?}"))),
    }(&device, &stream_config, channels, producer)?;

    let analyser = Arc::new(Mutex::new(Analyser::new(sample_rate, WINDOW_SECONDS)));
    session.attach(Arc::clone(&analyser));

    let (positions_tx, positions) = crossbeam_channel::unbounded();
    let (faults_tx, faults) = crossbeam_channel::unbounded();
    let outputs = Outputs {
        positions: positions_tx,
        faults: faults_tx,
    };
    let stop = Arc::new(AtomicBool::new(false));
    let worker = spawn_processing_thread(consumer, analyser, session, outputs, Arc::clone(&stop));

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::info!(device = %device_name, sample_rate, channels, "capture started");

    Ok(Capture {
        positions,
        faults,
        device_name,
        sample_rate,
        stop,
        worker: Some(worker),
        _stream: stream,
    })
}

/// Where the processing thread sends its results.
struct Outputs {
    positions: Sender<Coordinate>,
    faults: Sender<Error>,
}

fn spawn_processing_thread(
    mut consumer: HeapConsumer<f32>,
    analyser: Arc<Mutex<Analyser>>,
    mut session: VowelTrackingSession,
    outputs: Outputs,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let hop = {
            let analyser = analyser.lock().unwrap_or_else(PoisonError::into_inner);
            (analyser.transform_size() / 2).max(1)
        };
        let mut chunk = Vec::with_capacity(hop);

        while !stop.load(Ordering::Relaxed) {
            if consumer.len() < hop {
                thread::sleep(Duration::from_millis(1));
                continue;
            }

            chunk.clear();
            for _ in 0..hop {
                if let Some(s) = consumer.pop() {
                    chunk.push(s);
                }
            }

            if !process_hop(&chunk, &analyser, &mut session, &outputs) {
                break;
            }
        }
        session.detach();
    })
}

/// Feeds one hop of samples through the analyser and the session.
///
/// Returns `false` once the owner has dropped its receivers.
fn process_hop(
    chunk: &[f32],
    analyser: &Mutex<Analyser>,
    session: &mut VowelTrackingSession,
    outputs: &Outputs,
) -> bool {
    {
        let mut analyser = analyser.lock().unwrap_or_else(PoisonError::into_inner);
        analyser.push_samples(chunk);
        if !analyser.is_primed() {
            return true;
        }
        analyser.compute();
    }

    match session.on_audio_callback() {
        Ok(Some(position)) => outputs.positions.send(position).is_ok(),
        Ok(None) => true,
        Err(err) if err.is_configuration() => outputs.faults.send(err).is_ok(),
        // Per-frame failures are logged by the session.
        Err(_) => true,
    }
}

fn choose_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?;

    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score = i32::MIN;
    for range in ranges {
        let min = range.min_sample_rate().0;
        let max = range.max_sample_rate().0;
        let rate = if (min..=max).contains(&target_rate) {
            target_rate
        } else {
            max.min(target_rate.max(min))
        };
        let cfg = range.with_sample_rate(cpal::SampleRate(rate));

        let mut score = 0;
        if cfg.sample_rate().0 == target_rate {
            score += 2;
        }
        if cfg.sample_format() == cpal::SampleFormat::F32 {
            score += 1;
        }
        if score > best_score {
            best_score = score;
            best = Some(cfg);
        }
    }
    best.ok_or_else(|| Error::Audio("no supported input config".into()))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut producer: HeapProducer<f32>,
) -> Result<cpal::Stream>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _| {
                for frame in data.chunks(channels) {
                    // Mix down to mono.
                    let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                    let _ = producer.push(sum / frame.len() as f32);
                }
            },
            stream_error,
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

fn stream_error(err: cpal::StreamError) {
    tracing::error!(error = %err, "input stream error");
}
