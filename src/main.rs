use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vowel_worm::config::WINDOW_SECONDS;
use vowel_worm::{
    weights, Analyser, FrameSource, MappingMode, SessionParams, SettingsFile,
    VowelTrackingSession, WeightSet,
};

/// vowel-worm - track speech through the vowel space
#[derive(Parser)]
#[command(name = "vowel-worm", version, about)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, env = "VOWEL_WORM_CONFIG")]
    config: Option<PathBuf>,

    /// Mapping strategy: linear_regression, mfcc_formants or cepstrum_formants
    #[arg(short, long)]
    mode: Option<MappingMode>,

    /// Smoothing window in frames
    #[arg(short, long)]
    window: Option<usize>,

    /// L2-normalize the MFCCs before regression
    #[arg(long)]
    normalize: bool,

    /// Directory holding weights.json and weights_norm_mfcc.json
    #[arg(long, env = "VOWEL_WORM_WEIGHTS")]
    weights_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track the default microphone
    Run,
    /// Track a WAV file and print one position per accepted frame
    Analyze {
        /// Input WAV file
        path: PathBuf,
        /// Samples between frames (defaults to half a transform)
        #[arg(long)]
        hop: Option<usize>,
    },
    /// Check a weight document and report its length
    Weights {
        /// JSON weight document
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,vowel_worm=info",
        1 => "info,vowel_worm=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Weights { path } = &cli.command {
        return check_weights(path);
    }

    let (params, weights) = load_settings(&cli)?;
    let session = VowelTrackingSession::new(params, weights);

    match cli.command {
        Command::Run => run_capture(session),
        Command::Analyze { path, hop } => analyze(session, &path, hop),
        Command::Weights { .. } => Ok(()),
    }
}

/// Defaults, then the settings file, then command-line flags.
fn load_settings(cli: &Cli) -> anyhow::Result<(Arc<SessionParams>, WeightSet)> {
    let params = Arc::new(SessionParams::new());
    let mut weights_dir = None;

    if let Some(path) = &cli.config {
        let file = SettingsFile::load(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        file.apply(&params)?;
        weights_dir = file.mapping.weights_dir;
    }

    if let Some(mode) = cli.mode {
        params.set_mode(mode);
    }
    if let Some(window) = cli.window {
        if window == 0 {
            bail!("smoothing window must be at least 1");
        }
        params.set_smoothing_window(window);
    }
    if cli.normalize {
        params.set_normalize(true);
    }

    let weights = match cli.weights_dir.as_ref().or(weights_dir.as_ref()) {
        Some(dir) => WeightSet::load_dir(dir)
            .with_context(|| format!("loading weights from {}", dir.display()))?,
        None => WeightSet::builtin(),
    };

    tracing::debug!(settings = ?params.snapshot(), "session settings");
    Ok((params, weights))
}

fn check_weights(path: &Path) -> anyhow::Result<()> {
    let entry = weights::load_entry(path)
        .with_context(|| format!("reading weights from {}", path.display()))?;
    println!(
        "{}: {} weights per dimension (bias + {} features)",
        path.display(),
        entry.len(),
        entry.len() - 1
    );
    Ok(())
}

fn analyze(mut session: VowelTrackingSession, path: &Path, hop: Option<usize>) -> anyhow::Result<()> {
    let (samples, sample_rate) =
        read_wav(path).with_context(|| format!("reading {}", path.display()))?;

    let analyser = Arc::new(Mutex::new(Analyser::new(sample_rate, WINDOW_SECONDS)));
    let transform_size = analyser
        .lock()
        .map_err(|_| anyhow::anyhow!("analyser lock poisoned"))?
        .transform_size();
    let hop = hop.unwrap_or(transform_size / 2).max(1);
    session.attach(Arc::clone(&analyser));

    tracing::info!(
        samples = samples.len(),
        sample_rate,
        transform_size,
        hop,
        mode = %session.mode(),
        "analysing"
    );

    let mut consumed = 0usize;
    for chunk in samples.chunks(hop) {
        consumed += chunk.len();
        {
            let mut analyser = analyser
                .lock()
                .map_err(|_| anyhow::anyhow!("analyser lock poisoned"))?;
            analyser.push_samples(chunk);
            if !analyser.is_primed() {
                continue;
            }
            analyser.compute();
        }

        match session.on_audio_callback() {
            Ok(Some(position)) => {
                let t = consumed as f64 / f64::from(sample_rate);
                println!("{t:.3}\t{:.4}\t{:.4}", position.backness, position.height);
            }
            Ok(None) => {}
            Err(e) if e.is_configuration() => return Err(e.into()),
            Err(_) => {}
        }
    }
    Ok(())
}

/// Mono f32 samples and the sample rate.
fn read_wav(path: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

#[cfg(feature = "capture")]
fn run_capture(session: VowelTrackingSession) -> anyhow::Result<()> {
    let capture = vowel_worm::audio::start_capture(session)?;
    tracing::info!(
        device = %capture.device_name,
        sample_rate = capture.sample_rate,
        "listening"
    );
    loop {
        crossbeam_channel::select! {
            recv(capture.positions) -> position => match position {
                Ok(position) => println!("{:.4}\t{:.4}", position.backness, position.height),
                Err(_) => return Ok(()),
            },
            recv(capture.faults) -> fault => match fault {
                Ok(fault) => return Err(fault.into()),
                Err(_) => return Ok(()),
            },
        }
    }
}

#[cfg(not(feature = "capture"))]
fn run_capture(_session: VowelTrackingSession) -> anyhow::Result<()> {
    bail!("built without microphone support; rebuild with `--features capture`")
}
