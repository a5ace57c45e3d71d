//! micro_speech on the host: synthetic microphone → features → toy model.
//!
//! There is no keyword model here. A synthetic microphone plays low-pitched
//! and high-pitched tone bursts over background hiss, and a toy classifier
//! that compares low-band and high-band energy calls them "yes" and "no".
//! It exercises the capture worker, the feature cache and the recognition
//! loop end to end in real time.
//!
//! Pipeline:
//! ```text
//!   SynthMic ──► CaptureWorker ──► AudioProvider ──► FeatureProvider<MelFrontend>
//!                                                             │
//!                                        BandEnergyClassifier ◄┘
//! ```
//!
//! Run with `RUST_LOG=micro_speech=debug` to watch the cache at work.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use micro_speech::constants::{CATEGORY_COUNT, FEATURE_SIZE};
use micro_speech::features::MelFrontend;
use micro_speech::{
    AudioProvider, CaptureSettings, Classifier, Microphone, ModelSettings, SpeechPipeline,
};

/// How long the demo listens.
const RUN_TIME: Duration = Duration::from_secs(8);

/// Bursts alternate low/high, each followed by the same length of hiss.
const BURST_MS: u64 = 600;
const LOW_TONE_HZ: f32 = 400.0;
const HIGH_TONE_HZ: f32 = 4000.0;

// ── Synthetic microphone ─────────────────────────────────────────────

/// Delivers 16-bit PCM at the real-time rate: tone bursts over hiss.
struct SynthMic {
    sample_rate: u32,
    position: u64,
    noise: u32,
}

impl SynthMic {
    fn new(sample_rate: u32) -> Self {
        SynthMic {
            sample_rate,
            position: 0,
            noise: 0x1234_5678,
        }
    }

    /// xorshift32, scaled to ±1.
    fn hiss(&mut self) -> f32 {
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        (self.noise as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    fn next_sample(&mut self) -> i16 {
        let rate = self.sample_rate as u64;
        let ms = self.position * 1000 / rate;
        let period = ms / BURST_MS;
        let t = self.position as f32 / self.sample_rate as f32;
        self.position += 1;

        let tone = match period % 4 {
            0 => 0.5 * (2.0 * std::f32::consts::PI * LOW_TONE_HZ * t).sin(),
            2 => 0.5 * (2.0 * std::f32::consts::PI * HIGH_TONE_HZ * t).sin(),
            _ => 0.0,
        };
        let value = tone + 0.002 * self.hiss();
        (value * i16::MAX as f32) as i16
    }
}

impl Microphone for SynthMic {
    type Error = Infallible;

    fn read_chunk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, Self::Error> {
        let samples = buf.len() / 2;
        // Pace like an I2S driver: a chunk is ready once it has been "recorded".
        std::thread::sleep(Duration::from_micros(
            samples as u64 * 1_000_000 / self.sample_rate as u64,
        ));
        for pair in buf.chunks_exact_mut(2) {
            pair.copy_from_slice(&self.next_sample().to_le_bytes());
        }
        Ok(samples * 2)
    }
}

// ── Toy classifier ───────────────────────────────────────────────────

/// Averages the newest slices and compares the lower and upper half of the
/// mel bands.
struct BandEnergyClassifier {
    recent_slices: usize,
    silence_level: i32,
    margin: i32,
}

impl Classifier for BandEnergyClassifier {
    type Error = Infallible;

    fn classify(&mut self, features: &[i8], scores: &mut [i8; CATEGORY_COUNT]) -> Result<(), Self::Error> {
        let half = FEATURE_SIZE / 2;
        let newest = features.len() - self.recent_slices * FEATURE_SIZE;

        let (mut low, mut high) = (0i32, 0i32);
        for slice in features[newest..].chunks_exact(FEATURE_SIZE) {
            low += slice[..half].iter().map(|&v| v as i32).sum::<i32>();
            high += slice[half..].iter().map(|&v| v as i32).sum::<i32>();
        }
        let n = (self.recent_slices * half) as i32;
        let (low, high) = (low / n, high / n);

        // silence, unknown, yes, no
        let winner = if low.max(high) < self.silence_level {
            0
        } else if low - high > self.margin {
            2
        } else if high - low > self.margin {
            3
        } else {
            1
        };
        *scores = [-128; CATEGORY_COUNT];
        scores[winner] = 127;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = ModelSettings::MICRO_SPEECH;
    let capture = CaptureSettings {
        startup_timeout: Some(Duration::from_secs(2)),
        ..CaptureSettings::DEFAULT
    };

    let audio = AudioProvider::start(SynthMic::new(settings.sample_rate), settings, capture)
        .context("starting audio capture")?;
    let classifier = BandEnergyClassifier {
        recent_slices: 10,
        silence_level: -60,
        margin: 10,
    };
    let mut pipeline = SpeechPipeline::new(settings, audio, MelFrontend::new(settings), classifier)
        .context("building the recognition pipeline")?;

    info!(run_time_s = RUN_TIME.as_secs(), "listening");
    let started = Instant::now();
    let mut last_label = "";
    while started.elapsed() < RUN_TIME {
        match pipeline.run_cycle() {
            Ok(Some(result)) => {
                let top = result.detection();
                if top.label != last_label {
                    println!(
                        "{:>6} ms  {:<8} ({:.2})",
                        result.timestamp_ms, top.label, top.score
                    );
                    last_label = top.label;
                }
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(5)),
            Err(err) => warn!(%err, "recognition cycle failed"),
        }
    }

    pipeline.into_audio().shutdown();
    info!("done");
    Ok(())
}
