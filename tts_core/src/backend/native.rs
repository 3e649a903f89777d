//! In-process synthesis through piper-rs.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use async_stream::try_stream;
use piper_rs::synth::{param_to_percent, AudioOutputConfig, PiperSpeechSynthesizer};
use tokio::sync::mpsc;

use super::{RawAudioStream, SynthesisBackend};
use crate::config::TtsConfig;
use crate::error::{Result, TtsError};
use crate::request::{SynthesisRequest, DEFAULT_SPEED};

/// Synthesized parts in flight between the blocking worker and the stream.
const CHANNEL_CAPACITY: usize = 8;
/// Speed range piper-rs maps its 0-100 `rate` percentage onto.
const RATE_RANGE: (f32, f32) = (0.5, 5.5);

/// A voice loaded once and shared by every call.
///
/// piper-rs only exposes post-processing knobs per call, so speed becomes a
/// time-stretch of the synthesized audio and volume a gain on conversion.
/// Requests carrying `noise_scale`, `noise_w` or a voice id are rejected with
/// [`TtsError::InvalidParameter`]; the subprocess backend supports them.
#[derive(Clone)]
pub struct NativeBackend {
    config_path: PathBuf,
    synth: Arc<RwLock<PiperSpeechSynthesizer>>,
    sample_rate: u32,
}

impl NativeBackend {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let config_path = config.model_config_path();
        if !config_path.is_file() {
            return Err(TtsError::model_not_found(config_path));
        }
        let sample_rate = config.resolve_sample_rate()?;
        let model = piper_rs::from_config_path(&config_path)
            .map_err(|e| TtsError::backend("failed to load voice", e.to_string()))?;
        let synth = PiperSpeechSynthesizer::new(model)
            .map_err(|e| TtsError::backend("failed to create synthesizer", e.to_string()))?;
        tracing::info!(config = %config_path.display(), sample_rate, "loaded piper voice");

        Ok(Self {
            config_path,
            synth: Arc::new(RwLock::new(synth)),
            sample_rate,
        })
    }
}

impl std::fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBackend")
            .field("config_path", &self.config_path)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SynthesisBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn produce_raw_audio(&self, request: SynthesisRequest) -> RawAudioStream {
        let synth = self.synth.clone();
        Box::pin(try_stream! {
            let output = output_config(&request)?;
            let (tx, mut rx) = mpsc::channel::<Result<Vec<u8>>>(CHANNEL_CAPACITY);
            let gain = request.volume().unwrap_or(1.0);
            let text = request.text().to_string();

            let worker = tokio::task::spawn_blocking(move || {
                let guard = match synth.read() {
                    Ok(guard) => guard,
                    Err(_) => {
                        let _ = tx.blocking_send(Err(TtsError::backend(
                            "synthesizer lock poisoned",
                            "",
                        )));
                        return;
                    }
                };
                // One sentence is synthesized per pull.
                let parts = match guard.synthesize_lazy(text, output) {
                    Ok(parts) => parts,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(TtsError::backend("synthesis failed", e.to_string())));
                        return;
                    }
                };
                let parts = parts.map(|part| {
                    part.map(|audio| audio.into_vec())
                        .map_err(|e| TtsError::backend("synthesis failed", e.to_string()))
                });
                forward_parts(parts, gain, &tx);
            });

            let mut total = 0usize;
            while let Some(chunk) = rx.recv().await {
                let bytes = chunk?;
                total += bytes.len();
                yield bytes;
            }
            if let Err(e) = worker.await {
                Err::<(), _>(TtsError::backend("synthesis worker panicked", e.to_string()))?;
            }
            if total == 0 {
                Err::<(), _>(TtsError::backend("voice produced no audio", ""))?;
            }
        })
    }
}

/// Per-call post-processing for `request`, or `None` when the voice's own
/// output is used unchanged.
fn output_config(request: &SynthesisRequest) -> Result<Option<AudioOutputConfig>> {
    let unsupported = [
        ("noise_scale", request.noise_scale().is_some()),
        ("noise_w", request.noise_w().is_some()),
        ("voice", request.voice().is_some()),
    ];
    for (name, set) in unsupported {
        if set {
            return Err(TtsError::InvalidParameter(format!(
                "{name} is not supported by the native backend"
            )));
        }
    }

    let speed = request.speed();
    if speed == DEFAULT_SPEED {
        return Ok(None);
    }
    if !(RATE_RANGE.0..=RATE_RANGE.1).contains(&speed) {
        return Err(TtsError::InvalidParameter(format!(
            "Speed must be within {}..={} for the native backend, got {speed}",
            RATE_RANGE.0, RATE_RANGE.1
        )));
    }
    Ok(Some(AudioOutputConfig {
        rate: Some(param_to_percent(speed, RATE_RANGE.0, RATE_RANGE.1)),
        volume: None,
        pitch: None,
        appended_silence_ms: None,
    }))
}

/// Convert and send parts until they run out, one fails, or the receiver is
/// dropped. The receiver is checked before each pull, so a cancelled call
/// stops after the sentence in progress.
fn forward_parts<I>(parts: I, gain: f32, tx: &mpsc::Sender<Result<Vec<u8>>>)
where
    I: Iterator<Item = Result<Vec<f32>>>,
{
    let mut parts = parts;
    loop {
        if tx.is_closed() {
            tracing::debug!("receiver dropped, stopping native synthesis");
            return;
        }
        let Some(part) = parts.next() else {
            return;
        };
        let chunk = part.map(|samples| to_pcm16(&samples, gain));
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

/// f32 samples in `-1.0..=1.0` to little-endian 16-bit PCM.
fn to_pcm16(samples: &[f32], gain: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        let v = (s * gain).clamp(-1.0, 1.0);
        out.extend_from_slice(&((v * i16::MAX as f32) as i16).to_le_bytes());
    }
    out
}
