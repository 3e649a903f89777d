//! Streaming text-to-speech on top of the Piper synthesizer.
//!
//! [`PiperTts`] turns text into a lazy stream of fixed-duration
//! [`AudioFrame`]s, driving either the `piper` binary or (with the `native`
//! feature) an in-process piper-rs voice, and records per-call latency as the
//! frames are pulled.

mod adapter;
pub mod backend;
mod chunker;
mod config;
mod error;
mod frame;
mod latency;
mod request;
mod sentences;
mod stats;
mod turn_latency;
pub mod wav;

pub use adapter::{PiperTts, SynthesisStream};
pub use backend::SynthesisBackend;
pub use chunker::FrameChunker;
pub use config::{
    load_env_files, read_sample_rate, resolve_piper_path, BackendKind, TtsConfig,
    DEFAULT_FRAME_MS, DEFAULT_MODEL, DEFAULT_SAMPLE_RATE,
};
pub use error::{Result, TtsError};
pub use frame::{AudioFrame, BYTES_PER_SAMPLE};
pub use latency::{Checkpoint, LatencyRecord, LatencyReport};
pub use request::{SynthesisRequest, DEFAULT_SPEED};
pub use sentences::{split_sentences, SentenceSplitter, DEFAULT_MIN_SENTENCE_LEN};
pub use stats::{LatencySummary, Stats};
pub use turn_latency::{StageMetric, TurnLatency, TurnLatencyTracker};
