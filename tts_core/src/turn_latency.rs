//! End-to-end latency of one conversational turn.
//!
//! A voice agent reports one metric per pipeline stage, tagged with the id of
//! the utterance it belongs to. The turn latency is the sum of the speech
//! recognizer's end-of-utterance delay, the language model's time to first
//! token and the synthesizer's time to first byte.

use std::collections::HashMap;

use serde::Serialize;

use crate::latency::LatencyReport;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageMetric {
    /// End-of-utterance delay of the recognizer, ms.
    Stt(f64),
    /// Time to first token of the language model, ms.
    Llm(f64),
    /// Time to first audio byte of the synthesizer, ms.
    Tts(f64),
}

impl From<&LatencyReport> for StageMetric {
    fn from(report: &LatencyReport) -> Self {
        StageMetric::Tts(report.ttfb_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnLatency {
    pub speech_id: String,
    pub stt_ms: f64,
    pub llm_ms: f64,
    pub tts_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Parts {
    stt: Option<f64>,
    llm: Option<f64>,
    tts: Option<f64>,
}

#[derive(Debug, Default)]
pub struct TurnLatencyTracker {
    label: String,
    parts: HashMap<String, Parts>,
}

impl TurnLatencyTracker {
    /// `label` tags the log lines, e.g. a room or session name.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parts: HashMap::new(),
        }
    }

    /// Store one stage metric. Returns the breakdown once all three stages of
    /// `speech_id` are known; the id is forgotten at that point.
    pub fn record(&mut self, speech_id: &str, metric: StageMetric) -> Option<TurnLatency> {
        let parts = self.parts.entry(speech_id.to_string()).or_default();
        match metric {
            StageMetric::Stt(ms) => {
                tracing::info!(label = %self.label, speech_id, stt_ms = ms, "stt latency");
                parts.stt = Some(ms);
            }
            StageMetric::Llm(ms) => {
                tracing::info!(label = %self.label, speech_id, llm_ms = ms, "llm latency");
                parts.llm = Some(ms);
            }
            StageMetric::Tts(ms) => {
                tracing::info!(label = %self.label, speech_id, tts_ms = ms, "tts latency");
                parts.tts = Some(ms);
            }
        }

        let (Some(stt_ms), Some(llm_ms), Some(tts_ms)) = (parts.stt, parts.llm, parts.tts) else {
            return None;
        };
        self.parts.remove(speech_id);

        let turn = TurnLatency {
            speech_id: speech_id.to_string(),
            stt_ms,
            llm_ms,
            tts_ms,
            total_ms: stt_ms + llm_ms + tts_ms,
        };
        tracing::info!(
            label = %self.label,
            speech_id,
            stt_ms,
            llm_ms,
            tts_ms,
            total_ms = turn.total_ms,
            "turn latency"
        );
        Some(turn)
    }

    /// Turns still waiting for at least one stage.
    pub fn pending(&self) -> usize {
        self.parts.len()
    }
}
