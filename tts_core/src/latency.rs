//! Per-call latency checkpoints and the metrics derived from them.

use std::{collections::HashMap, fmt, time::Instant};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    RequestSent,
    FirstFrame,
    SynthesisComplete,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::RequestSent => "request_sent",
            Checkpoint::FirstFrame => "first_frame",
            Checkpoint::SynthesisComplete => "synthesis_complete",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic checkpoint timestamps for one synthesis call.
///
/// Lives only as long as the call; once finalized it is turned into a
/// [`LatencyReport`] and logged.
#[derive(Debug, Clone)]
pub struct LatencyRecord {
    call_id: Uuid,
    checkpoints: HashMap<Checkpoint, Instant>,
    sample_rate: u32,
    channels: u16,
    samples: u64,
    frames: u64,
}

impl LatencyRecord {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            checkpoints: HashMap::with_capacity(3),
            sample_rate,
            channels,
            samples: 0,
            frames: 0,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Record `checkpoint` now. The first mark of each checkpoint wins.
    pub fn mark(&mut self, checkpoint: Checkpoint) {
        self.mark_at(checkpoint, Instant::now());
    }

    pub fn mark_at(&mut self, checkpoint: Checkpoint, at: Instant) {
        self.checkpoints.entry(checkpoint).or_insert(at);
    }

    pub fn get(&self, checkpoint: Checkpoint) -> Option<Instant> {
        self.checkpoints.get(&checkpoint).copied()
    }

    /// Count a yielded frame of `samples` interleaved samples.
    pub fn add_frame(&mut self, samples: usize) {
        self.frames += 1;
        self.samples += samples as u64;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_complete(&self) -> bool {
        self.get(Checkpoint::SynthesisComplete).is_some()
    }

    /// Derived metrics, available once all three checkpoints are set.
    pub fn report(&self) -> Option<LatencyReport> {
        let sent = self.get(Checkpoint::RequestSent)?;
        let first = self.get(Checkpoint::FirstFrame)?;
        let done = self.get(Checkpoint::SynthesisComplete)?;

        let ttfb_ms = first.saturating_duration_since(sent).as_secs_f64() * 1000.0;
        let total_ms = done.saturating_duration_since(sent).as_secs_f64() * 1000.0;
        let per_channel = self.samples / self.channels.max(1) as u64;
        let audio_duration_ms = if self.sample_rate == 0 {
            0.0
        } else {
            per_channel as f64 * 1000.0 / self.sample_rate as f64
        };
        let rtf = if audio_duration_ms > 0.0 {
            total_ms / audio_duration_ms
        } else {
            f64::INFINITY
        };

        Some(LatencyReport {
            call_id: self.call_id,
            ttfb_ms,
            total_ms,
            audio_duration_ms,
            frames: self.frames,
            rtf,
        })
    }
}

/// Finalized metrics for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub call_id: Uuid,
    pub ttfb_ms: f64,
    pub total_ms: f64,
    pub audio_duration_ms: f64,
    pub frames: u64,
    /// Processing time over produced audio; below 1.0 is faster than realtime.
    pub rtf: f64,
}

impl LatencyReport {
    pub fn log(&self) {
        tracing::info!(
            call_id = %self.call_id,
            ttfb_ms = self.ttfb_ms,
            total_ms = self.total_ms,
            audio_duration_ms = self.audio_duration_ms,
            frames = self.frames,
            rtf = self.rtf,
            "synthesis latency"
        );
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ttfb_ms={:.1} total_ms={:.1} audio_duration_ms={:.1} frames={} rtf={:.3}",
            self.ttfb_ms, self.total_ms, self.audio_duration_ms, self.frames, self.rtf
        )
    }
}
