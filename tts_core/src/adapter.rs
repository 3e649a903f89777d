//! The synthesis facade: text in, a lazy stream of timed audio frames out.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use uuid::Uuid;

use crate::backend::{self, RawAudioStream, SynthesisBackend};
use crate::chunker::FrameChunker;
use crate::config::TtsConfig;
use crate::error::{Result, TtsError};
use crate::frame::AudioFrame;
use crate::latency::{Checkpoint, LatencyRecord, LatencyReport};
use crate::request::SynthesisRequest;
use crate::sentences::{split_sentences, DEFAULT_MIN_SENTENCE_LEN};

type FrameStream = Pin<Box<dyn Stream<Item = Result<AudioFrame>> + Send>>;

/// Piper text-to-speech with streaming output.
///
/// The backend is picked and prepared once in [`PiperTts::new`]; every call
/// to [`PiperTts::synthesize`] then gets its own backend handle, so calls
/// never share a process or session.
pub struct PiperTts {
    config: TtsConfig,
    backend: Arc<dyn SynthesisBackend>,
    setup_time: Duration,
}

impl PiperTts {
    /// Validate `config` and prepare its backend. Missing binaries or models
    /// fail here, not on the first call.
    pub fn new(config: TtsConfig) -> Result<Self> {
        let started = Instant::now();
        config.validate()?;
        let backend = backend::from_config(&config)?;
        Self::assemble(config, backend, started)
    }

    /// Use an already constructed backend.
    pub fn with_backend(config: TtsConfig, backend: Arc<dyn SynthesisBackend>) -> Result<Self> {
        Self::assemble(config, backend, Instant::now())
    }

    fn assemble(
        config: TtsConfig,
        backend: Arc<dyn SynthesisBackend>,
        started: Instant,
    ) -> Result<Self> {
        // Reject frame settings the chunker cannot honor before any call is made.
        FrameChunker::new(backend.sample_rate(), config.channels, config.frame_duration())?;
        let setup_time = started.elapsed();
        tracing::info!(
            backend = backend.name(),
            sample_rate = backend.sample_rate(),
            frame_ms = config.frame_duration_ms,
            setup_ms = setup_time.as_secs_f64() * 1000.0,
            "synthesis backend ready"
        );
        Ok(Self {
            config,
            backend,
            setup_time,
        })
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn sample_rate(&self) -> u32 {
        self.backend.sample_rate()
    }

    /// One-time construction cost, including model load for the native backend.
    pub fn setup_time(&self) -> Duration {
        self.setup_time
    }

    /// Start synthesizing `request`.
    ///
    /// The request is validated here, so a bad request never reaches the
    /// backend. Nothing is spawned until the returned stream is first polled,
    /// and dropping the stream stops the backend.
    pub fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisStream> {
        request.validate()?;
        let chunker = self.chunker()?;
        tracing::debug!(
            backend = self.backend.name(),
            chars = request.text().chars().count(),
            "synthesis requested"
        );
        let raw = self.backend.produce_raw_audio(request);
        Ok(self.stream(raw, chunker))
    }

    /// [`PiperTts::synthesize`] with the configured voice defaults.
    pub fn synthesize_text(&self, text: impl Into<String>) -> Result<SynthesisStream> {
        self.synthesize(self.config.request(text))
    }

    /// Split `text` into sentences and synthesize them one after another.
    ///
    /// Each sentence gets its own backend call, started only once the previous
    /// one finished; the frames form one continuous sequence.
    pub fn synthesize_sentences(&self, text: &str) -> Result<SynthesisStream> {
        self.config.request(text).validate()?;
        let requests = split_sentences(text, DEFAULT_MIN_SENTENCE_LEN)
            .into_iter()
            .map(|s| self.config.request(s))
            .collect::<Vec<_>>();
        for request in &requests {
            request.validate()?;
        }
        let chunker = self.chunker()?;
        tracing::debug!(
            backend = self.backend.name(),
            sentences = requests.len(),
            "sentence synthesis requested"
        );

        let backend = self.backend.clone();
        let raw: RawAudioStream = Box::pin(try_stream! {
            for request in requests {
                let mut audio = backend.produce_raw_audio(request);
                while let Some(chunk) = audio.next().await {
                    yield chunk?;
                }
            }
        });
        Ok(self.stream(raw, chunker))
    }

    fn chunker(&self) -> Result<FrameChunker> {
        FrameChunker::new(
            self.backend.sample_rate(),
            self.config.channels,
            self.config.frame_duration(),
        )
    }

    fn stream(&self, mut raw: RawAudioStream, mut chunker: FrameChunker) -> SynthesisStream {
        let frames: FrameStream = Box::pin(try_stream! {
            while let Some(chunk) = raw.next().await {
                let chunk = chunk?;
                for frame in chunker.push(&chunk) {
                    yield frame;
                }
            }
            if let Some(frame) = chunker.finish()? {
                yield frame;
            }
        });
        SynthesisStream {
            inner: frames,
            record: LatencyRecord::new(self.backend.sample_rate(), self.config.channels),
            backend: self.backend.name(),
            report: None,
            done: false,
        }
    }
}

impl std::fmt::Debug for PiperTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperTts")
            .field("backend", &self.backend.name())
            .field("sample_rate", &self.backend.sample_rate())
            .field("setup_time", &self.setup_time)
            .finish()
    }
}

/// Frames of one synthesis call, with latency checkpoints captured as they
/// are pulled.
///
/// `request_sent` is marked on the first poll (which is when the backend
/// starts), `first_frame` when the first frame is handed out and
/// `synthesis_complete` when the stream ends. The finished report is logged
/// and kept for [`SynthesisStream::report`].
pub struct SynthesisStream {
    inner: FrameStream,
    record: LatencyRecord,
    backend: &'static str,
    report: Option<LatencyReport>,
    done: bool,
}

impl SynthesisStream {
    pub fn call_id(&self) -> Uuid {
        self.record.call_id()
    }

    pub fn latency(&self) -> &LatencyRecord {
        &self.record
    }

    /// Available once the stream ended successfully.
    pub fn report(&self) -> Option<&LatencyReport> {
        self.report.as_ref()
    }

    /// Drain the stream.
    pub async fn collect_frames(mut self) -> Result<(Vec<AudioFrame>, Option<LatencyReport>)> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next().await {
            frames.push(frame?);
        }
        Ok((frames, self.report.take()))
    }
}

impl Stream for SynthesisStream {
    type Item = Result<AudioFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }
        this.record.mark(Checkpoint::RequestSent);

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(frame))) => {
                this.record.mark(Checkpoint::FirstFrame);
                this.record.add_frame(frame.samples().len());
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                log_failure(this.record.call_id(), this.backend, this.record.frames(), &e);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.record.mark(Checkpoint::SynthesisComplete);
                this.report = this.record.report();
                match &this.report {
                    Some(report) => report.log(),
                    None => tracing::warn!(
                        call_id = %this.record.call_id(),
                        backend = this.backend,
                        "synthesis finished without audio"
                    ),
                }
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for SynthesisStream {
    fn drop(&mut self) {
        if !self.done && self.record.get(Checkpoint::RequestSent).is_some() {
            tracing::debug!(
                call_id = %self.record.call_id(),
                backend = self.backend,
                frames = self.record.frames(),
                "synthesis abandoned, stopping backend"
            );
        }
    }
}

fn log_failure(call_id: Uuid, backend: &str, frames: u64, err: &TtsError) {
    match err.diagnostics() {
        Some(diagnostics) => tracing::warn!(
            %call_id,
            backend,
            frames,
            diagnostics = %diagnostics.trim_end(),
            "synthesis aborted: {err}"
        ),
        None => tracing::warn!(%call_id, backend, frames, "synthesis aborted: {err}"),
    }
}
