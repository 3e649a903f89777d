//! Synthesis backends: anything that turns a request into raw PCM bytes.
//!
//! Two strategies exist, chosen once when the adapter is built:
//! [`SubprocessBackend`] drives the `piper` binary over stdin/stdout, and
//! `NativeBackend` (feature `native`) calls a voice loaded in-process through
//! piper-rs. Both produce little-endian 16-bit PCM at [`SynthesisBackend::sample_rate`].

use std::{pin::Pin, sync::Arc};

use futures_core::Stream;

use crate::config::{BackendKind, TtsConfig};
use crate::error::Result;
use crate::request::SynthesisRequest;

#[cfg(feature = "native")]
mod native;
mod subprocess;

#[cfg(feature = "native")]
pub use native::NativeBackend;
pub use subprocess::SubprocessBackend;

/// Raw PCM chunks of arbitrary size, in backend output order.
pub type RawAudioStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

pub trait SynthesisBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Rate of the PCM this backend emits.
    fn sample_rate(&self) -> u32;

    /// Start synthesizing `request`.
    ///
    /// Nothing runs until the returned stream is first polled. Dropping the
    /// stream must stop the backend and release everything the call owns.
    fn produce_raw_audio(&self, request: SynthesisRequest) -> RawAudioStream;
}

/// Build the backend named by `config.backend`.
pub fn from_config(config: &TtsConfig) -> Result<Arc<dyn SynthesisBackend>> {
    match config.backend {
        BackendKind::Subprocess => Ok(Arc::new(SubprocessBackend::new(config)?)),
        #[cfg(feature = "native")]
        BackendKind::Native => Ok(Arc::new(NativeBackend::new(config)?)),
        #[cfg(not(feature = "native"))]
        BackendKind::Native => Err(crate::error::TtsError::Config(
            "the native backend needs tts_core built with the `native` feature".to_string(),
        )),
    }
}
