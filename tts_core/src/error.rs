use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors produced while configuring or driving a synthesis backend.
#[derive(Debug, Error)]
pub enum TtsError {
    /// Bad request shape: empty text, non-positive speed, out-of-range volume.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The configured synthesizer binary or voice model does not exist.
    #[error("Model not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// The backend process or session failed mid-call.
    #[error("Synthesis backend error: {message}")]
    SynthesisBackend {
        message: String,
        /// Captured stderr (subprocess) or library error text (native).
        diagnostics: String,
    },

    /// No output arrived from the backend within the configured wait.
    #[error("No audio from backend within {}ms", waited.as_millis())]
    StreamTimeout { waited: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub(crate) fn backend(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        TtsError::SynthesisBackend {
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub(crate) fn model_not_found(path: impl Into<PathBuf>) -> Self {
        TtsError::ModelNotFound { path: path.into() }
    }

    /// Captured backend diagnostics, if this error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            TtsError::SynthesisBackend { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }

    /// Whether the adapter itself would ever retry this error.
    ///
    /// Always `false`: a silent retry on a live audio stream produces audible
    /// artifacts, so retry policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_only_for_backend_errors() {
        let err = TtsError::backend("exit status 1", "onnx: bad model");
        assert_eq!(err.diagnostics(), Some("onnx: bad model"));

        let err = TtsError::backend("exit status 1", "");
        assert_eq!(err.diagnostics(), None);

        let err = TtsError::InvalidParameter("text cannot be empty".into());
        assert_eq!(err.diagnostics(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = TtsError::model_not_found("/models/missing.onnx");
        assert!(err.to_string().contains("/models/missing.onnx"));

        let err = TtsError::StreamTimeout {
            waited: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("1500ms"));
        assert!(!err.is_retryable());
    }
}
