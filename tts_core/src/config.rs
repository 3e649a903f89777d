// Configuration for the synthesis adapter

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};
use crate::request::SynthesisRequest;

/// Sample rate used when neither the config nor the voice sidecar names one.
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_FRAME_MS: u64 = 20;
pub const DEFAULT_MODEL: &str = "models/en_US-lessac-medium.onnx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Spawn the `piper` binary per call, raw PCM over stdout.
    Subprocess,
    /// Load the voice in-process through piper-rs.
    Native,
}

impl FromStr for BackendKind {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subprocess" | "process" | "cli" => Ok(BackendKind::Subprocess),
            "native" | "inprocess" | "in-process" => Ok(BackendKind::Native),
            other => Err(TtsError::Config(format!(
                "unknown backend '{other}' (expected 'subprocess' or 'native')"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Subprocess => "subprocess",
            BackendKind::Native => "native",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub backend: BackendKind,
    pub piper_path: PathBuf,
    pub model_path: PathBuf,
    pub speed: f32,
    /// `None` means "whatever the voice was trained at".
    pub sample_rate: Option<u32>,
    pub volume: Option<f32>,
    pub noise_scale: Option<f32>,
    pub noise_w: Option<f32>,
    pub use_cuda: bool,
    pub speaker: Option<String>,
    pub frame_duration_ms: u64,
    pub channels: u16,
    /// Longest wait for the next piece of backend output.
    pub read_timeout_secs: u64,
    /// Grace period for the backend to exit after its output closed.
    pub shutdown_timeout_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Subprocess,
            piper_path: PathBuf::from("piper"),
            model_path: PathBuf::from(DEFAULT_MODEL),
            speed: 1.0,
            sample_rate: None,
            volume: None,
            noise_scale: None,
            noise_w: None,
            use_cuda: false,
            speaker: None,
            frame_duration_ms: DEFAULT_FRAME_MS,
            channels: 1,
            read_timeout_secs: 10,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl TtsConfig {
    pub fn new(piper_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            piper_path: piper_path.into(),
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    /// Read `PIPER_*` variables. Call [`load_env_files`] first to honor `.env`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let backend = env_parse::<BackendKind>("PIPER_BACKEND")?.unwrap_or(defaults.backend);
        let model_path = env::var("PIPER_MODEL_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root().join(DEFAULT_MODEL));

        Ok(Self {
            backend,
            piper_path: resolve_piper_path(),
            model_path,
            speed: env_parse("PIPER_SPEED")?.unwrap_or(defaults.speed),
            sample_rate: env_parse("PIPER_SAMPLE_RATE")?,
            volume: env_parse("PIPER_VOLUME")?,
            noise_scale: env_parse("PIPER_NOISE_SCALE")?,
            noise_w: env_parse("PIPER_NOISE_W")?,
            use_cuda: env_parse::<bool>("PIPER_USE_CUDA")?.unwrap_or(false),
            speaker: env::var("PIPER_SPEAKER").ok().filter(|v| !v.trim().is_empty()),
            frame_duration_ms: env_parse("PIPER_FRAME_MS")?.unwrap_or(defaults.frame_duration_ms),
            channels: defaults.channels,
            read_timeout_secs: env_parse("PIPER_READ_TIMEOUT_SECS")?
                .unwrap_or(defaults.read_timeout_secs),
            shutdown_timeout_ms: defaults.shutdown_timeout_ms,
        })
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Path of the voice's JSON sidecar (`voice.onnx` -> `voice.onnx.json`).
    pub fn model_config_path(&self) -> PathBuf {
        let mut p = self.model_path.clone().into_os_string();
        p.push(".json");
        PathBuf::from(p)
    }

    /// Absolute path of the synthesizer binary, looking through `PATH` for bare names.
    pub fn resolved_executable(&self) -> Result<PathBuf> {
        if self.piper_path.is_file() {
            return Ok(self.piper_path.clone());
        }
        if self.piper_path.components().count() == 1 {
            if let Ok(found) = which::which(&self.piper_path) {
                return Ok(found);
            }
        }
        Err(TtsError::model_not_found(&self.piper_path))
    }

    /// Configured sample rate, else the voice's trained rate, else 22050 Hz.
    pub fn resolve_sample_rate(&self) -> Result<u32> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        let sidecar = self.model_config_path();
        if sidecar.is_file() {
            return read_sample_rate(&sidecar);
        }
        tracing::debug!(
            sidecar = %sidecar.display(),
            "no voice config found, assuming {DEFAULT_SAMPLE_RATE} Hz"
        );
        Ok(DEFAULT_SAMPLE_RATE)
    }

    /// Fail fast on anything that would make every call fail.
    pub fn validate(&self) -> Result<()> {
        if !self.model_path.is_file() {
            return Err(TtsError::model_not_found(&self.model_path));
        }
        match self.backend {
            BackendKind::Subprocess => {
                self.resolved_executable()?;
            }
            BackendKind::Native => {
                let sidecar = self.model_config_path();
                if !sidecar.is_file() {
                    return Err(TtsError::model_not_found(sidecar));
                }
            }
        }
        if self.sample_rate == Some(0) {
            return Err(TtsError::InvalidParameter(
                "Sample rate must be positive".to_string(),
            ));
        }
        if self.frame_duration_ms == 0 {
            return Err(TtsError::InvalidParameter(
                "Frame duration must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(TtsError::InvalidParameter(
                "Channel count must be positive".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(TtsError::InvalidParameter(
                "Read timeout must be positive".to_string(),
            ));
        }
        // Per-call parameters share the request's rules.
        self.request("config").validate()
    }

    /// A request for `text` carrying this config's voice defaults.
    pub fn request(&self, text: impl Into<String>) -> SynthesisRequest {
        let mut req = SynthesisRequest::new(text).with_speed(self.speed);
        if let Some(v) = self.volume {
            req = req.with_volume(v);
        }
        if let Some(n) = self.noise_scale {
            req = req.with_noise_scale(n);
        }
        if let Some(n) = self.noise_w {
            req = req.with_noise_w(n);
        }
        if let Some(s) = &self.speaker {
            req = req.with_voice(s.clone());
        }
        req
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TtsError::Config(format!("{key}={v}: {e}"))),
        _ => Ok(None),
    }
}

fn project_root() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// `PIPER_PATH`, else `piper` on `PATH`, else `./.venv/bin/piper`.
pub fn resolve_piper_path() -> PathBuf {
    if let Ok(p) = env::var("PIPER_PATH") {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    which::which("piper").unwrap_or_else(|_| project_root().join(".venv/bin/piper"))
}

/// Load `.env` and `.env.local` from the current directory and every
/// ancestor, nearest first. Variables that are already set are kept.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    let root = project_root();
    for dir in root.ancestors() {
        for name in [".env", ".env.local"] {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            match dotenv::from_path(&path) {
                Ok(()) => loaded.push(path),
                Err(e) => tracing::warn!(path = %path.display(), "could not load env file: {e}"),
            }
        }
    }
    loaded
}

/// Read `audio.sample_rate` from a Piper voice config JSON.
pub fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> Result<u32> {
    let text = fs::read_to_string(cfg_path.as_ref())?;
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        TtsError::Config(format!(
            "{} is not valid JSON: {e}",
            cfg_path.as_ref().display()
        ))
    })?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .filter(|sr| *sr > 0 && *sr <= u32::MAX as u64)
        .ok_or_else(|| {
            TtsError::Config(format!(
                "Missing or invalid 'audio.sample_rate' in {}",
                cfg_path.as_ref().display()
            ))
        })?;

    Ok(sample_rate as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("native".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert_eq!(" Subprocess ".parse::<BackendKind>().unwrap(), BackendKind::Subprocess);
        assert!(matches!(
            "grpc".parse::<BackendKind>(),
            Err(TtsError::Config(_))
        ));
    }

    #[test]
    fn test_model_config_path() {
        let cfg = TtsConfig::new("piper", "models/en_US-lessac-medium.onnx");
        assert_eq!(
            cfg.model_config_path(),
            PathBuf::from("models/en_US-lessac-medium.onnx.json")
        );
    }

    #[test]
    fn test_sample_rate_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        write(&model, "onnx");

        let mut cfg = TtsConfig::new("piper", &model);
        assert_eq!(cfg.resolve_sample_rate().unwrap(), DEFAULT_SAMPLE_RATE);

        write(
            &dir.path().join("voice.onnx.json"),
            r#"{"audio": {"sample_rate": 16000}, "inference": {"noise_scale": 0.667}}"#,
        );
        assert_eq!(cfg.resolve_sample_rate().unwrap(), 16_000);

        cfg.sample_rate = Some(24_000);
        assert_eq!(cfg.resolve_sample_rate().unwrap(), 24_000);
    }

    #[test]
    fn test_read_sample_rate_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("voice.onnx.json");

        write(&cfg, "not json");
        assert!(matches!(read_sample_rate(&cfg), Err(TtsError::Config(_))));

        write(&cfg, r#"{"audio": {}}"#);
        assert!(matches!(read_sample_rate(&cfg), Err(TtsError::Config(_))));
    }

    #[test]
    fn test_validate_missing_model() {
        let cfg = TtsConfig::new("/bin/sh", "/definitely/not/here.onnx");
        match cfg.validate() {
            Err(TtsError::ModelNotFound { path }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.onnx"))
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        write(&model, "onnx");
        let cfg = TtsConfig::new(dir.path().join("no-such-piper"), &model);
        assert!(matches!(cfg.validate(), Err(TtsError::ModelNotFound { .. })));
    }

    #[test]
    fn test_validate_native_needs_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        write(&model, "onnx");
        let mut cfg = TtsConfig::new("piper", &model);
        cfg.backend = BackendKind::Native;
        match cfg.validate() {
            Err(TtsError::ModelNotFound { path }) => {
                assert!(path.to_string_lossy().ends_with("voice.onnx.json"))
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        write(&model, "onnx");
        let base = TtsConfig::new("/bin/sh", &model);
        assert!(base.validate().is_ok());

        let mut cfg = base.clone();
        cfg.speed = 0.0;
        assert!(matches!(cfg.validate(), Err(TtsError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.frame_duration_ms = 0;
        assert!(matches!(cfg.validate(), Err(TtsError::InvalidParameter(_))));

        let mut cfg = base;
        cfg.volume = Some(2.0);
        assert!(matches!(cfg.validate(), Err(TtsError::InvalidParameter(_))));
    }

    #[test]
    fn test_request_carries_defaults() {
        let mut cfg = TtsConfig::default();
        cfg.speed = 1.25;
        cfg.noise_w = Some(0.8);
        cfg.speaker = Some("2".into());
        let req = cfg.request("Hallo Welt");
        assert_eq!(req.text(), "Hallo Welt");
        assert_eq!(req.speed(), 1.25);
        assert_eq!(req.noise_w(), Some(0.8));
        assert_eq!(req.noise_scale(), None);
        assert_eq!(req.voice(), Some("2"));
    }
}
