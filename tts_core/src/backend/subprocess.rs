//! `piper` as a child process: text on stdin, raw PCM on stdout.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_stream::try_stream;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdout, Command},
    task::JoinHandle,
    time::timeout,
};

use super::{RawAudioStream, SynthesisBackend};
use crate::config::TtsConfig;
use crate::error::{Result, TtsError};
use crate::request::SynthesisRequest;

const READ_CHUNK_BYTES: usize = 4096;
/// Only the tail of stderr is kept; piper logs every utterance there.
const MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024;
const DIAGNOSTIC_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    executable: PathBuf,
    model_path: PathBuf,
    sample_rate: u32,
    use_cuda: bool,
    read_timeout: Duration,
    shutdown_timeout: Duration,
}

impl SubprocessBackend {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let executable = config.resolved_executable()?;
        if !config.model_path.is_file() {
            return Err(TtsError::model_not_found(&config.model_path));
        }
        Ok(Self {
            executable,
            model_path: config.model_path.clone(),
            sample_rate: config.resolve_sample_rate()?,
            use_cuda: config.use_cuda,
            read_timeout: config.read_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command line for one call. Optional knobs are only passed when set so
    /// older piper builds keep working with the defaults baked into the voice.
    pub fn args(&self, request: &SynthesisRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model".into(),
            self.model_path.clone().into_os_string(),
            "--output_raw".into(),
            "--length_scale".into(),
            request.length_scale().to_string().into(),
        ];
        let optional = [
            ("--noise_scale", request.noise_scale()),
            ("--noise_w", request.noise_w()),
            ("--volume", request.volume()),
        ];
        for (flag, value) in optional {
            if let Some(v) = value {
                args.push(flag.into());
                args.push(v.to_string().into());
            }
        }
        if let Some(speaker) = request.voice() {
            args.push("--speaker".into());
            args.push(speaker.into());
        }
        if self.use_cuda {
            args.push("--cuda".into());
        }
        args
    }

    fn spawn(&self, request: &SynthesisRequest) -> Result<PiperProcess> {
        let mut child = Command::new(&self.executable)
            .args(self.args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TtsError::backend(
                    format!("failed to spawn {}: {e}", self.executable.display()),
                    String::new(),
                )
            })?;
        let pid = child.id();
        tracing::debug!(pid = ?pid, executable = %self.executable.display(), "spawned synthesizer");

        if let Some(mut stdin) = child.stdin.take() {
            let mut text = request.text().to_string();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            // Written from a task so a long text cannot deadlock against a full stdout pipe.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    tracing::debug!(pid = ?pid, "synthesizer closed stdin early: {e}");
                }
            });
        }
        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_tail(s)));
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TtsError::backend("synthesizer stdout was not captured", ""))?;

        Ok(PiperProcess {
            child: Some(child),
            pid,
            stdout,
            stderr,
        })
    }
}

impl SynthesisBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn produce_raw_audio(&self, request: SynthesisRequest) -> RawAudioStream {
        let backend = self.clone();
        Box::pin(try_stream! {
            let mut process = backend.spawn(&request)?;
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            let mut total: u64 = 0;
            loop {
                let n = match timeout(backend.read_timeout, process.stdout.read(&mut buf)).await {
                    Ok(Ok(n)) => Ok(n),
                    Ok(Err(e)) => {
                        process.kill().await;
                        let diagnostics = process.diagnostics().await;
                        Err(TtsError::backend(format!("reading synthesizer output: {e}"), diagnostics))
                    }
                    Err(_) => {
                        tracing::warn!(
                            pid = ?process.pid,
                            waited_ms = backend.read_timeout.as_millis() as u64,
                            "synthesizer produced no output in time"
                        );
                        process.kill().await;
                        Err(TtsError::StreamTimeout { waited: backend.read_timeout })
                    }
                }?;
                if n == 0 {
                    break;
                }
                total += n as u64;
                yield buf[..n].to_vec();
            }
            process.finish(total, backend.shutdown_timeout).await?;
        })
    }
}

/// One running synthesizer. Killed on drop unless it already exited.
struct PiperProcess {
    child: Option<Child>,
    pid: Option<u32>,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
}

impl PiperProcess {
    /// Kill and reap.
    async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(pid = ?self.pid, "failed to kill synthesizer: {e}");
            }
        }
    }

    /// Captured stderr; empty if the collector is gone or slow.
    async fn diagnostics(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => match timeout(DIAGNOSTIC_WAIT, handle).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        }
    }

    /// Stdout reached EOF: reap the process and judge the call.
    async fn finish(&mut self, bytes: u64, grace: Duration) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let status = match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.kill().await;
                let diagnostics = self.diagnostics().await;
                return Err(TtsError::backend(
                    format!("waiting for synthesizer: {e}"),
                    diagnostics,
                ));
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "synthesizer still running after closing its output, killing"
                );
                self.kill().await;
                let diagnostics = self.diagnostics().await;
                return Err(TtsError::backend(
                    format!(
                        "synthesizer did not exit within {}ms after closing its output",
                        grace.as_millis()
                    ),
                    diagnostics,
                ));
            }
        };
        self.child = None;

        let diagnostics = self.diagnostics().await;
        if !status.success() {
            tracing::error!(pid = ?self.pid, %status, "synthesizer failed");
            return Err(TtsError::backend(
                format!("synthesizer exited with {status}"),
                diagnostics,
            ));
        }
        if bytes == 0 {
            return Err(TtsError::backend(
                "synthesizer exited without producing audio",
                diagnostics,
            ));
        }
        if !diagnostics.trim().is_empty() {
            tracing::debug!(pid = ?self.pid, stderr = %diagnostics.trim_end(), "synthesizer stderr");
        }
        tracing::debug!(pid = ?self.pid, bytes, "synthesizer finished");
        Ok(())
    }
}

impl Drop for PiperProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            tracing::debug!(pid = ?self.pid, "killed synthesizer on drop");
            // Reap now rather than leaving a zombie for the orphan queue.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > MAX_DIAGNOSTIC_BYTES {
                    let excess = tail.len() - MAX_DIAGNOSTIC_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
