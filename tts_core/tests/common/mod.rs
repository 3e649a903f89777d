//! Helpers for driving the subprocess backend against a fake `piper`.

#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use tts_core::TtsConfig;

pub const SAMPLE_RATE: u32 = 22_050;
/// One 20 ms frame of mono 16-bit audio at 22050 Hz.
pub const FRAME_BYTES: usize = 882;

/// Reads one line and emits 20 ms of silence per character.
pub const SPEAKING: &str = r#"
read -r text
printf '%s' "$text" > "$DIR/stdin.txt"
printf '%s\n' "$*" > "$DIR/args.txt"
head -c $(( ${#text} * 882 )) /dev/zero
"#;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: TtsConfig,
}

impl Fixture {
    /// A voice model plus a fake synthesizer running `body` under `/bin/sh`.
    /// `$DIR` in the body expands to the fixture directory.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        fs::write(&model, b"onnx").unwrap();
        fs::write(
            dir.path().join("voice.onnx.json"),
            format!(r#"{{"audio": {{"sample_rate": {SAMPLE_RATE}}}}}"#),
        )
        .unwrap();

        let script = dir.path().join("piper");
        fs::write(
            &script,
            format!("#!/bin/sh\nDIR='{}'\n{body}", dir.path().display()),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = TtsConfig::new(&script, &model);
        config.read_timeout_secs = 5;
        Self { dir, config }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap_or_default()
    }
}

/// Wait for a file the fake synthesizer writes on start-up.
pub async fn wait_for_file(path: &Path) -> String {
    for _ in 0..100 {
        if let Ok(text) = fs::read_to_string(path) {
            if text.ends_with('\n') {
                return text.trim().to_string();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never appeared", path.display());
}

pub fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
