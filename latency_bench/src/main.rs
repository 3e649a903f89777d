use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tts_core::{
    load_env_files, wav, BackendKind, LatencySummary, PiperTts, TtsConfig, TtsError,
};

/// Piper TTS realtime latency test
#[derive(Parser, Debug)]
#[command(name = "tts-latency", version, about)]
struct Cli {
    /// Text to synthesize on every run
    #[arg(long, default_value = "Hello, this is a realtime TTS latency test.")]
    text: String,

    /// Number of synthesis runs
    #[arg(long, default_value_t = 3)]
    runs: u32,

    /// Speaking rate multiplier, 2.0 is twice as fast (overrides PIPER_SPEED)
    #[arg(long)]
    speed: Option<f32>,

    /// Output sample rate; defaults to the voice's trained rate
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Frame duration in milliseconds
    #[arg(long)]
    frame_ms: Option<u64>,

    /// `subprocess` or `native` (overrides PIPER_BACKEND)
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Split the text into sentences and synthesize them one by one
    #[arg(long)]
    sentences: bool,

    /// Write the audio of the last run to a WAV file
    #[arg(long, value_name = "PATH")]
    save_wav: Option<PathBuf>,

    /// Print reports as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            if let Some(diagnostics) = e.downcast_ref::<TtsError>().and_then(|t| t.diagnostics()) {
                eprintln!("backend output:\n{}", diagnostics.trim_end());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.runs == 0 {
        anyhow::bail!("--runs must be at least 1");
    }
    for path in load_env_files() {
        tracing::debug!(path = %path.display(), "loaded env file");
    }

    let mut config = TtsConfig::from_env().context("reading PIPER_* settings")?;
    if let Some(speed) = cli.speed {
        config.speed = speed;
    }
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = Some(rate);
    }
    if let Some(ms) = cli.frame_ms {
        config.frame_duration_ms = ms;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    println!("PIPER_PATH={}", config.piper_path.display());
    println!("PIPER_MODEL_PATH={}", config.model_path.display());

    let tts = PiperTts::new(config).context("initializing synthesizer")?;
    println!(
        "backend={} sample_rate={} setup_ms={:.1}",
        tts.backend_name(),
        tts.sample_rate(),
        tts.setup_time().as_secs_f64() * 1000.0
    );

    let mut reports = Vec::with_capacity(cli.runs as usize);
    let mut last_frames = Vec::new();
    for i in 1..=cli.runs {
        let stream = if cli.sentences {
            tts.synthesize_sentences(&cli.text)?
        } else {
            tts.synthesize_text(cli.text.as_str())?
        };
        let (frames, report) = stream
            .collect_frames()
            .await
            .with_context(|| format!("run {i} failed"))?;
        let report = report.with_context(|| format!("run {i} produced no audio"))?;

        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("run {i}: {report}");
        }
        reports.push(report);
        last_frames = frames;
    }

    let summary = LatencySummary::from_reports(&reports);
    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("\nsummary:");
        for line in summary.lines() {
            println!("{line}");
        }
    }

    if let Some(path) = &cli.save_wav {
        wav::write_wav(path, &last_frames)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("saved last run to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_latency_script() {
        let cli = Cli::parse_from(["tts-latency"]);
        assert_eq!(cli.text, "Hello, this is a realtime TTS latency test.");
        assert_eq!(cli.runs, 3);
        assert!(cli.backend.is_none());
        assert!(!cli.sentences);
    }

    #[test]
    fn test_speed_is_only_set_when_given() {
        let cli = Cli::parse_from(["tts-latency"]);
        assert!(cli.speed.is_none());

        let cli = Cli::parse_from(["tts-latency", "--speed", "1.5"]);
        assert_eq!(cli.speed, Some(1.5));
    }

    #[test]
    fn test_backend_flag() {
        let cli = Cli::parse_from(["tts-latency", "--backend", "native", "--runs", "5"]);
        assert_eq!(cli.backend, Some(BackendKind::Native));
        assert_eq!(cli.runs, 5);
        assert!(Cli::try_parse_from(["tts-latency", "--backend", "grpc"]).is_err());
    }
}
