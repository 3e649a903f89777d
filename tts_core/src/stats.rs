// Aggregation of per-call latency reports across repeated runs

use serde::Serialize;

use crate::latency::LatencyReport;

/// min / mean / p50 / max / standard deviation of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl Stats {
    /// Non-finite samples are skipped. Returns `None` when nothing is left.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let p50 = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };

        Some(Self {
            count,
            min: sorted[0],
            mean,
            p50,
            max: sorted[count - 1],
            std_dev: variance.sqrt(),
        })
    }
}

/// Summary over a batch of [`LatencyReport`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub runs: usize,
    pub ttfb_ms: Option<Stats>,
    pub total_ms: Option<Stats>,
    pub rtf: Option<Stats>,
}

impl LatencySummary {
    pub fn from_reports(reports: &[LatencyReport]) -> Self {
        Self {
            runs: reports.len(),
            ttfb_ms: Stats::from_samples(&metric(reports, |r| r.ttfb_ms)),
            total_ms: Stats::from_samples(&metric(reports, |r| r.total_ms)),
            rtf: Stats::from_samples(&metric(reports, |r| r.rtf)),
        }
    }

    /// Human-readable lines, one per metric that has data.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, stats, unit) in [
            ("ttfb ", &self.ttfb_ms, "ms"),
            ("total", &self.total_ms, "ms"),
            ("rtf  ", &self.rtf, ""),
        ] {
            if let Some(s) = stats {
                out.push(format!(
                    "{name} mean={:.3}{unit} p50={:.3}{unit} min={:.3}{unit} max={:.3}{unit} std={:.3}{unit}",
                    s.mean, s.p50, s.min, s.max, s.std_dev
                ));
            }
        }
        out
    }
}

fn metric(reports: &[LatencyReport], f: impl Fn(&LatencyReport) -> f64) -> Vec<f64> {
    reports.iter().map(f).collect()
}
