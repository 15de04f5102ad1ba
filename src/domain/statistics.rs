// Summary statistics over raw validated samples
use super::sample::{Stream, StreamKind, ValidSample};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total: f64,
    /// Largest valid value, 0 for an empty stream.
    pub max: f64,
    pub non_zero_event_count: usize,
    pub sample_count: usize,
}

/// Aggregate a stream's own samples. Never fed merged rows: resampling
/// would double count additive series such as rainfall.
pub fn summarize(stream: &Stream) -> SummaryStats {
    let samples = stream.samples();
    let max = samples
        .iter()
        .map(|s| s.value)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

    SummaryStats {
        total: samples.iter().map(|s| s.value).sum(),
        max: max.unwrap_or(0.0),
        non_zero_event_count: samples.iter().filter(|s| s.value > 0.0).count(),
        sample_count: samples.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub kind: StreamKind,
    pub stats: SummaryStats,
}

/// Most recent sample by instant; ties go to the later arrival.
pub fn latest(stream: &Stream) -> Option<&ValidSample> {
    stream
        .samples()
        .iter()
        .fold(None, |best: Option<&ValidSample>, s| match best {
            Some(b) if b.time_ms > s.time_ms => Some(b),
            _ => Some(s),
        })
}
