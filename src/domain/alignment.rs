// Stream alignment - projects independently sampled streams onto one timeline
use super::sample::{Stream, StreamKind, ValidSample};
use super::timeline::{display_label, round_to_interval};
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;

/// Per-stream tolerance windows for the nearest-neighbor fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub primary: TimeDelta,
    pub reference: TimeDelta,
    pub precipitation: TimeDelta,
}

impl Tolerances {
    pub fn uniform(window: TimeDelta) -> Self {
        Self {
            primary: window,
            reference: window,
            precipitation: window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentSettings {
    /// Spacing of the dual-stream timeline.
    pub interval: TimeDelta,
    /// Rounding resolution used when indexing raw samples.
    pub index_interval: TimeDelta,
    pub tolerances: Tolerances,
    /// Zone used for row display labels.
    pub display_zone: Tz,
}

/// Valid samples of one stream keyed by rounded slot instant.
///
/// Samples sharing a slot resolve last-write-wins in arrival order.
#[derive(Debug)]
pub struct StreamIndex<'a> {
    samples: &'a [ValidSample],
    slots: HashMap<i64, usize>,
}

pub fn index_stream(stream: &Stream, resolution: TimeDelta) -> StreamIndex<'_> {
    let samples = stream.samples();
    let step = resolution.num_milliseconds();
    let mut slots = HashMap::with_capacity(samples.len());

    if step > 0 {
        for (position, sample) in samples.iter().enumerate() {
            slots.insert(round_to_interval(sample.time_ms, step), position);
        }
    }

    StreamIndex { samples, slots }
}

impl<'a> StreamIndex<'a> {
    pub fn direct(&self, slot_ms: i64) -> Option<&'a ValidSample> {
        self.slots.get(&slot_ms).map(|&i| &self.samples[i])
    }

    /// Closest raw sample within `tolerance` of `slot_ms`, edge inclusive.
    /// Equal distances resolve to the earliest sample in arrival order.
    pub fn nearest_within(&self, slot_ms: i64, tolerance: TimeDelta) -> Option<&'a ValidSample> {
        let limit = tolerance.num_milliseconds();
        if limit < 0 {
            return None;
        }
        let limit = limit.unsigned_abs();
        let mut best: Option<(u64, &'a ValidSample)> = None;

        for sample in self.samples {
            let distance = sample.time_ms.abs_diff(slot_ms);
            if distance > limit {
                continue;
            }
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, sample));
            }
        }

        best.map(|(_, sample)| sample)
    }

    /// Direct slot hit first, nearest neighbor within tolerance otherwise.
    pub fn lookup(&self, slot_ms: i64, tolerance: TimeDelta) -> Option<&'a ValidSample> {
        self.direct(slot_ms)
            .or_else(|| self.nearest_within(slot_ms, tolerance))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRow {
    pub timestamp_ms: i64,
    pub display_label: String,
    pub primary_value: Option<f64>,
    pub reference_value: Option<f64>,
    pub precipitation_value: f64,
    pub quality_of_reference: Option<f64>,
}

/// Which level streams survived validity filtering.
#[derive(Debug, Clone, Copy)]
pub enum LevelAvailability<'a> {
    Neither,
    PrimaryOnly(&'a Stream),
    ReferenceOnly(&'a Stream),
    Both {
        primary: &'a Stream,
        reference: &'a Stream,
    },
}

impl<'a> LevelAvailability<'a> {
    pub fn classify(primary: &'a Stream, reference: &'a Stream) -> Self {
        match (primary.is_available(), reference.is_available()) {
            (false, false) => LevelAvailability::Neither,
            (true, false) => LevelAvailability::PrimaryOnly(primary),
            (false, true) => LevelAvailability::ReferenceOnly(reference),
            (true, true) => LevelAvailability::Both { primary, reference },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeBranch {
    PrimaryOnly,
    ReferenceOnly,
    Dual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MergeOutcome {
    /// No level stream had a valid sample; nothing was merged.
    NoData,
    Merged {
        branch: MergeBranch,
        rows: Vec<MergedRow>,
    },
}

impl MergeOutcome {
    pub fn rows(&self) -> &[MergedRow] {
        match self {
            MergeOutcome::NoData => &[],
            MergeOutcome::Merged { rows, .. } => rows,
        }
    }

    pub fn branch(&self) -> Option<MergeBranch> {
        match self {
            MergeOutcome::NoData => None,
            MergeOutcome::Merged { branch, .. } => Some(*branch),
        }
    }
}

/// The three streams of one site, already validated.
#[derive(Debug, Clone, Copy)]
pub struct SiteStreams<'a> {
    pub primary: &'a Stream,
    pub reference: &'a Stream,
    pub precipitation: &'a Stream,
}

/// Merge the streams onto `timeline`.
///
/// `timeline` only drives the dual-stream branch; a lone level stream is
/// charted on its own sample instants.
pub fn merge(timeline: &[i64], streams: SiteStreams<'_>, settings: &AlignmentSettings) -> MergeOutcome {
    let precipitation = index_stream(streams.precipitation, settings.index_interval);

    match LevelAvailability::classify(streams.primary, streams.reference) {
        LevelAvailability::Neither => MergeOutcome::NoData,
        LevelAvailability::PrimaryOnly(primary) => MergeOutcome::Merged {
            branch: MergeBranch::PrimaryOnly,
            rows: merge_single(primary, &precipitation, settings),
        },
        LevelAvailability::ReferenceOnly(reference) => MergeOutcome::Merged {
            branch: MergeBranch::ReferenceOnly,
            rows: merge_single(reference, &precipitation, settings),
        },
        LevelAvailability::Both { primary, reference } => MergeOutcome::Merged {
            branch: MergeBranch::Dual,
            rows: merge_dual(timeline, primary, reference, &precipitation, settings),
        },
    }
}

fn merge_single(
    stream: &Stream,
    precipitation: &StreamIndex<'_>,
    settings: &AlignmentSettings,
) -> Vec<MergedRow> {
    // Stable sort keeps arrival order among equal instants, so the
    // dedup below resolves last-write-wins.
    let mut samples: Vec<ValidSample> = stream.samples().to_vec();
    samples.sort_by_key(|s| s.time_ms);

    let rain_window = settings.tolerances.precipitation;
    let mut rows: Vec<MergedRow> = Vec::with_capacity(samples.len());

    for sample in samples {
        let (primary_value, reference_value, quality_of_reference) = match stream.kind() {
            StreamKind::Reference => (None, Some(sample.value), sample.quality),
            _ => (Some(sample.value), None, None),
        };
        let row = MergedRow {
            timestamp_ms: sample.time_ms,
            display_label: display_label(sample.time_ms, settings.display_zone),
            primary_value,
            reference_value,
            precipitation_value: precipitation
                .nearest_within(sample.time_ms, rain_window)
                .map(|s| s.value)
                .unwrap_or(0.0),
            quality_of_reference,
        };

        match rows.last_mut() {
            Some(last) if last.timestamp_ms == row.timestamp_ms => *last = row,
            _ => rows.push(row),
        }
    }

    rows
}

fn merge_dual(
    timeline: &[i64],
    primary: &Stream,
    reference: &Stream,
    precipitation: &StreamIndex<'_>,
    settings: &AlignmentSettings,
) -> Vec<MergedRow> {
    let primary_index = index_stream(primary, settings.index_interval);
    let reference_index = index_stream(reference, settings.index_interval);
    let tolerances = &settings.tolerances;

    timeline
        .iter()
        .filter_map(|&slot| {
            let primary_value = primary_index
                .lookup(slot, tolerances.primary)
                .map(|s| s.value);
            let reference_match = reference_index.lookup(slot, tolerances.reference);
            let precipitation_value = precipitation
                .lookup(slot, tolerances.precipitation)
                .map(|s| s.value)
                .unwrap_or(0.0);

            if primary_value.is_none() && reference_match.is_none() && precipitation_value <= 0.0 {
                return None;
            }

            Some(MergedRow {
                timestamp_ms: slot,
                display_label: display_label(slot, settings.display_zone),
                primary_value,
                reference_value: reference_match.map(|s| s.value),
                precipitation_value,
                quality_of_reference: reference_match.and_then(|s| s.quality),
            })
        })
        .collect()
}
