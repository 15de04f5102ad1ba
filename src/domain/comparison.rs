// Comparison report domain model
use super::alignment::MergeOutcome;
use super::sample::Stream;
use super::site::{Site, Variance};
use super::statistics::StreamSummary;
use super::timeline::TimeRange;
use serde::Serialize;

/// Metadata the metering device reports alongside its readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryDevice {
    pub device_id: String,
    pub last_water_level_in: Option<f64>,
    pub last_fill_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum StreamAvailability {
    Available,
    /// Fetched, but nothing survived validity filtering.
    Empty,
    /// The fetch itself failed.
    Unavailable { reason: String },
}

impl StreamAvailability {
    pub fn assess(stream: &Stream, fetch_error: Option<&str>) -> Self {
        match fetch_error {
            Some(reason) => StreamAvailability::Unavailable {
                reason: reason.to_string(),
            },
            None if stream.is_available() => StreamAvailability::Available,
            None => StreamAvailability::Empty,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, StreamAvailability::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub primary: StreamAvailability,
    pub reference: StreamAvailability,
    pub precipitation: StreamAvailability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub site: Site,
    pub range: TimeRange,
    pub mode: String,
    pub availability: Availability,
    pub outcome: MergeOutcome,
    pub summaries: Vec<StreamSummary>,
    pub variance: Option<Variance>,
    pub primary_device: Option<PrimaryDevice>,
    /// Exact zero levels can mean sensor dropout or a surcharge reset.
    pub primary_has_zero_readings: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::{RawSample, RawTimestamp, StreamKind, ValidityRules};
    use chrono_tz::Tz;

    #[test]
    fn test_assess_availability() {
        let utc = Tz::UTC;
        let raw = vec![RawSample::new(RawTimestamp::UnixSeconds(0.0), Some(1.0), None)];
        let stream = Stream::from_raw(StreamKind::Reference, &raw, &ValidityRules::default(), utc);
        let empty = Stream::empty(StreamKind::Reference);

        assert_eq!(StreamAvailability::assess(&stream, None), StreamAvailability::Available);
        assert_eq!(StreamAvailability::assess(&empty, None), StreamAvailability::Empty);
        assert_eq!(
            StreamAvailability::assess(&empty, Some("timeout")),
            StreamAvailability::Unavailable {
                reason: "timeout".to_string()
            }
        );
        assert!(!StreamAvailability::Empty.is_available());
    }

    #[test]
    fn test_availability_serializes_with_state_tag() {
        let json = serde_json::to_value(StreamAvailability::Unavailable {
            reason: "HTTP 503".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "unavailable");
        assert_eq!(json["reason"], "HTTP 503");
    }
}
