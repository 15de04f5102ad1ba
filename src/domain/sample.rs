// Sensor sample domain models
use super::timeline::local_instant;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone-less layouts accepted for text timestamps, tried in order.
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Primary,
    Reference,
    Precipitation,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Primary => "primary",
            StreamKind::Reference => "reference",
            StreamKind::Precipitation => "precipitation",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TimestampError {
    #[error("unrecognized timestamp: {0}")]
    Unrecognized(String),
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
}

/// Timestamp as delivered by a source: epoch seconds from the metering
/// device, ISO-8601 text from the reference network.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    UnixSeconds(f64),
    Text(String),
}

impl RawTimestamp {
    /// Normalize to an absolute instant. Text without an offset is read in `zone`.
    pub fn to_instant(&self, zone: Tz) -> Result<DateTime<Utc>, TimestampError> {
        match self {
            RawTimestamp::UnixSeconds(secs) => {
                if !secs.is_finite() {
                    return Err(TimestampError::OutOfRange(secs.to_string()));
                }
                let millis = (secs * 1000.0).round();
                if millis.abs() > i64::MAX as f64 {
                    return Err(TimestampError::OutOfRange(secs.to_string()));
                }
                DateTime::from_timestamp_millis(millis as i64)
                    .ok_or_else(|| TimestampError::OutOfRange(secs.to_string()))
            }
            RawTimestamp::Text(text) => parse_text(text.trim(), zone),
        }
    }
}

fn parse_text(text: &str, zone: Tz) -> Result<DateTime<Utc>, TimestampError> {
    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Ok(zoned.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| TimestampError::Unrecognized(text.to_string()))?;

    local_instant(naive, zone).ok_or_else(|| TimestampError::OutOfRange(text.to_string()))
}

/// One measurement as received, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub timestamp: RawTimestamp,
    pub value: Option<f64>,
    pub quality: Option<f64>,
}

impl RawSample {
    pub fn new(timestamp: RawTimestamp, value: Option<f64>, quality: Option<f64>) -> Self {
        Self {
            timestamp,
            value,
            quality,
        }
    }
}

/// Inclusive physical plausibility range for one stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ValidityBounds {
    pub min: f64,
    pub max: f64,
}

impl ValidityBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn admits(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Same range with the ceiling replaced, e.g. by a site's conduit depth.
    pub fn with_ceiling(self, max: Option<f64>) -> Self {
        match max {
            Some(max) => Self { max, ..self },
            None => self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ValidityRules {
    #[serde(default = "default_primary_bounds")]
    pub primary: ValidityBounds,
    #[serde(default = "default_reference_bounds")]
    pub reference: ValidityBounds,
    #[serde(default = "default_precipitation_bounds")]
    pub precipitation: ValidityBounds,
}

fn default_primary_bounds() -> ValidityBounds {
    ValidityBounds::new(0.0, 200.0)
}

fn default_reference_bounds() -> ValidityBounds {
    ValidityBounds::new(0.0, 5.0)
}

fn default_precipitation_bounds() -> ValidityBounds {
    ValidityBounds::new(0.0, 10.0)
}

impl Default for ValidityRules {
    fn default() -> Self {
        Self {
            primary: default_primary_bounds(),
            reference: default_reference_bounds(),
            precipitation: default_precipitation_bounds(),
        }
    }
}

impl ValidityRules {
    pub fn bounds(&self, kind: StreamKind) -> ValidityBounds {
        match kind {
            StreamKind::Primary => self.primary,
            StreamKind::Reference => self.reference,
            StreamKind::Precipitation => self.precipitation,
        }
    }

    pub fn is_valid(&self, kind: StreamKind, value: Option<f64>) -> bool {
        value.is_some_and(|v| self.bounds(kind).admits(v))
    }

    /// Same rules with a site-specific ceiling on primary levels.
    pub fn with_primary_ceiling(self, max: Option<f64>) -> Self {
        Self {
            primary: self.primary.with_ceiling(max),
            ..self
        }
    }
}

/// A sample that passed timestamp normalization and the validity filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidSample {
    pub time_ms: i64,
    pub value: f64,
    pub quality: Option<f64>,
}

/// Validated samples of one kind, kept in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    kind: StreamKind,
    samples: Vec<ValidSample>,
    rejected: usize,
}

impl Stream {
    /// Filters `raw` down to samples with a parseable timestamp and an
    /// admissible value. Rejected samples are only counted.
    pub fn from_raw(
        kind: StreamKind,
        raw: &[RawSample],
        rules: &ValidityRules,
        zone: Tz,
    ) -> Self {
        let mut samples = Vec::with_capacity(raw.len());
        let mut rejected = 0;

        for sample in raw {
            let value = match sample.value {
                Some(v) if rules.is_valid(kind, Some(v)) => v,
                _ => {
                    rejected += 1;
                    continue;
                }
            };
            match sample.timestamp.to_instant(zone) {
                Ok(instant) => samples.push(ValidSample {
                    time_ms: instant.timestamp_millis(),
                    value,
                    quality: sample.quality.filter(|q| q.is_finite()),
                }),
                Err(e) => {
                    tracing::trace!("Dropping {} sample: {}", kind.as_str(), e);
                    rejected += 1;
                }
            }
        }

        Self {
            kind,
            samples,
            rejected,
        }
    }

    pub fn empty(kind: StreamKind) -> Self {
        Self {
            kind,
            samples: Vec::new(),
            rejected: 0,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn samples(&self) -> &[ValidSample] {
        &self.samples
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn is_available(&self) -> bool {
        !self.samples.is_empty()
    }
}
