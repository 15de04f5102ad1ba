// Monitoring site domain model
use serde::{Deserialize, Serialize};

/// A manhole where a metering device sits next to a reference sensor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Site {
    pub site_id: String,
    pub name: String,
    pub mh_id: String,
    /// Manhole metric device id.
    pub mhm_id: String,
    /// Reference hardware family, e.g. `ADS` or `LMS`.
    pub ref_type: String,
    /// Reference network the readings come from, e.g. `PRISM`.
    pub ref_source: String,
    pub ref_id: String,
    pub ref_loc_id: i64,
    /// `[lat, lng]`
    pub coordinates: [f64; 2],
    /// Physical ceiling for level readings at this manhole, in inches.
    #[serde(default)]
    pub max_level_in: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VarianceThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            medium: 1.0,
            high: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VarianceStatus {
    Low,
    Medium,
    High,
}

impl VarianceStatus {
    pub fn classify(difference: f64, thresholds: &VarianceThresholds) -> Self {
        if difference > thresholds.high {
            VarianceStatus::High
        } else if difference > thresholds.medium {
            VarianceStatus::Medium
        } else {
            VarianceStatus::Low
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VarianceStatus::High => "High variance detected",
            VarianceStatus::Medium => "Medium variance",
            VarianceStatus::Low => "Normal variance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variance {
    pub primary_level: f64,
    pub reference_level: f64,
    pub difference: f64,
    pub status: VarianceStatus,
    pub description: &'static str,
}

impl Variance {
    pub fn between(primary_level: f64, reference_level: f64, thresholds: &VarianceThresholds) -> Self {
        let difference = (primary_level - reference_level).abs();
        let status = VarianceStatus::classify(difference, thresholds);
        Self {
            primary_level,
            reference_level,
            difference,
            status,
            description: status.description(),
        }
    }
}
