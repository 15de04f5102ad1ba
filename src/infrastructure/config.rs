use crate::application::comparison_service::ComparisonSettings;
use crate::domain::alignment::{AlignmentSettings, Tolerances};
use crate::domain::sample::{StreamKind, ValidityRules};
use crate::domain::site::{Site, VarianceThresholds};
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const ENV_PREFIX: &str = "MHCOMPARE";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("alignment mode '{0}' needs positive interval_minutes and index_interval_minutes")]
    ZeroInterval(String),

    #[error("default alignment mode '{0}' is not defined")]
    MissingDefaultMode(String),

    #[error("{kind} validity bounds are invalid: min {min}, max {max}")]
    InvalidBounds { kind: &'static str, min: f64, max: f64 },

    #[error("variance thresholds must satisfy 0 <= medium <= high")]
    InvalidVariance,

    #[error("unknown time zone: {0}")]
    InvalidTimezone(String),

    #[error("max_range_days must be at least 1")]
    ZeroRangeLimit,

    #[error("duplicate site id: {0}")]
    DuplicateSite(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub validity: ValidityRules,
    #[serde(default)]
    pub variance: VarianceThresholds,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub limits: LimitSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    #[serde(default = "default_primary_path")]
    pub primary_path: String,
    #[serde(default = "default_reference_path")]
    pub reference_path: String,
    #[serde(default = "default_precipitation_path")]
    pub precipitation_path: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Rain gauge serving every site.
    #[serde(default = "default_rain_location_id")]
    pub rain_location_id: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_primary_path() -> String {
    "/api/mhm".to_string()
}

fn default_reference_path() -> String {
    "/api/reference".to_string()
}

fn default_precipitation_path() -> String {
    "/api/rainfall".to_string()
}

fn default_rain_location_id() -> i64 {
    22
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlignmentConfig {
    #[serde(default = "default_mode_name")]
    pub default_mode: String,
    #[serde(default = "default_modes")]
    pub modes: HashMap<String, ModeConfig>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode_name(),
            modes: default_modes(),
        }
    }
}

fn default_mode_name() -> String {
    "overview".to_string()
}

fn default_modes() -> HashMap<String, ModeConfig> {
    HashMap::from([
        (
            "overview".to_string(),
            ModeConfig {
                interval_minutes: 15,
                index_interval_minutes: None,
                tolerance: ToleranceConfig {
                    primary_minutes: 30,
                    reference_minutes: 30,
                    precipitation_minutes: 30,
                },
            },
        ),
        (
            "detail".to_string(),
            ModeConfig {
                interval_minutes: 5,
                index_interval_minutes: None,
                tolerance: ToleranceConfig {
                    primary_minutes: 3,
                    reference_minutes: 3,
                    precipitation_minutes: 30,
                },
            },
        ),
    ])
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModeConfig {
    pub interval_minutes: u32,
    /// Defaults to `interval_minutes`.
    #[serde(default)]
    pub index_interval_minutes: Option<u32>,
    pub tolerance: ToleranceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToleranceConfig {
    pub primary_minutes: u32,
    pub reference_minutes: u32,
    pub precipitation_minutes: u32,
}

impl ModeConfig {
    fn to_settings(&self, display_zone: Tz) -> AlignmentSettings {
        let minutes = |m: u32| TimeDelta::minutes(i64::from(m));
        AlignmentSettings {
            interval: minutes(self.interval_minutes),
            index_interval: minutes(self.index_interval_minutes.unwrap_or(self.interval_minutes)),
            tolerances: Tolerances {
                primary: minutes(self.tolerance.primary_minutes),
                reference: minutes(self.tolerance.reference_minutes),
                precipitation: minutes(self.tolerance.precipitation_minutes),
            },
            display_zone,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplaySettings {
    /// IANA zone name, e.g. `America/Los_Angeles`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitSettings {
    /// Longest date selection one comparison request may cover.
    #[serde(default = "default_max_range_days")]
    pub max_range_days: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_range_days: default_max_range_days(),
        }
    }
}

fn default_max_range_days() -> u32 {
    31
}

#[derive(Debug, Deserialize, Clone)]
pub struct SitesConfig {
    #[serde(default)]
    pub sites: Vec<Site>,
}

impl AppConfig {
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        let name = self.display.timezone.trim();
        name.parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(name.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, mode) in &self.alignment.modes {
            let index = mode.index_interval_minutes.unwrap_or(mode.interval_minutes);
            if mode.interval_minutes == 0 || index == 0 {
                return Err(ConfigError::ZeroInterval(name.clone()));
            }
        }
        if !self.alignment.modes.contains_key(&self.alignment.default_mode) {
            return Err(ConfigError::MissingDefaultMode(self.alignment.default_mode.clone()));
        }

        for kind in [StreamKind::Primary, StreamKind::Reference, StreamKind::Precipitation] {
            let bounds = self.validity.bounds(kind);
            if !bounds.min.is_finite() || !bounds.max.is_finite() || bounds.min > bounds.max {
                return Err(ConfigError::InvalidBounds {
                    kind: kind.as_str(),
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }

        let variance = &self.variance;
        if !(variance.medium >= 0.0 && variance.medium <= variance.high) {
            return Err(ConfigError::InvalidVariance);
        }

        if self.limits.max_range_days == 0 {
            return Err(ConfigError::ZeroRangeLimit);
        }

        self.zone().map(|_| ())
    }

    pub fn comparison_settings(&self) -> Result<ComparisonSettings, ConfigError> {
        self.validate()?;
        let zone = self.zone()?;
        let modes = self
            .alignment
            .modes
            .iter()
            .map(|(name, mode)| (name.clone(), mode.to_settings(zone)))
            .collect();

        Ok(ComparisonSettings {
            modes,
            default_mode: self.alignment.default_mode.clone(),
            validity: self.validity,
            variance: self.variance,
            zone,
            max_range_days: self.limits.max_range_days,
        })
    }
}

impl SitesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.site_id.as_str()) {
                return Err(ConfigError::DuplicateSite(site.site_id.clone()));
            }
        }
        Ok(())
    }
}

/// Load `config/app` with `MHCOMPARE__SECTION__KEY` environment overrides.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/app"))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

pub fn load_sites_config() -> anyhow::Result<Vec<Site>> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/sites"))
        .build()?;

    let sites_config: SitesConfig = settings.try_deserialize()?;
    sites_config.validate()?;
    Ok(sites_config.sites)
}
