// Comparison service - Use case for aligning a site's sensor streams
use crate::application::error::RequestError;
use crate::application::sensor_repository::{PrimaryReadings, SensorRepository};
use crate::domain::alignment::{merge, AlignmentSettings, SiteStreams};
use crate::domain::comparison::{Availability, ComparisonReport, PrimaryDevice, StreamAvailability};
use crate::domain::sample::{RawSample, Stream, StreamKind, ValidityRules};
use crate::domain::site::{Site, Variance, VarianceThresholds};
use crate::domain::statistics::{latest, summarize, StreamSummary};
use crate::domain::timeline::{build_timeline, TimeRange};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ComparisonSettings {
    pub modes: HashMap<String, AlignmentSettings>,
    pub default_mode: String,
    pub validity: ValidityRules,
    pub variance: VarianceThresholds,
    /// Zone for zone-less timestamps, day boundaries and labels.
    pub zone: Tz,
    /// Longest date selection a single request may cover, in calendar days.
    pub max_range_days: u32,
}

/// Raw payload of one source, or the reason it could not be fetched.
#[derive(Debug, Clone, Default)]
pub struct FetchedSource {
    pub samples: Vec<RawSample>,
    pub error: Option<String>,
}

impl FetchedSource {
    fn settle(kind: StreamKind, site: &Site, result: anyhow::Result<Vec<RawSample>>) -> Self {
        match result {
            Ok(samples) => Self {
                samples,
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch {} stream for site {}: {:#}",
                    kind.as_str(),
                    site.site_id,
                    e
                );
                Self {
                    samples: Vec::new(),
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchedStreams {
    pub primary: FetchedSource,
    pub primary_device: Option<PrimaryDevice>,
    pub reference: FetchedSource,
    pub precipitation: FetchedSource,
}

#[derive(Clone)]
pub struct ComparisonService {
    repository: Arc<dyn SensorRepository>,
    settings: Arc<ComparisonSettings>,
}

impl ComparisonService {
    pub fn new(repository: Arc<dyn SensorRepository>, settings: ComparisonSettings) -> Self {
        Self {
            repository,
            settings: Arc::new(settings),
        }
    }

    /// Widen a date selection to whole local days, refusing selections
    /// longer than the configured limit. Reversed dates give an empty range.
    pub fn resolve_range(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeRange, RequestError> {
        let days = (end - start).num_days() + 1;
        let max_days = self.settings.max_range_days;
        if days > i64::from(max_days) {
            return Err(RequestError::RangeTooLong { days, max_days });
        }
        Ok(TimeRange::from_dates(start, end, self.settings.zone))
    }

    pub async fn compare(
        &self,
        site: &Site,
        range: TimeRange,
        mode: Option<&str>,
    ) -> Result<ComparisonReport, RequestError> {
        let mode_name = mode.unwrap_or(self.settings.default_mode.as_str());
        let alignment = self
            .settings
            .modes
            .get(mode_name)
            .ok_or_else(|| RequestError::UnknownMode(mode_name.to_string()))?;

        // The three sources are independent; fetch them side by side
        let (primary, reference, precipitation) = tokio::join!(
            self.repository.fetch_primary(site, &range),
            self.repository.fetch_reference(site, &range),
            self.repository.fetch_precipitation(site, &range),
        );

        let (primary, primary_device) = match primary {
            Ok(PrimaryReadings { device, samples }) => (Ok(samples), Some(device)),
            Err(e) => (Err(e), None),
        };

        let fetched = FetchedStreams {
            primary: FetchedSource::settle(StreamKind::Primary, site, primary),
            primary_device,
            reference: FetchedSource::settle(StreamKind::Reference, site, reference),
            precipitation: FetchedSource::settle(StreamKind::Precipitation, site, precipitation),
        };

        Ok(build_report(site, range, mode_name, alignment, &self.settings, fetched))
    }
}

/// Validate, merge and summarize already-fetched streams.
///
/// Pure: identical inputs give identical reports.
pub fn build_report(
    site: &Site,
    range: TimeRange,
    mode_name: &str,
    alignment: &AlignmentSettings,
    settings: &ComparisonSettings,
    fetched: FetchedStreams,
) -> ComparisonReport {
    let zone = settings.zone;
    let rules = settings.validity.with_primary_ceiling(site.max_level_in);

    let primary = Stream::from_raw(StreamKind::Primary, &fetched.primary.samples, &rules, zone);
    let reference = Stream::from_raw(StreamKind::Reference, &fetched.reference.samples, &rules, zone);
    let precipitation = Stream::from_raw(
        StreamKind::Precipitation,
        &fetched.precipitation.samples,
        &rules,
        zone,
    );

    for stream in [&primary, &reference, &precipitation] {
        tracing::debug!(
            "Site {} {} stream: {} valid, {} rejected",
            site.site_id,
            stream.kind().as_str(),
            stream.samples().len(),
            stream.rejected()
        );
    }

    let availability = Availability {
        primary: StreamAvailability::assess(&primary, fetched.primary.error.as_deref()),
        reference: StreamAvailability::assess(&reference, fetched.reference.error.as_deref()),
        precipitation: StreamAvailability::assess(
            &precipitation,
            fetched.precipitation.error.as_deref(),
        ),
    };

    let timeline = build_timeline(range.start_ms, range.end_ms, alignment.interval);
    let streams = SiteStreams {
        primary: &primary,
        reference: &reference,
        precipitation: &precipitation,
    };
    let outcome = merge(&timeline, streams, alignment);

    tracing::debug!(
        "Site {} merged with branch {:?}: {} rows over {} slots",
        site.site_id,
        outcome.branch(),
        outcome.rows().len(),
        timeline.len()
    );

    let summaries = [&primary, &reference, &precipitation]
        .into_iter()
        .filter(|s| s.is_available())
        .map(|s| StreamSummary {
            kind: s.kind(),
            stats: summarize(s),
        })
        .collect();

    let variance = match (latest(&primary), latest(&reference)) {
        (Some(p), Some(r)) => Some(Variance::between(p.value, r.value, &settings.variance)),
        _ => None,
    };

    ComparisonReport {
        site: site.clone(),
        range,
        mode: mode_name.to_string(),
        availability,
        outcome,
        summaries,
        variance,
        primary_device: fetched.primary_device,
        primary_has_zero_readings: primary.samples().iter().any(|s| s.value == 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alignment::{MergeBranch, MergeOutcome, Tolerances};
    use crate::domain::sample::RawTimestamp;
    use crate::domain::site::VarianceStatus;
    use crate::domain::timeline::MINUTE_MS;
    use async_trait::async_trait;
    use chrono::TimeDelta;

    const T0: i64 = 1_748_304_000_000; // 2025-05-27T00:00:00Z

    struct FakeRepository {
        primary: Vec<RawSample>,
        reference: Option<Vec<RawSample>>,
        precipitation: Vec<RawSample>,
    }

    #[async_trait]
    impl SensorRepository for FakeRepository {
        async fn fetch_primary(&self, site: &Site, _range: &TimeRange) -> anyhow::Result<PrimaryReadings> {
            Ok(PrimaryReadings {
                device: PrimaryDevice {
                    device_id: site.mhm_id.clone(),
                    last_water_level_in: Some(14.1),
                    last_fill_percent: Some(23.0),
                },
                samples: self.primary.clone(),
            })
        }

        async fn fetch_reference(&self, _site: &Site, _range: &TimeRange) -> anyhow::Result<Vec<RawSample>> {
            match &self.reference {
                Some(samples) => Ok(samples.clone()),
                None => anyhow::bail!("reference backend returned 503"),
            }
        }

        async fn fetch_precipitation(&self, _site: &Site, _range: &TimeRange) -> anyhow::Result<Vec<RawSample>> {
            Ok(self.precipitation.clone())
        }
    }

    fn site() -> Site {
        Site {
            site_id: "MH-001".to_string(),
            name: "San Pablo Ave & Solano Ave".to_string(),
            mh_id: "0212A".to_string(),
            mhm_id: "951".to_string(),
            ref_type: "ADS".to_string(),
            ref_source: "PRISM".to_string(),
            ref_id: "ADS-851".to_string(),
            ref_loc_id: 2,
            coordinates: [37.8869, -122.2982],
            max_level_in: Some(40.0),
        }
    }

    fn settings() -> ComparisonSettings {
        let zone = Tz::UTC;
        let overview = AlignmentSettings {
            interval: TimeDelta::minutes(15),
            index_interval: TimeDelta::minutes(15),
            tolerances: Tolerances::uniform(TimeDelta::minutes(30)),
            display_zone: zone,
        };
        ComparisonSettings {
            modes: HashMap::from([("overview".to_string(), overview)]),
            default_mode: "overview".to_string(),
            validity: ValidityRules::default(),
            variance: VarianceThresholds::default(),
            zone,
            max_range_days: 31,
        }
    }

    fn epoch(minute: i64, value: f64) -> RawSample {
        RawSample::new(
            RawTimestamp::UnixSeconds(((T0 + minute * MINUTE_MS) / 1000) as f64),
            Some(value),
            None,
        )
    }

    fn iso(text: &str, value: f64) -> RawSample {
        RawSample::new(RawTimestamp::Text(text.to_string()), Some(value), Some(15.0))
    }

    fn range() -> TimeRange {
        TimeRange::new(T0, T0 + 30 * MINUTE_MS)
    }

    #[tokio::test]
    async fn test_compare_dual_streams() {
        let repo = FakeRepository {
            primary: vec![epoch(0, 10.0), epoch(5, 55.0)],
            reference: Some(vec![iso("2025-05-27T00:20:00", 1.5)]),
            precipitation: vec![epoch(0, 0.0), epoch(15, 0.02)],
        };
        let service = ComparisonService::new(Arc::new(repo), settings());

        let report = service.compare(&site(), range(), None).await.unwrap();

        assert_eq!(report.mode, "overview");
        assert_eq!(report.outcome.branch(), Some(MergeBranch::Dual));
        assert_eq!(report.outcome.rows().len(), 3);
        assert!(report.availability.primary.is_available());
        assert!(report.availability.reference.is_available());

        // 55.0 exceeds the site's 40 in. ceiling
        let primary_stats = report
            .summaries
            .iter()
            .find(|s| s.kind == StreamKind::Primary)
            .unwrap();
        assert_eq!(primary_stats.stats.sample_count, 1);

        let rain_stats = report
            .summaries
            .iter()
            .find(|s| s.kind == StreamKind::Precipitation)
            .unwrap();
        assert_eq!(rain_stats.stats.sample_count, 2);
        assert_eq!(rain_stats.stats.non_zero_event_count, 1);

        let variance = report.variance.unwrap();
        assert_eq!(variance.difference, 8.5);
        assert_eq!(variance.status, VarianceStatus::High);
        assert_eq!(report.primary_device.unwrap().device_id, "951");
        assert!(!report.primary_has_zero_readings);
    }

    #[tokio::test]
    async fn test_failed_reference_degrades_to_primary_only() {
        let repo = FakeRepository {
            primary: vec![epoch(0, 0.0), epoch(10, 3.0)],
            reference: None,
            precipitation: Vec::new(),
        };
        let service = ComparisonService::new(Arc::new(repo), settings());

        let report = service.compare(&site(), range(), Some("overview")).await.unwrap();

        assert_eq!(report.outcome.branch(), Some(MergeBranch::PrimaryOnly));
        assert_eq!(report.outcome.rows().len(), 2);
        assert!(matches!(
            report.availability.reference,
            StreamAvailability::Unavailable { .. }
        ));
        assert_eq!(report.availability.precipitation, StreamAvailability::Empty);
        assert!(report.variance.is_none());
        assert!(report.primary_has_zero_readings);
    }

    #[tokio::test]
    async fn test_no_valid_levels_is_no_data() {
        let repo = FakeRepository {
            primary: vec![RawSample::new(RawTimestamp::UnixSeconds(0.0), None, None)],
            reference: Some(Vec::new()),
            precipitation: vec![epoch(0, 0.2)],
        };
        let service = ComparisonService::new(Arc::new(repo), settings());

        let report = service.compare(&site(), range(), None).await.unwrap();

        assert_eq!(report.outcome, MergeOutcome::NoData);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].kind, StreamKind::Precipitation);
    }

    #[tokio::test]
    async fn test_unknown_mode_is_rejected() {
        let repo = FakeRepository {
            primary: Vec::new(),
            reference: Some(Vec::new()),
            precipitation: Vec::new(),
        };
        let service = ComparisonService::new(Arc::new(repo), settings());

        let result = service.compare(&site(), range(), Some("hourly")).await;
        assert_eq!(result.unwrap_err(), RequestError::UnknownMode("hourly".to_string()));
    }

    #[test]
    fn test_resolve_range_enforces_day_limit() {
        let repo = FakeRepository {
            primary: Vec::new(),
            reference: Some(Vec::new()),
            precipitation: Vec::new(),
        };
        let service = ComparisonService::new(Arc::new(repo), settings());
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        let month = service.resolve_range(date(2025, 5, 1), date(2025, 5, 31)).unwrap();
        assert_eq!(month.start_ms, 1_746_057_600_000);

        assert_eq!(
            service.resolve_range(date(2025, 5, 1), date(2025, 6, 1)),
            Err(RequestError::RangeTooLong { days: 32, max_days: 31 })
        );
        assert_eq!(
            service.resolve_range(date(1, 1, 1), date(9999, 12, 31)).unwrap_err(),
            RequestError::RangeTooLong {
                days: 3_652_059,
                max_days: 31
            }
        );

        let reversed = service.resolve_range(date(2025, 5, 28), date(2025, 5, 27)).unwrap();
        assert!(reversed.is_empty());
    }

    #[test]
    fn test_build_report_is_repeatable() {
        let settings = settings();
        let alignment = settings.modes["overview"];
        let fetched = FetchedStreams {
            primary: FetchedSource {
                samples: vec![epoch(0, 10.0), epoch(17, 11.0)],
                error: None,
            },
            primary_device: None,
            reference: FetchedSource {
                samples: vec![iso("2025-05-27T00:20:00Z", 1.0)],
                error: None,
            },
            precipitation: FetchedSource::default(),
        };

        let a = build_report(&site(), range(), "overview", &alignment, &settings, fetched.clone());
        let b = build_report(&site(), range(), "overview", &alignment, &settings, fetched);
        assert_eq!(a, b);
    }
}
