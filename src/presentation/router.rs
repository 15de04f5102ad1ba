// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, list_sites, site_comparison};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Compression is applied manually by the response builders, so no
// CompressionLayer here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/sites", get(list_sites))
        .route("/sites/:id/comparison", get(site_comparison))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::comparison_service::{ComparisonService, ComparisonSettings};
    use crate::application::sensor_repository::{PrimaryReadings, SensorRepository};
    use crate::application::site_service::SiteService;
    use crate::domain::alignment::{AlignmentSettings, Tolerances};
    use crate::domain::comparison::PrimaryDevice;
    use crate::domain::sample::{RawSample, RawTimestamp, ValidityRules};
    use crate::domain::site::{Site, VarianceThresholds};
    use crate::domain::timeline::TimeRange;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::TimeDelta;
    use chrono_tz::Tz;
    use serde_json::Value;
    use std::collections::HashMap;
    use tower::ServiceExt;

    struct StaticRepository;

    fn at(text: &str, value: f64) -> RawSample {
        RawSample::new(RawTimestamp::Text(text.to_string()), Some(value), None)
    }

    #[async_trait]
    impl SensorRepository for StaticRepository {
        async fn fetch_primary(&self, site: &Site, _range: &TimeRange) -> anyhow::Result<PrimaryReadings> {
            Ok(PrimaryReadings {
                device: PrimaryDevice {
                    device_id: site.mhm_id.clone(),
                    ..Default::default()
                },
                samples: vec![at("2025-05-27T00:00:00Z", 10.0), at("2025-05-27T00:15:00Z", 11.0)],
            })
        }

        async fn fetch_reference(&self, _site: &Site, _range: &TimeRange) -> anyhow::Result<Vec<RawSample>> {
            Ok(vec![at("2025-05-27T00:20:00", 1.5)])
        }

        async fn fetch_precipitation(&self, _site: &Site, _range: &TimeRange) -> anyhow::Result<Vec<RawSample>> {
            anyhow::bail!("rain gauge offline")
        }
    }

    fn app() -> Router {
        let zone = Tz::UTC;
        let overview = AlignmentSettings {
            interval: TimeDelta::minutes(15),
            index_interval: TimeDelta::minutes(15),
            tolerances: Tolerances::uniform(TimeDelta::minutes(30)),
            display_zone: zone,
        };
        let settings = ComparisonSettings {
            modes: HashMap::from([("overview".to_string(), overview)]),
            default_mode: "overview".to_string(),
            validity: ValidityRules::default(),
            variance: VarianceThresholds::default(),
            zone,
            max_range_days: 31,
        };
        let site = Site {
            site_id: "MH-001".to_string(),
            name: "San Pablo Ave & Solano Ave".to_string(),
            mh_id: "0212A".to_string(),
            mhm_id: "951".to_string(),
            ref_type: "ADS".to_string(),
            ref_source: "PRISM".to_string(),
            ref_id: "ADS-851".to_string(),
            ref_loc_id: 2,
            coordinates: [37.8869, -122.2982],
            max_level_in: None,
        };

        build_router(Arc::new(AppState {
            site_service: SiteService::new(vec![site]),
            comparison_service: ComparisonService::new(Arc::new(StaticRepository), settings),
        }))
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_list_sites() {
        let (status, json) = get_json("/sites").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["siteId"], "MH-001");
        assert_eq!(json[0]["refLocId"], 2);
    }

    #[tokio::test]
    async fn test_comparison_report() {
        let (status, json) = get_json("/sites/MH-001/comparison?start=2025-05-27").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "overview");
        assert_eq!(json["outcome"]["status"], "merged");
        assert_eq!(json["outcome"]["branch"], "dual");
        assert_eq!(json["availability"]["precipitation"]["state"], "unavailable");
        assert_eq!(json["outcome"]["rows"][0]["displayLabel"], "5/27 00:00");
        assert_eq!(json["outcome"]["rows"][0]["primaryValue"], 10.0);
    }

    #[tokio::test]
    async fn test_comparison_unknown_site_is_404() {
        let (status, json) = get_json("/sites/MH-404/comparison?start=2025-05-27").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown site: MH-404");
    }

    #[tokio::test]
    async fn test_comparison_bad_request() {
        let (status, _) = get_json("/sites/MH-001/comparison?start=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json("/sites/MH-001/comparison").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = get_json("/sites/MH-001/comparison?start=2025-05-27&mode=hourly").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "unknown alignment mode: hourly");
    }

    #[tokio::test]
    async fn test_comparison_range_limit() {
        let (status, json) =
            get_json("/sites/MH-001/comparison?start=0001-01-01&end=9999-12-31").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "date range of 3652059 days exceeds the 31 day limit");

        let (status, _) = get_json("/sites/MH-001/comparison?start=2025-05-01&end=2025-06-01").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = get_json("/sites/MH-001/comparison?start=2025-05-01&end=2025-05-31").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["range"]["startMs"], 1_746_057_600_000i64);
    }

    #[tokio::test]
    async fn test_comparison_brotli() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/sites/MH-001/comparison?start=2025-05-27")
                    .header(header::ACCEPT_ENCODING, "br")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "br");
    }
}
