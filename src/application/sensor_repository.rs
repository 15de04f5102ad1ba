// Repository trait for raw sensor data access
use crate::domain::comparison::PrimaryDevice;
use crate::domain::sample::RawSample;
use crate::domain::site::Site;
use crate::domain::timeline::TimeRange;
use async_trait::async_trait;

/// Metering device readings plus the metadata reported with them
#[derive(Debug, Clone, Default)]
pub struct PrimaryReadings {
    pub device: PrimaryDevice,
    pub samples: Vec<RawSample>,
}

#[async_trait]
pub trait SensorRepository: Send + Sync {
    /// Level readings from the site's manhole metric device
    async fn fetch_primary(&self, site: &Site, range: &TimeRange) -> anyhow::Result<PrimaryReadings>;

    /// Readings from the site's reference sensor, with quality codes
    async fn fetch_reference(&self, site: &Site, range: &TimeRange) -> anyhow::Result<Vec<RawSample>>;

    /// Rainfall accumulation from the gauge serving the site
    async fn fetch_precipitation(&self, site: &Site, range: &TimeRange) -> anyhow::Result<Vec<RawSample>>;
}
